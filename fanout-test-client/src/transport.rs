use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use registry::{CloseFn, SendFn};
use serde_json::Value;

/// In-memory stand-in for one client transport.
///
/// Captures every frame the broker writes and every close it issues, so
/// scenarios can assert on exactly what reached the wire.
#[derive(Clone, Default)]
pub struct TestClient {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
    closes: Arc<Mutex<Vec<(Option<u16>, Option<String>)>>>,
    fail_sends: Arc<AtomicBool>,
}

impl TestClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client whose transport rejects every write, as a dead peer would.
    pub fn failing() -> Self {
        let client = Self::default();
        client.fail_sends.store(true, Ordering::SeqCst);
        client
    }

    pub fn send_fn(&self) -> SendFn {
        let frames = Arc::clone(&self.frames);
        let fail = Arc::clone(&self.fail_sends);
        Box::new(move |bytes| {
            if fail.load(Ordering::SeqCst) {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "peer gone",
                ));
            }
            frames.lock().unwrap().push(bytes.to_vec());
            Ok(())
        })
    }

    pub fn close_fn(&self) -> CloseFn {
        let closes = Arc::clone(&self.closes);
        Box::new(move |code, reason| {
            closes.lock().unwrap().push((code, reason.map(String::from)));
        })
    }

    /// Frames received so far, decoded as UTF-8.
    pub fn texts(&self) -> Vec<String> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }

    /// Frames received so far, parsed as JSON.
    pub fn json_frames(&self) -> Vec<Value> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .filter_map(|bytes| serde_json::from_slice(bytes).ok())
            .collect()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn close_count(&self) -> usize {
        self.closes.lock().unwrap().len()
    }
}
