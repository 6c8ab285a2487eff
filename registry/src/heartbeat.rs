use std::sync::Arc;
use std::time::Duration;

use log::*;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::frame::Frame;
use crate::registry::Registry;

/// Periodic keep-alive broadcaster.
///
/// A long-lived tokio task awaits a timer or the shutdown signal; shutdown
/// cancels it deterministically. Each tick broadcasts a fresh keep-alive
/// frame as its own task over its own snapshot, so a slow tick never queues
/// the next one behind it. Dead transports discovered by a heartbeat are
/// removed exactly as in any other broadcast.
pub struct Heartbeat {
    shutdown: watch::Sender<bool>,
}

impl Heartbeat {
    /// Start the scheduler at `period`, producing one frame per tick from
    /// `keepalive`. The first tick fires one full period after spawn.
    pub fn spawn<F, P>(registry: Arc<Registry>, period: Duration, keepalive: P) -> Self
    where
        F: Frame + 'static,
        P: Fn() -> F + Send + 'static,
    {
        let (shutdown, mut signal) = watch::channel(false);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately on the first tick; skip it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let registry = Arc::clone(&registry);
                        let frame = keepalive();
                        tokio::spawn(async move {
                            let delivered = registry.broadcast(&frame);
                            trace!("Heartbeat delivered to {delivered} connection(s)");
                        });
                    }
                    _ = signal.changed() => {
                        debug!("Heartbeat scheduler stopping");
                        break;
                    }
                }
            }
        });

        Self { shutdown }
    }

    /// Stop the scheduler. Idempotent; also triggered by drop.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;
    use crate::connection::{ConnectionId, ConnectionParams, TransportKind};
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Ping;

    impl Frame for Ping {
        fn encode(&self) -> Result<Vec<u8>, Error> {
            Ok(b"ping".to_vec())
        }
    }

    fn counted_connection(id: &str, ticks: Arc<AtomicUsize>) -> ConnectionParams {
        ConnectionParams {
            id: ConnectionId::new(id),
            kind: TransportKind::Sse,
            user_id: None,
            channel: None,
            send_raw: Box::new(move |_| {
                ticks.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            close_raw: Box::new(|_, _| {}),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn broadcasts_on_every_period() {
        let registry = Arc::new(Registry::new(RegistryConfig::default()));
        let ticks = Arc::new(AtomicUsize::new(0));
        registry
            .add_connection(counted_connection("c1", Arc::clone(&ticks)))
            .unwrap();

        let heartbeat = Heartbeat::spawn(Arc::clone(&registry), Duration::from_secs(30), || Ping);

        tokio::time::sleep(Duration::from_secs(95)).await;
        tokio::task::yield_now().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        heartbeat.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn no_tick_fires_after_stop() {
        let registry = Arc::new(Registry::new(RegistryConfig::default()));
        let ticks = Arc::new(AtomicUsize::new(0));
        registry
            .add_connection(counted_connection("c1", Arc::clone(&ticks)))
            .unwrap();

        let heartbeat = Heartbeat::spawn(Arc::clone(&registry), Duration::from_secs(30), || Ping);
        heartbeat.stop();
        tokio::task::yield_now().await;

        tokio::time::sleep(Duration::from_secs(120)).await;
        tokio::task::yield_now().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_removes_dead_transports() {
        let registry = Arc::new(Registry::new(RegistryConfig::default()));
        registry
            .add_connection(ConnectionParams {
                id: ConnectionId::new("dead"),
                kind: TransportKind::Sse,
                user_id: None,
                channel: None,
                send_raw: Box::new(|_| {
                    Err(std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "peer gone",
                    ))
                }),
                close_raw: Box::new(|_, _| {}),
            })
            .unwrap();

        let heartbeat = Heartbeat::spawn(Arc::clone(&registry), Duration::from_secs(30), || Ping);

        tokio::time::sleep(Duration::from_secs(35)).await;
        tokio::task::yield_now().await;
        assert_eq!(registry.connection_count(), 0);

        heartbeat.stop();
    }
}
