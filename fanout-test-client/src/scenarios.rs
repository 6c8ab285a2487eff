use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use registry::{AdmissionErrorKind, ConnectionId, Error, ErrorKind, RegistryConfig};
use serde_json::json;
use websocket::{MessageHandler, WsMessage};

use crate::output::{print_frame, TestResult};
use crate::transport::TestClient;

fn result(scenario: &str, started: Instant, outcome: Result<(), String>) -> TestResult {
    TestResult {
        scenario: scenario.to_string(),
        passed: outcome.is_ok(),
        message: outcome.err(),
        duration: started.elapsed(),
    }
}

fn check(condition: bool, failure: &str) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(failure.to_string())
    }
}

fn connect_ws(
    manager: &websocket::Manager,
    id: &str,
    user_id: Option<&str>,
    channel: Option<&str>,
) -> Result<TestClient, Error> {
    let client = TestClient::new();
    manager.register_connection(
        ConnectionId::new(id),
        user_id.map(String::from),
        channel.map(String::from),
        client.send_fn(),
        client.close_fn(),
    )?;
    Ok(client)
}

fn connect_sse(
    manager: &sse::Manager,
    id: &str,
    user_id: Option<&str>,
    channel: Option<&str>,
) -> Result<TestClient, Error> {
    let client = TestClient::new();
    manager.register_connection(
        ConnectionId::new(id),
        user_id.map(String::from),
        channel.map(String::from),
        client.send_fn(),
        client.close_fn(),
    )?;
    Ok(client)
}

/// Fan-out by user: two of u1's connections receive, u2's does not, and the
/// delivered envelope carries a filled timestamp.
pub async fn test_user_fanout(verbose: bool) -> Result<TestResult> {
    let started = Instant::now();
    let manager = websocket::Manager::new(RegistryConfig::default());
    let c1 = connect_ws(&manager, "c1", Some("u1"), None)?;
    let c2 = connect_ws(&manager, "c2", Some("u1"), None)?;
    let c3 = connect_ws(&manager, "c3", Some("u2"), None)?;

    let delivered = manager.send_to_user("u1", &WsMessage::new("n", json!(1)));

    if verbose {
        for frame in c1.texts() {
            print_frame("c1", &frame);
        }
    }

    let frames = c1.json_frames();
    let outcome = check(delivered == 2, &format!("expected 2 deliveries, got {delivered}"))
        .and(check(c2.frame_count() == 1, "c2 missed the fan-out"))
        .and(check(c3.frame_count() == 0, "c3 received another user's message"))
        .and(check(
            frames.len() == 1
                && frames[0]["type"] == "n"
                && frames[0]["payload"] == 1
                && frames[0]["timestamp"].is_i64(),
            "delivered envelope is not canonical",
        ));

    manager.close_all(None, None);
    Ok(result("user fan-out", started, outcome))
}

/// Channel broadcast over SSE: both subscribers get a well-formed
/// `text/event-stream` block, outsiders get nothing.
pub async fn test_channel_broadcast(verbose: bool) -> Result<TestResult> {
    let started = Instant::now();
    let manager = sse::Manager::new(RegistryConfig::default());
    let c1 = connect_sse(&manager, "c1", None, Some("x"))?;
    let c2 = connect_sse(&manager, "c2", None, Some("x"))?;
    let c3 = connect_sse(&manager, "c3", None, Some("y"))?;

    let event = sse::SseEvent::json(json!({"seq": 1})).event("tick");
    let delivered = manager.send_to_channel("x", &event);

    if verbose {
        for frame in c1.texts() {
            print_frame("c1", &frame);
        }
    }

    let outcome = check(delivered == 2, &format!("expected 2 deliveries, got {delivered}"))
        .and(check(
            c1.texts() == vec!["event: tick\ndata: {\"seq\":1}\n\n".to_string()],
            "c1 frame is not a valid event block",
        ))
        .and(check(c2.frame_count() == 1, "c2 missed the broadcast"))
        .and(check(c3.frame_count() == 0, "c3 is not on channel x"));

    manager.close_all(None, None);
    Ok(result("channel broadcast", started, outcome))
}

/// Admission quota: the limit-th connection is accepted, the next one is
/// rejected without touching any index.
pub async fn test_quota(_verbose: bool) -> Result<TestResult> {
    let started = Instant::now();
    let manager = websocket::Manager::new(RegistryConfig {
        max_connections_per_user: 2,
        ..RegistryConfig::default()
    });
    connect_ws(&manager, "c1", Some("u1"), None)?;
    connect_ws(&manager, "c2", Some("u1"), None)?;

    let rejection = connect_ws(&manager, "c3", Some("u1"), None);
    let outcome = check(
        matches!(
            rejection,
            Err(Error {
                error_kind: ErrorKind::Admission(AdmissionErrorKind::QuotaExceeded),
                ..
            })
        ),
        "third connection was not rejected with QuotaExceeded",
    )
    .and(check(
        manager.user_connection_count("u1") == 2,
        "quota rejection mutated the user index",
    ))
    .and(check(
        manager.get_connection(&ConnectionId::new("c3")).is_none(),
        "rejected connection is present in the registry",
    ));

    manager.close_all(None, None);
    Ok(result("quota enforcement", started, outcome))
}

/// Oversized inbound frame: rejected with the exact error frame, handler
/// never runs.
pub async fn test_inbound_validation(verbose: bool) -> Result<TestResult> {
    let started = Instant::now();
    let manager = websocket::Manager::new(RegistryConfig {
        max_message_size: 64,
        ..RegistryConfig::default()
    });
    let client = connect_ws(&manager, "c1", None, None)?;

    struct Panicking;

    #[async_trait]
    impl MessageHandler for Panicking {
        async fn handle(
            &self,
            _conn: Arc<registry::Connection>,
            _message: WsMessage,
        ) -> Result<(), Error> {
            unreachable!("handler must not run for an oversized frame");
        }
    }

    manager.on_message("chat:send", Arc::new(Panicking));

    let oversized = format!(
        r#"{{"type":"chat:send","payload":"{}"}}"#,
        "x".repeat(128)
    );
    manager
        .handle_message(&ConnectionId::new("c1"), oversized.as_bytes())
        .await;

    if verbose {
        for frame in client.texts() {
            print_frame("c1", &frame);
        }
    }

    let frames = client.json_frames();
    let outcome = check(frames.len() == 1, "expected exactly one error frame").and(check(
        frames
            .first()
            .map(|frame| {
                frame["type"] == "error"
                    && frame["payload"]["error"] == "Message size exceeds maximum allowed size"
                    && frame["timestamp"].is_i64()
            })
            .unwrap_or(false),
        "error frame does not match the size-limit contract",
    ));

    manager.close_all(None, None);
    Ok(result("inbound size validation", started, outcome))
}

/// Unknown message type: answered with an error frame naming the type.
pub async fn test_unknown_type(verbose: bool) -> Result<TestResult> {
    let started = Instant::now();
    let manager = websocket::Manager::new(RegistryConfig::default());
    let client = connect_ws(&manager, "c1", None, None)?;

    struct Accepting;

    #[async_trait]
    impl MessageHandler for Accepting {
        async fn handle(
            &self,
            _conn: Arc<registry::Connection>,
            _message: WsMessage,
        ) -> Result<(), Error> {
            Ok(())
        }
    }

    manager.on_message("chat:send", Arc::new(Accepting));
    manager
        .handle_message(
            &ConnectionId::new("c1"),
            br#"{"type":"chat:sned","payload":{}}"#,
        )
        .await;

    if verbose {
        for frame in client.texts() {
            print_frame("c1", &frame);
        }
    }

    let frames = client.json_frames();
    let outcome = check(
        frames.len() == 1
            && frames[0]["payload"]["error"] == "No handler found for message type: chat:sned",
        "expected an error frame naming the unknown type",
    );

    manager.close_all(None, None);
    Ok(result("unknown message type", started, outcome))
}

/// Transport death during a channel publish: the dead connection is closed
/// and deindexed, the live one is counted.
pub async fn test_transport_death(_verbose: bool) -> Result<TestResult> {
    let started = Instant::now();
    let manager = websocket::Manager::new(RegistryConfig::default());
    let dead = TestClient::failing();
    manager.register_connection(
        ConnectionId::new("c1"),
        None,
        Some("x".to_string()),
        dead.send_fn(),
        dead.close_fn(),
    )?;
    let live = connect_ws(&manager, "c2", None, Some("x"))?;

    let delivered = manager.send_to_channel("x", &WsMessage::new("n", json!({})));

    let outcome = check(delivered == 1, &format!("expected 1 delivery, got {delivered}"))
        .and(check(
            manager.channel_connection_count("x") == 1,
            "dead connection still indexed on the channel",
        ))
        .and(check(
            manager.get_connection(&ConnectionId::new("c1")).is_none(),
            "dead connection still present in the registry",
        ))
        .and(check(dead.close_count() == 1, "dead transport was not closed"))
        .and(check(live.frame_count() == 1, "live connection missed the publish"));

    manager.close_all(None, None);
    Ok(result("transport death during publish", started, outcome))
}

/// Heartbeat cadence: with a short period, every connection sees keep-alive
/// frames until the broker shuts down.
pub async fn test_heartbeat(verbose: bool) -> Result<TestResult> {
    let started = Instant::now();
    let manager = sse::Manager::new(RegistryConfig {
        heartbeat_interval_ms: 25,
        ..RegistryConfig::default()
    });
    let client = connect_sse(&manager, "c1", None, None)?;

    tokio::time::sleep(Duration::from_millis(90)).await;
    manager.close_all(None, None);
    let seen = client.frame_count();

    tokio::time::sleep(Duration::from_millis(60)).await;

    if verbose {
        for frame in client.texts() {
            print_frame("c1", &frame);
        }
    }

    let outcome = check(seen >= 2, &format!("expected at least 2 heartbeats, saw {seen}"))
        .and(check(
            client
                .texts()
                .iter()
                .all(|frame| frame.starts_with("event: heartbeat\ndata: {\"timestamp\":")),
            "keep-alive is not a heartbeat event frame",
        ))
        .and(check(
            client.frame_count() == seen,
            "heartbeat kept firing after close_all",
        ));

    Ok(result("heartbeat keep-alive", started, outcome))
}
