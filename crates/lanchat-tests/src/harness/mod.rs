pub mod server;

use lanchat::{ChannelSink, ChatClient, ClientOptions, Session, SessionEvent};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Options tuned so loop behavior shows up within a test's patience.
pub fn fast_options() -> ClientOptions {
    ClientOptions {
        wait_timeout: Duration::from_millis(200),
        retry_delay: Duration::from_millis(100),
        request_timeout: Some(Duration::from_secs(2)),
        shutdown_join_timeout: Duration::from_secs(2),
    }
}

/// Build a client for `username` against `server`, with a channel sink.
pub fn client_for(
    server: &server::MockServer,
    username: &str,
) -> (ChatClient, UnboundedReceiver<SessionEvent>) {
    let session = Session::new(username, server.host(), server.port()).unwrap();
    let (sink, rx) = ChannelSink::new();
    (ChatClient::new(session, fast_options(), sink), rx)
}

/// Next event from the sink, or `None` after `timeout`.
pub async fn next_event(
    rx: &mut UnboundedReceiver<SessionEvent>,
    timeout: Duration,
) -> Option<SessionEvent> {
    tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
}

/// Collect everything the sink receives during `window`.
pub async fn drain_for(
    rx: &mut UnboundedReceiver<SessionEvent>,
    window: Duration,
) -> Vec<SessionEvent> {
    let deadline = tokio::time::Instant::now() + window;
    let mut events = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout_at(deadline, rx.recv()).await {
        events.push(event);
    }
    events
}

/// Initialize tracing for tests (only once per process).
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("lanchat=debug,lanchat_tests=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}
