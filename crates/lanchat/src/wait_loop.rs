//! Background long-poll loop.
//!
//! The server has no push channel. Each iteration opens a fresh connection,
//! sends `WAITFORMESSAGE|<user>` and blocks until the server answers with an
//! event or the wait timeout passes:
//!
//! - event: decode, dispatch, reconnect straight away
//! - timeout: reconnect straight away, nothing reported
//! - transport failure: report, sleep `retry_delay`, reconnect
//!
//! The running flag is checked at the top of every iteration. The wait
//! timeout is what bounds how long a stop request can go unnoticed.

use crate::connection::{self, ConnectionOutcome};
use crate::dispatch::Dispatcher;
use crate::protocol::{InboundEvent, Request};
use crate::session::Session;
use std::sync::Arc;
use std::time::Duration;

/// Default receive timeout for one wait request.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default pause after a failed wait request.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct WaitLoopConfig {
    pub wait_timeout: Duration,
    pub retry_delay: Duration,
}

impl Default for WaitLoopConfig {
    fn default() -> Self {
        Self {
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Run until the session's running flag is cleared, then emit `Disconnected`.
pub(crate) async fn run(session: Arc<Session>, dispatcher: Dispatcher, config: WaitLoopConfig) {
    tracing::info!(
        user = %session.username(),
        server = %session.server_addr(),
        "starting wait loop"
    );

    let request = Request::Wait {
        username: session.username().to_string(),
    };
    let mut consecutive_failures = 0u32;

    while session.is_running() {
        let outcome = connection::exchange(
            session.server_host(),
            session.server_port(),
            &request,
            Some(config.wait_timeout),
        )
        .await;

        match outcome {
            ConnectionOutcome::Response(payload) => {
                consecutive_failures = 0;
                let event = InboundEvent::decode_str(&payload);
                tracing::debug!(?event, "wait returned event");
                dispatcher.dispatch(event);
            }
            ConnectionOutcome::Timeout => {
                consecutive_failures = 0;
                tracing::trace!("wait timed out with no event, reconnecting");
            }
            ConnectionOutcome::Failed(message) => {
                consecutive_failures += 1;
                tracing::warn!(
                    server = %session.server_addr(),
                    err = %message,
                    consecutive_failures,
                    "wait request failed, retrying"
                );
                dispatcher.notify_transport_error(format!("wait loop: {message}"));
                session.pause(config.retry_delay).await;
            }
        }
    }

    tracing::info!(user = %session.username(), "wait loop stopped");
    dispatcher.notify_disconnected();
}
