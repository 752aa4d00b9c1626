use crate::connection;
use crate::dispatch::{Dispatcher, EventSink};
use crate::error::ChatError;
use crate::protocol::{FIELD_SEPARATOR, Request, is_ok_reply};
use crate::session::Session;
use crate::wait_loop::{self, WaitLoopConfig};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Timing knobs for a [`ChatClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Receive timeout of each long-poll request.
    pub wait_timeout: Duration,
    /// Pause between failed long-poll attempts.
    pub retry_delay: Duration,
    /// Bound on register/send/unregister. `None` leaves it to the OS.
    pub request_timeout: Option<Duration>,
    /// How long `shutdown` waits for the wait loop to exit.
    pub shutdown_join_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            wait_timeout: wait_loop::DEFAULT_WAIT_TIMEOUT,
            retry_delay: wait_loop::DEFAULT_RETRY_DELAY,
            request_timeout: None,
            shutdown_join_timeout: Duration::from_secs(2),
        }
    }
}

/// Client side of a chat session.
///
/// `register`, `send` and `unregister` each run one exchange on the caller's
/// task. `start_loop` spawns the long-poll loop, whose output reaches the
/// [`EventSink`] given to [`ChatClient::new`].
pub struct ChatClient {
    session: Arc<Session>,
    options: ClientOptions,
    dispatcher: Dispatcher,
    wait_task: Mutex<Option<JoinHandle<()>>>,
}

impl ChatClient {
    /// Must be called inside a tokio runtime: spawns the dispatcher task.
    pub fn new(session: Session, options: ClientOptions, sink: impl EventSink) -> Self {
        Self {
            session: Arc::new(session),
            options,
            dispatcher: Dispatcher::spawn(sink),
            wait_task: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Send `REGISTER|<user>`. Succeeds only on an `OK|` reply, which is returned.
    pub async fn register(&self) -> Result<String, ChatError> {
        let reply = self
            .exchange(Request::Register {
                username: self.session.username().to_string(),
            })
            .await?;

        if is_ok_reply(&reply) {
            self.session.set_registered(true);
            tracing::info!(user = %self.session.username(), "registered");
            Ok(reply)
        } else {
            tracing::warn!(user = %self.session.username(), %reply, "registration rejected");
            Err(ChatError::Rejected(reply))
        }
    }

    /// Send a message. Any reply counts as delivered and is returned raw.
    ///
    /// `to` and `body` are trimmed and must be non-empty; `to` must not
    /// contain the field separator. Nothing touches the network otherwise.
    pub async fn send(&self, to: &str, body: &str) -> Result<String, ChatError> {
        let to = to.trim();
        let body = body.trim();
        if to.is_empty() {
            return Err(ChatError::InvalidInput("recipient must not be empty".to_string()));
        }
        if to.contains(FIELD_SEPARATOR) {
            return Err(ChatError::InvalidInput(format!(
                "recipient must not contain '{FIELD_SEPARATOR}'"
            )));
        }
        if body.is_empty() {
            return Err(ChatError::InvalidInput("message must not be empty".to_string()));
        }

        let reply = self
            .exchange(Request::Send {
                from: self.session.username().to_string(),
                to: to.to_string(),
                body: body.to_string(),
            })
            .await?;
        tracing::debug!(%to, %reply, "message sent");
        Ok(reply)
    }

    /// Send `UNREGISTER|<user>`. Succeeds only on an `OK|` reply.
    pub async fn unregister(&self) -> Result<String, ChatError> {
        let reply = self
            .exchange(Request::Unregister {
                username: self.session.username().to_string(),
            })
            .await?;

        if is_ok_reply(&reply) {
            self.session.set_registered(false);
            tracing::info!(user = %self.session.username(), "unregistered");
            Ok(reply)
        } else {
            Err(ChatError::Rejected(reply))
        }
    }

    /// Spawn the long-poll loop. Requires a successful [`ChatClient::register`]
    /// and may only happen once per session.
    pub fn start_loop(&self) -> Result<(), ChatError> {
        if !self.session.is_registered() {
            return Err(ChatError::NotRegistered);
        }
        self.session.begin_running()?;

        let config = WaitLoopConfig {
            wait_timeout: self.options.wait_timeout,
            retry_delay: self.options.retry_delay,
        };
        let handle = tokio::spawn(wait_loop::run(
            self.session.clone(),
            self.dispatcher.clone(),
            config,
        ));
        *self
            .wait_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Clear the running flag and wait up to `join_timeout` for the loop to exit.
    ///
    /// Returns `false` if the loop was still running when the wait ran out; it
    /// is then left to finish on its own at its next wait timeout.
    pub async fn stop_loop(&self, join_timeout: Duration) -> bool {
        self.session.stop();
        let handle = self
            .wait_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return true;
        };

        match tokio::time::timeout(join_timeout, handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(err = %e, "wait loop task ended abnormally");
                true
            }
            Err(_) => {
                tracing::warn!(?join_timeout, "wait loop did not stop in time");
                false
            }
        }
    }

    /// Stop the loop, then unregister if registered.
    ///
    /// Unregistering is best-effort: its error is logged and returned, never
    /// raised as a panic, and the loop is stopped either way.
    pub async fn shutdown(&self) -> Result<String, ChatError> {
        self.stop_loop(self.options.shutdown_join_timeout).await;

        if !self.session.is_registered() {
            return Err(ChatError::NotRegistered);
        }
        let result = self.unregister().await;
        if let Err(e) = &result {
            tracing::warn!(err = %e, "unregister failed during shutdown");
        }
        result
    }

    async fn exchange(&self, request: Request) -> Result<String, ChatError> {
        tracing::debug!(verb = request.verb(), server = %self.session.server_addr(), "exchange");
        connection::exchange(
            self.session.server_host(),
            self.session.server_port(),
            &request,
            self.options.request_timeout,
        )
        .await
        .into_result()
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        // A detached loop would otherwise keep polling forever.
        self.session.stop();
    }
}
