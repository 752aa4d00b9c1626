use crate::error::ChatError;
use crate::protocol::FIELD_SEPARATOR;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

/// Lifecycle of the wait loop attached to a session.
///
/// `Idle -> Running -> Stopped`, or `Idle -> Stopped`. Never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopped,
}

/// Identity and shared flags of one chat session.
///
/// Shared between the caller and the wait loop through an `Arc`. Everything
/// except the registered marker and the run state is immutable.
#[derive(Debug)]
pub struct Session {
    username: String,
    server_host: String,
    server_port: u16,
    registered: AtomicBool,
    run_state: AtomicU8,
    wake: Notify,
}

impl Session {
    /// Create a session. The username must be non-empty and free of `|`.
    pub fn new(
        username: impl Into<String>,
        server_host: impl Into<String>,
        server_port: u16,
    ) -> Result<Self, ChatError> {
        let username = username.into().trim().to_string();
        if username.is_empty() {
            return Err(ChatError::InvalidInput("username must not be empty".to_string()));
        }
        if username.contains(FIELD_SEPARATOR) {
            return Err(ChatError::InvalidInput(format!(
                "username must not contain '{FIELD_SEPARATOR}'"
            )));
        }
        let server_host = server_host.into();
        if server_host.trim().is_empty() {
            return Err(ChatError::InvalidInput("server host must not be empty".to_string()));
        }

        Ok(Self {
            username,
            server_host,
            server_port,
            registered: AtomicBool::new(false),
            run_state: AtomicU8::new(IDLE),
            wake: Notify::new(),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn server_host(&self) -> &str {
        &self.server_host
    }

    pub fn server_port(&self) -> u16 {
        self.server_port
    }

    /// `host:port`, for logs and messages.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    pub(crate) fn set_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::SeqCst);
    }

    pub fn run_state(&self) -> RunState {
        match self.run_state.load(Ordering::SeqCst) {
            IDLE => RunState::Idle,
            RUNNING => RunState::Running,
            _ => RunState::Stopped,
        }
    }

    /// Whether the wait loop should keep iterating.
    pub fn is_running(&self) -> bool {
        self.run_state() == RunState::Running
    }

    /// Claim the single wait-loop slot.
    pub(crate) fn begin_running(&self) -> Result<(), ChatError> {
        match self
            .run_state
            .compare_exchange(IDLE, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => Ok(()),
            Err(RUNNING) => Err(ChatError::AlreadyStarted),
            Err(_) => Err(ChatError::SessionClosed),
        }
    }

    /// Clear the running flag for good and wake a sleeping retry delay.
    ///
    /// Returns `false` if the session was already stopped.
    pub fn stop(&self) -> bool {
        let previous = self.run_state.swap(STOPPED, Ordering::SeqCst);
        self.wake.notify_one();
        previous != STOPPED
    }

    /// Sleep for `delay`, returning early if [`Session::stop`] is called.
    pub(crate) async fn pause(&self, delay: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.wake.notified() => {}
        }
    }
}

/// Pick the username to register under.
///
/// A non-blank `preferred` wins and is only trimmed, so [`Session::new`]
/// still rejects it if it is invalid. Otherwise the machine host name, then
/// `$USER`, then `"lanchat"`, with separators stripped from the fallbacks.
pub fn resolve_username(preferred: Option<&str>) -> String {
    if let Some(name) = preferred.filter(|name| !name.trim().is_empty()) {
        return name.trim().to_string();
    }
    [host_name(), std::env::var("USER").ok()]
        .into_iter()
        .flatten()
        .map(|name| name.replace(FIELD_SEPARATOR, "").trim().to_string())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| "lanchat".to_string())
}

#[cfg(unix)]
fn host_name() -> Option<String> {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Some(String::from_utf8_lossy(&buf[..end]).into_owned())
}

#[cfg(not(unix))]
fn host_name() -> Option<String> {
    std::env::var("COMPUTERNAME").ok()
}
