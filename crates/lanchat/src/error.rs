use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out waiting for the server")]
    Timeout,

    #[error("server rejected request: {0}")]
    Rejected(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not registered with the server")]
    NotRegistered,

    #[error("wait loop already started for this session")]
    AlreadyStarted,

    #[error("session has been shut down")]
    SessionClosed,

    #[error("invalid config: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// Whether the failure came from the network rather than the server or the caller.
    pub fn is_transport(&self) -> bool {
        matches!(self, ChatError::Transport(_) | ChatError::Timeout)
    }
}

impl From<toml::de::Error> for ChatError {
    fn from(e: toml::de::Error) -> Self {
        ChatError::Config(e.to_string())
    }
}
