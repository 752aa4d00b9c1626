use crate::client::ClientOptions;
use crate::error::ChatError;
use crate::session::{Session, resolve_username};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";
pub const DEFAULT_SERVER_PORT: u16 = 9000;

/// Client settings, read from `config.toml`.
///
/// Every field is optional in the file; missing ones take their defaults.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub server_host: String,
    pub server_port: u16,
    /// Falls back to the host name when unset.
    pub username: Option<String>,
    pub wait_timeout_secs: u64,
    pub retry_delay_ms: u64,
    /// Unset means register/send/unregister wait as long as the OS allows.
    pub request_timeout_secs: Option<u64>,
    pub shutdown_join_timeout_ms: u64,
}

impl ClientConfig {
    /// Load from [`ClientConfig::config_path`], or defaults if there is no file.
    pub fn load() -> Result<Self, ChatError> {
        Self::load_from(&Self::config_path())
    }

    /// Load from `path`, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ChatError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// `$LANCHAT_CONFIG`, else `config.toml` under the lanchat config dir.
    pub fn config_path() -> PathBuf {
        if let Ok(p) = std::env::var("LANCHAT_CONFIG") {
            return PathBuf::from(p);
        }
        dirs_path().join("config.toml")
    }

    pub fn validate(&self) -> Result<(), ChatError> {
        if self.server_host.trim().is_empty() {
            return Err(ChatError::Config("server_host must not be empty".to_string()));
        }
        if self.server_port == 0 {
            return Err(ChatError::Config("server_port must not be 0".to_string()));
        }
        if self.wait_timeout_secs == 0 {
            return Err(ChatError::Config("wait_timeout_secs must be at least 1".to_string()));
        }
        if self.retry_delay_ms == 0 {
            return Err(ChatError::Config("retry_delay_ms must be at least 1".to_string()));
        }
        if self.request_timeout_secs == Some(0) {
            return Err(ChatError::Config("request_timeout_secs must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Build the session this config describes, resolving the username.
    pub fn session(&self) -> Result<Session, ChatError> {
        Session::new(
            resolve_username(self.username.as_deref()),
            self.server_host.clone(),
            self.server_port,
        )
    }

    pub fn options(&self) -> ClientOptions {
        ClientOptions {
            wait_timeout: Duration::from_secs(self.wait_timeout_secs),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
            shutdown_join_timeout: Duration::from_millis(self.shutdown_join_timeout_ms),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_host: DEFAULT_SERVER_HOST.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            username: None,
            wait_timeout_secs: 60,
            retry_delay_ms: 1000,
            request_timeout_secs: None,
            shutdown_join_timeout_ms: 2000,
        }
    }
}

fn dirs_path() -> PathBuf {
    if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(config_dir).join("lanchat")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config").join("lanchat")
    } else {
        PathBuf::from("/tmp/lanchat")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.server_port, 9000);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "server_host = \"192.168.1.20\"\nserver_port = 9100\nusername = \"alice\"\n",
        )
        .unwrap();

        let config = ClientConfig::load_from(&path).unwrap();
        assert_eq!(config.server_host, "192.168.1.20");
        assert_eq!(config.server_port, 9100);
        assert_eq!(config.username.as_deref(), Some("alice"));
        assert_eq!(config.wait_timeout_secs, 60);

        let session = config.session().unwrap();
        assert_eq!(session.username(), "alice");
        assert_eq!(session.server_addr(), "192.168.1.20:9100");
    }

    #[test]
    fn options_convert_units() {
        let config = ClientConfig {
            wait_timeout_secs: 5,
            retry_delay_ms: 250,
            request_timeout_secs: Some(3),
            ..ClientConfig::default()
        };
        let options = config.options();
        assert_eq!(options.wait_timeout, Duration::from_secs(5));
        assert_eq!(options.retry_delay, Duration::from_millis(250));
        assert_eq!(options.request_timeout, Some(Duration::from_secs(3)));
        assert_eq!(options.shutdown_join_timeout, Duration::from_secs(2));
    }

    #[test]
    fn rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        std::fs::write(&path, "server_port = 0\n").unwrap();
        assert!(matches!(
            ClientConfig::load_from(&path),
            Err(ChatError::Config(_))
        ));

        std::fs::write(&path, "wait_timeout_secs = 0\n").unwrap();
        assert!(matches!(
            ClientConfig::load_from(&path),
            Err(ChatError::Config(_))
        ));

        std::fs::write(&path, "retry_delay_ms = 0\n").unwrap();
        assert!(matches!(
            ClientConfig::load_from(&path),
            Err(ChatError::Config(_))
        ));

        std::fs::write(&path, "request_timeout_secs = 0\n").unwrap();
        assert!(matches!(
            ClientConfig::load_from(&path),
            Err(ChatError::Config(_))
        ));

        std::fs::write(&path, "ip = \"10.0.0.1\"\n").unwrap();
        assert!(matches!(
            ClientConfig::load_from(&path),
            Err(ChatError::Config(_))
        ));
    }

    #[test]
    fn blank_username_falls_back() {
        let config = ClientConfig {
            username: Some("  ".to_string()),
            ..ClientConfig::default()
        };
        let session = config.session().unwrap();
        assert!(!session.username().is_empty());
    }
}
