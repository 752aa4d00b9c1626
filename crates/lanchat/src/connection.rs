//! One request, one reply, one connection.
//!
//! The protocol has no framing: a reply is whatever arrives in the first
//! read. That only works because each connection carries exactly one
//! exchange, so nothing here ever reuses or pipelines a socket.

use crate::error::ChatError;
use crate::protocol::Request;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Result of a single exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// Raw reply text (lossy UTF-8). Never empty.
    Response(String),
    /// No bytes arrived within the supplied timeout.
    Timeout,
    /// Connect, write or read failed, or the peer closed without replying.
    Failed(String),
}

impl ConnectionOutcome {
    pub fn into_result(self) -> Result<String, ChatError> {
        match self {
            ConnectionOutcome::Response(reply) => Ok(reply),
            ConnectionOutcome::Timeout => Err(ChatError::Timeout),
            ConnectionOutcome::Failed(message) => Err(ChatError::Transport(message)),
        }
    }
}

/// Connect to `host:port`, write `request`, read one reply and close.
///
/// `timeout` bounds the connect and the read separately. A connect that runs
/// out of time is reported as `Failed`; only a silent read is `Timeout`.
/// The socket is dropped before this returns on every path.
pub async fn exchange(
    host: &str,
    port: u16,
    request: &Request,
    timeout: Option<Duration>,
) -> ConnectionOutcome {
    let mut stream = match within(timeout, TcpStream::connect((host, port))).await {
        Some(Ok(stream)) => stream,
        Some(Err(e)) => {
            return ConnectionOutcome::Failed(format!("failed to connect to {host}:{port}: {e}"));
        }
        None => return ConnectionOutcome::Failed(format!("connect to {host}:{port} timed out")),
    };

    if let Err(e) = stream.write_all(&request.encode()).await {
        let verb = request.verb();
        return ConnectionOutcome::Failed(format!("failed to write {verb} request: {e}"));
    }

    let mut buf = vec![0u8; request.max_reply_bytes()];
    let n = match within(timeout, stream.read(&mut buf)).await {
        Some(Ok(0)) => return ConnectionOutcome::Failed("server closed connection".to_string()),
        Some(Ok(n)) => n,
        Some(Err(e)) => {
            let verb = request.verb();
            return ConnectionOutcome::Failed(format!("failed to read {verb} reply: {e}"));
        }
        None => return ConnectionOutcome::Timeout,
    };

    if n == buf.len() {
        tracing::warn!(
            verb = request.verb(),
            limit = buf.len(),
            "reply filled the read buffer and may be truncated"
        );
    }

    ConnectionOutcome::Response(String::from_utf8_lossy(&buf[..n]).into_owned())
}

async fn within<F: Future>(timeout: Option<Duration>, fut: F) -> Option<F::Output> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn register(username: &str) -> Request {
        Request::Register {
            username: username.to_string(),
        }
    }

    #[tokio::test]
    async fn exchange_writes_request_and_returns_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let n = stream.read(&mut buf).await.unwrap();
            stream.write_all(b"OK|registered").await.unwrap();
            String::from_utf8(buf[..n].to_vec()).unwrap()
        });

        let outcome = exchange("127.0.0.1", port, &register("alice"), None).await;
        assert_eq!(outcome, ConnectionOutcome::Response("OK|registered".to_string()));
        assert_eq!(server.await.unwrap(), "REGISTER|alice");
    }

    #[tokio::test]
    async fn silent_server_times_out_and_sees_the_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let _ = stream.read(&mut buf).await.unwrap();
            // Next read returns 0 once the client drops its socket.
            stream.read(&mut buf).await.unwrap()
        });

        let outcome = exchange(
            "127.0.0.1",
            port,
            &register("alice"),
            Some(Duration::from_millis(100)),
        )
        .await;
        assert_eq!(outcome, ConnectionOutcome::Timeout);
        assert_eq!(server.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn close_without_reply_is_a_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let _ = stream.read(&mut buf).await;
        });

        let outcome = exchange("127.0.0.1", port, &register("alice"), None).await;
        match outcome {
            ConnectionOutcome::Failed(msg) => assert!(msg.contains("server closed connection")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn oversized_reply_is_cut_at_the_buffer_size() {
        use crate::protocol::MAX_REPLY_BYTES;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let _ = stream.read(&mut buf).await;
            let reply = format!("OK|{}", "x".repeat(MAX_REPLY_BYTES));
            let _ = stream.write_all(reply.as_bytes()).await;
        });

        match exchange("127.0.0.1", port, &register("alice"), None).await {
            ConnectionOutcome::Response(reply) => {
                assert_eq!(reply.len(), MAX_REPLY_BYTES);
                assert!(reply.starts_with("OK|x"));
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refused_connection_is_a_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let outcome = exchange("127.0.0.1", port, &register("alice"), None).await;
        match outcome {
            ConnectionOutcome::Failed(msg) => {
                assert!(msg.contains("failed to connect"), "got: {msg}")
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn outcomes_map_to_errors() {
        assert_eq!(
            ConnectionOutcome::Response("OK|".to_string())
                .into_result()
                .unwrap(),
            "OK|"
        );
        assert!(matches!(
            ConnectionOutcome::Timeout.into_result(),
            Err(ChatError::Timeout)
        ));
        assert!(matches!(
            ConnectionOutcome::Failed("boom".to_string()).into_result(),
            Err(ChatError::Transport(m)) if m == "boom"
        ));
    }
}
