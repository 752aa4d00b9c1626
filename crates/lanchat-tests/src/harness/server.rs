use anyhow::Result;
use lanchat::Request;
use lanchat::protocol::MAX_EVENT_BYTES;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

/// What the mock server does with one request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Write this text, then close.
    Text(String),
    /// Say nothing and keep the socket open until the client closes it.
    Hold,
    /// Close without replying.
    Close,
}

impl Reply {
    pub fn text(s: &str) -> Self {
        Reply::Text(s.to_string())
    }
}

type Responder = dyn Fn(&Request) -> Reply + Send + Sync;

/// Scripted chat server on a random local port.
///
/// Each accepted connection gets one read, one [`Reply`] from the responder,
/// then a close, mirroring how the real server treats each exchange.
pub struct MockServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Request>>>,
    open: Arc<AtomicUsize>,
    accepted: Arc<AtomicUsize>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockServer {
    pub async fn spawn<F>(responder: F) -> Result<Self>
    where
        F: Fn(&Request) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let requests = Arc::new(Mutex::new(Vec::new()));
        let open = Arc::new(AtomicUsize::new(0));
        let accepted = Arc::new(AtomicUsize::new(0));
        let responder: Arc<Responder> = Arc::new(responder);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let state = (requests.clone(), open.clone(), accepted.clone());
        tokio::spawn(async move {
            let (requests, open, accepted) = state;
            loop {
                tokio::select! {
                    conn = listener.accept() => {
                        let Ok((stream, _)) = conn else { break };
                        accepted.fetch_add(1, Ordering::SeqCst);
                        open.fetch_add(1, Ordering::SeqCst);
                        let requests = requests.clone();
                        let open = open.clone();
                        let responder = responder.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_one(stream, &requests, &*responder).await {
                                tracing::debug!(err = %e, "mock connection ended with error");
                            }
                            open.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        Ok(Self {
            addr,
            requests,
            open,
            accepted,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Server that answers every request with the same text.
    pub async fn always(reply: &str) -> Result<Self> {
        let reply = reply.to_string();
        Self::spawn(move |_| Reply::Text(reply.clone())).await
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Connections currently open from the server's point of view.
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Poll until at least `count` requests match `pred`, or timeout.
    pub async fn wait_for_requests(
        &self,
        count: usize,
        timeout: Duration,
        pred: impl Fn(&Request) -> bool,
    ) -> Vec<Request> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let matching: Vec<Request> = self.requests().into_iter().filter(|r| pred(r)).collect();
            if matching.len() >= count || tokio::time::Instant::now() >= deadline {
                return matching;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Poll until no connection is open, or timeout. Returns the final count.
    pub async fn wait_for_idle(&self, timeout: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let open = self.open_connections();
            if open == 0 || tokio::time::Instant::now() >= deadline {
                return open;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn serve_one(
    mut stream: TcpStream,
    requests: &Mutex<Vec<Request>>,
    responder: &Responder,
) -> Result<()> {
    let mut buf = vec![0u8; MAX_EVENT_BYTES];
    let n = stream.read(&mut buf).await?;
    let Some(request) = Request::parse(&buf[..n]) else {
        let raw = String::from_utf8_lossy(&buf[..n]);
        tracing::debug!(raw = %raw, "mock got unparseable request");
        return Ok(());
    };
    requests.lock().unwrap().push(request.clone());

    match responder(&request) {
        Reply::Text(text) => stream.write_all(text.as_bytes()).await?,
        Reply::Hold => {
            // Returns once the client closes its end.
            while stream.read(&mut buf).await? > 0 {}
        }
        Reply::Close => {}
    }
    Ok(())
}
