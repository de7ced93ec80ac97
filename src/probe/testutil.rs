//! In-process speed server speaking the PING/DOWNLOAD/UPLOAD/QUIT line protocol.

use crate::types::Server;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone, Copy)]
pub enum MockBehavior {
    WellFormed,
    /// Answers the n-th PING (0-based) with `PONG notanumber`
    BadPongAt(usize),
    /// Hangs up instead of answering the n-th PING
    HangUpAfterPongs(usize),
    /// Sends this many bytes for a DOWNLOAD, then closes
    ShortDownload(u64),
    /// Sends this many bytes for a DOWNLOAD, the last one `\n`, and keeps the connection open
    NewlineCutDownload(u64),
    BadUploadAck,
    /// Reads commands but never answers
    Silent,
}

pub struct MockServer {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    pub async fn spawn(behavior: MockBehavior) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let accepted = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let commands = Arc::new(Mutex::new(Vec::new()));

        let (acc, cls, cmds) = (accepted.clone(), closed.clone(), commands.clone());
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                acc.fetch_add(1, Ordering::SeqCst);
                let (cls, cmds) = (cls.clone(), cmds.clone());
                tokio::spawn(async move {
                    serve(stream, behavior, cmds).await;
                    cls.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        Ok(Self {
            addr,
            accepted,
            closed,
            commands,
        })
    }

    pub fn server(&self) -> Server {
        server_at(&self.addr.to_string())
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// The client may still be tearing down when the probe returns.
    pub async fn wait_closed(&self, expected: usize) {
        for _ in 0..200 {
            if self.closed.load(Ordering::SeqCst) >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(self.closed.load(Ordering::SeqCst), expected);
    }
}

async fn serve(stream: TcpStream, behavior: MockBehavior, commands: Arc<Mutex<Vec<String>>>) {
    let (rd, mut wr) = stream.into_split();
    let mut rd = BufReader::new(rd);
    let mut pings = 0usize;

    loop {
        let mut line = String::new();
        match rd.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        commands.lock().unwrap().push(line.trim_end().to_string());

        let mut fields = line.split_whitespace();
        let verb = fields.next().unwrap_or_default();
        let size: u64 = fields.next().and_then(|v| v.parse().ok()).unwrap_or(0);

        let res = match (verb, behavior) {
            (_, MockBehavior::Silent) | ("QUIT", _) => continue,
            ("PING", MockBehavior::HangUpAfterPongs(n)) if pings == n => break,
            ("PING", MockBehavior::BadPongAt(n)) if pings == n => {
                wr.write_all(b"PONG notanumber\n").await
            }
            ("PING", _) => wr.write_all(format!("PONG {}\n", size).as_bytes()).await,
            ("DOWNLOAD", MockBehavior::ShortDownload(k)) => {
                let _ = wr.write_all(&vec![b'A'; k as usize]).await;
                break;
            }
            ("DOWNLOAD", MockBehavior::NewlineCutDownload(k)) => {
                let mut data = vec![b'A'; k as usize];
                if let Some(last) = data.last_mut() {
                    *last = b'\n';
                }
                wr.write_all(&data).await
            }
            ("DOWNLOAD", _) => {
                let mut data = vec![b'A'; size as usize];
                if let Some(last) = data.last_mut() {
                    *last = b'\n';
                }
                wr.write_all(&data).await
            }
            ("UPLOAD", _) => {
                let payload = size.saturating_sub(line.len() as u64);
                let mut sink = vec![0u8; payload as usize];
                if rd.read_exact(&mut sink).await.is_err() {
                    break;
                }
                let ack: &[u8] = match behavior {
                    MockBehavior::BadUploadAck => b"NOPE\n",
                    _ => b"OK 0 0\n",
                };
                wr.write_all(ack).await
            }
            _ => break,
        };
        if verb == "PING" {
            pings += 1;
        }
        if res.is_err() {
            break;
        }
    }
}

pub fn server_at(host: &str) -> Server {
    Server {
        id: 1,
        name: format!("mock {}", host),
        sponsor: "Mock".to_string(),
        country: "Nowhere".to_string(),
        lat: 0.0,
        lon: 0.0,
        distance: 0.0,
        host: host.to_string(),
        latency: None,
    }
}

/// An address nothing is listening on.
pub async fn closed_port() -> std::io::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr.to_string())
}
