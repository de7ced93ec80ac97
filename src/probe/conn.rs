use crate::error::{Result, SpeedError};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// 控制行 (PONG / OK) 的长度上限
const MAX_LINE_LEN: u64 = 1024;

/// 给一个 IO future 加上截止时间, 超时统一映射为 `SpeedError::Timeout`
pub async fn deadline<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(SpeedError::Timeout),
    }
}

/// 一次探测独占的 TCP 连接
///
/// Dropping the value closes the socket, so every early return releases it.
pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Connection {
    pub async fn connect(host: &str, limit: Duration) -> Result<Self> {
        let stream = match tokio::time::timeout(limit, TcpStream::connect(host)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(SpeedError::Unreachable(e)),
            Err(_) => return Err(SpeedError::Timeout),
        };
        // Small command lines must not sit in Nagle's buffer while we time them
        stream.set_nodelay(true)?;

        let (rd, wr) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(rd),
            writer: wr,
        })
    }

    /// Writes one command line; `line` must already end with `\n`.
    pub async fn send_line(&mut self, line: &str, limit: Duration) -> Result<()> {
        self.write_all(line.as_bytes(), limit).await
    }

    pub async fn write_all(&mut self, buf: &[u8], limit: Duration) -> Result<()> {
        let writer = &mut self.writer;
        deadline(limit, async move {
            writer.write_all(buf).await?;
            Ok::<(), SpeedError>(())
        })
        .await
    }

    /// Reads exactly one `\n`-terminated line. EOF before any byte is `ConnectionClosed`.
    pub async fn read_line(&mut self, limit: Duration) -> Result<String> {
        let reader = &mut self.reader;
        deadline(limit, async move {
            let mut line = String::new();
            let n = reader.take(MAX_LINE_LEN).read_line(&mut line).await?;
            if n == 0 {
                return Err(SpeedError::ConnectionClosed);
            }
            if n as u64 >= MAX_LINE_LEN && !line.ends_with('\n') {
                return Err(SpeedError::ProtocolViolation(format!(
                    "response line longer than {} bytes",
                    MAX_LINE_LEN
                )));
            }
            Ok::<String, SpeedError>(line)
        })
        .await
    }

    /// Single read into `buf`; returns 0 on EOF.
    pub async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.reader.read(buf).await?)
    }

    /// Sends `QUIT` and shuts the write side down. No reply is awaited.
    pub async fn close(mut self, limit: Duration) -> Result<()> {
        self.send_line("QUIT\n", limit).await?;
        let writer = &mut self.writer;
        deadline(limit, async move {
            writer.shutdown().await?;
            Ok::<(), SpeedError>(())
        })
        .await
    }
}
