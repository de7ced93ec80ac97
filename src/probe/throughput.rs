use crate::config::ProbeConfig;
use crate::error::{Result, SpeedError};
use crate::probe::conn::{deadline, Connection};
use crate::types::Server;
use std::time::{Duration, Instant};

const FILLER: &[u8] = b"ABCDEFGHIJ";
const READ_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

impl Direction {
    fn command(self, size: u64) -> String {
        match self {
            Direction::Upload => format!("UPLOAD {} 0\n", size),
            Direction::Download => format!("DOWNLOAD {}\n", size),
        }
    }
}

/// 自适应块大小的吞吐量测试
///
/// 每一轮按上一轮耗时把块大小按比例缩放, 直到单轮耗时达到目标时长,
/// 或者块大小达到上限, 或者轮数用完.
#[derive(Debug, Clone)]
pub struct ThroughputProber {
    config: ProbeConfig,
    filler: Vec<u8>,
}

impl ThroughputProber {
    pub fn new(config: ProbeConfig) -> Self {
        let filler = FILLER
            .iter()
            .copied()
            .cycle()
            .take(config.data_block_size.max(1))
            .collect();
        Self { config, filler }
    }

    /// Upload speed in bits per second.
    pub async fn upstream(&self, server: &Server, target: Duration) -> Result<u64> {
        self.run(server, target, Direction::Upload).await
    }

    /// Download speed in bits per second.
    pub async fn downstream(&self, server: &Server, target: Duration) -> Result<u64> {
        self.run(server, target, Direction::Download).await
    }

    async fn run(&self, server: &Server, target: Duration, direction: Direction) -> Result<u64> {
        let max = self.config.max_transfer_size;
        let mut conn = Connection::connect(&server.host, self.config.connect_timeout()).await?;
        let mut size = self.config.start_block_size.min(max);
        let mut current_bps = 0;

        for round in 0..self.config.max_rounds {
            let cmd = direction.command(size);
            conn.send_line(&cmd, self.config.command_timeout()).await?;

            let start = Instant::now();
            match direction {
                Direction::Upload => {
                    let payload = size.saturating_sub(cmd.len() as u64);
                    deadline(
                        self.config.transfer_timeout(),
                        self.throw_bytes(&mut conn, payload),
                    )
                    .await?
                }
                Direction::Download => {
                    deadline(self.config.transfer_timeout(), read_bytes(&mut conn, size)).await?
                }
            }
            let elapsed = start.elapsed();
            current_bps = bits_per_second(size, elapsed);

            tracing::debug!(
                server = %server.name,
                ?direction,
                round,
                size,
                elapsed_ms = elapsed.as_millis() as u64,
                bps = current_bps,
                "throughput round"
            );

            if elapsed >= target || size >= max {
                conn.close(self.config.command_timeout()).await?;
                return Ok(current_bps);
            }
            size = next_block_size(size, elapsed, target, max);
        }

        // 轮数用完: 最后一轮的结果仍然有效, 只是不够精确
        conn.close(self.config.command_timeout()).await?;
        Ok(current_bps)
    }

    /// 写入 `count` 字节的填充数据, 然后读取服务器的 `OK` 确认
    async fn throw_bytes(&self, conn: &mut Connection, count: u64) -> Result<()> {
        let mut written = 0u64;
        while written < count {
            let chunk = (count - written).min(self.filler.len() as u64) as usize;
            conn.write_all(&self.filler[..chunk], self.config.transfer_timeout())
                .await?;
            written += chunk as u64;
        }

        let ack = match conn.read_line(self.config.transfer_timeout()).await {
            Ok(line) => line,
            Err(SpeedError::ConnectionClosed) => {
                return Err(SpeedError::ProtocolViolation(
                    "failed to get OK on upload".to_string(),
                ))
            }
            Err(e) => return Err(e),
        };
        if !ack.starts_with("OK ") {
            return Err(SpeedError::ProtocolViolation(format!(
                "failed to get OK on upload, got {:?}",
                ack.trim_end()
            )));
        }
        Ok(())
    }
}

/// 读取 `count` 字节; 遇到以换行结尾的读取块时提前停止 (服务器端短传输)
async fn read_bytes(conn: &mut Connection, count: u64) -> Result<()> {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut received = 0u64;

    while received < count {
        let want = (count - received).min(buf.len() as u64) as usize;
        let n = conn.read_some(&mut buf[..want]).await?;
        if n == 0 {
            break;
        }
        received += n as u64;
        if buf[n - 1] == b'\n' {
            break;
        }
    }

    if received != count {
        return Err(SpeedError::ShortTransfer {
            expected: count,
            actual: received,
        });
    }
    Ok(())
}

/// `current * target / elapsed`, clamped to `max`.
pub fn next_block_size(current: u64, elapsed: Duration, target: Duration, max: u64) -> u64 {
    let elapsed_ns = elapsed.as_nanos().max(1);
    let next = current as u128 * target.as_nanos() / elapsed_ns;
    next.clamp(1, max as u128) as u64
}

/// bytes * 8 * 1e9 / elapsed_ns
pub fn bits_per_second(bytes: u64, elapsed: Duration) -> u64 {
    let elapsed_ns = elapsed.as_nanos().max(1);
    let bps = bytes as u128 * 8 * 1_000_000_000 / elapsed_ns;
    bps.min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::testutil::{closed_port, server_at, MockBehavior, MockServer};

    const FAR_TARGET: Duration = Duration::from_secs(60);

    fn small_config() -> ProbeConfig {
        ProbeConfig {
            connect_timeout_ms: 500,
            command_timeout_ms: 500,
            transfer_timeout_ms: 2_000,
            max_transfer_size: 64 * 1024,
            ..Default::default()
        }
    }

    #[test]
    fn test_resize_law() {
        let next = next_block_size(
            4096,
            Duration::from_secs(2),
            Duration::from_secs(5),
            8 * 1024 * 1024,
        );
        assert_eq!(next, 10240);
    }

    #[test]
    fn test_resize_clamps_to_max() {
        let next = next_block_size(4096, Duration::from_millis(1), Duration::from_secs(5), 65536);
        assert_eq!(next, 65536);
        // zero elapsed must not divide by zero
        assert_eq!(next_block_size(4096, Duration::ZERO, Duration::from_secs(5), 1000), 1000);
    }

    #[test]
    fn test_bits_per_second() {
        assert_eq!(bits_per_second(1_000_000, Duration::from_secs(1)), 8_000_000);
        assert_eq!(bits_per_second(4096, Duration::from_millis(500)), 65536);
        assert!(bits_per_second(1, Duration::ZERO) > 0);
    }

    #[tokio::test]
    async fn test_downstream_against_well_formed_server() -> Result<()> {
        let server = MockServer::spawn(MockBehavior::WellFormed).await?;
        let prober = ThroughputProber::new(small_config());

        let bps = prober.downstream(&server.server(), FAR_TARGET).await?;
        assert!(bps > 0);

        // 4096 is far too quick for a 60 s target, so the second round jumps to the cap
        assert_eq!(
            server.commands(),
            vec!["DOWNLOAD 4096", "DOWNLOAD 65536", "QUIT"]
        );
        assert_eq!(server.accepted(), 1);
        server.wait_closed(1).await;
        Ok(())
    }

    #[tokio::test]
    async fn test_upstream_against_well_formed_server() -> Result<()> {
        let server = MockServer::spawn(MockBehavior::WellFormed).await?;
        let prober = ThroughputProber::new(small_config());

        let bps = prober.upstream(&server.server(), FAR_TARGET).await?;
        assert!(bps > 0);
        assert_eq!(
            server.commands(),
            vec!["UPLOAD 4096 0", "UPLOAD 65536 0", "QUIT"]
        );
        assert_eq!(server.accepted(), 1);
        server.wait_closed(1).await;
        Ok(())
    }

    #[tokio::test]
    async fn test_stops_once_target_duration_reached() -> Result<()> {
        let server = MockServer::spawn(MockBehavior::WellFormed).await?;
        let prober = ThroughputProber::new(small_config());

        let bps = prober.downstream(&server.server(), Duration::ZERO).await?;
        assert!(bps > 0);
        assert_eq!(server.commands(), vec!["DOWNLOAD 4096", "QUIT"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_round_budget_exhaustion_is_not_an_error() -> Result<()> {
        let server = MockServer::spawn(MockBehavior::WellFormed).await?;
        let prober = ThroughputProber::new(ProbeConfig {
            max_rounds: 1,
            max_transfer_size: 8 * 1024 * 1024,
            ..small_config()
        });

        let bps = prober.upstream(&server.server(), FAR_TARGET).await?;
        assert!(bps > 0);
        assert_eq!(server.commands(), vec!["UPLOAD 4096 0", "QUIT"]);
        server.wait_closed(1).await;
        Ok(())
    }

    #[tokio::test]
    async fn test_short_download() -> Result<()> {
        let server = MockServer::spawn(MockBehavior::ShortDownload(1000)).await?;
        let prober = ThroughputProber::new(small_config());

        let err = prober.downstream(&server.server(), FAR_TARGET).await.unwrap_err();
        assert!(matches!(
            err,
            SpeedError::ShortTransfer {
                expected: 4096,
                actual: 1000
            }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_newline_ends_download_early() -> Result<()> {
        let server = MockServer::spawn(MockBehavior::NewlineCutDownload(100)).await?;
        let prober = ThroughputProber::new(ProbeConfig {
            transfer_timeout_ms: 5_000,
            ..small_config()
        });

        let start = Instant::now();
        let err = prober.downstream(&server.server(), FAR_TARGET).await.unwrap_err();
        assert!(matches!(
            err,
            SpeedError::ShortTransfer {
                expected: 4096,
                actual: 100
            }
        ));
        // the server keeps the socket open, so only the newline can end the read
        assert!(start.elapsed() < Duration::from_secs(2));
        server.wait_closed(1).await;
        Ok(())
    }

    #[tokio::test]
    async fn test_bad_upload_ack() -> Result<()> {
        let server = MockServer::spawn(MockBehavior::BadUploadAck).await?;
        let prober = ThroughputProber::new(small_config());

        let err = prober.upstream(&server.server(), FAR_TARGET).await.unwrap_err();
        assert!(matches!(err, SpeedError::ProtocolViolation(_)));
        server.wait_closed(1).await;
        Ok(())
    }

    #[tokio::test]
    async fn test_silent_server_times_out() -> Result<()> {
        let server = MockServer::spawn(MockBehavior::Silent).await?;
        let prober = ThroughputProber::new(ProbeConfig {
            transfer_timeout_ms: 100,
            ..small_config()
        });

        let err = prober.downstream(&server.server(), FAR_TARGET).await.unwrap_err();
        assert!(matches!(err, SpeedError::Timeout));
        server.wait_closed(1).await;
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_server() -> Result<()> {
        let host = closed_port().await?;
        let prober = ThroughputProber::new(small_config());

        let err = prober.upstream(&server_at(&host), FAR_TARGET).await.unwrap_err();
        assert!(matches!(err, SpeedError::Unreachable(_) | SpeedError::Timeout));
        Ok(())
    }
}
