use crate::config::ProbeConfig;
use crate::error::{Result, SpeedError};
use crate::probe::conn::Connection;
use crate::traits::LatencyProbe;
use crate::types::Server;
use async_trait::async_trait;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// 基于 PING/PONG 行协议的延迟探测
#[derive(Debug, Clone)]
pub struct LatencyProber {
    config: ProbeConfig,
}

impl LatencyProber {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    /// 在一条连接上发送 `count` 次 PING, 按发送顺序返回每次的往返时间
    ///
    /// 任意一次失败 (超时, 断开, 响应格式错误) 都会丢弃全部样本
    pub async fn ping(&self, server: &Server, count: usize) -> Result<Vec<Duration>> {
        if count > self.config.max_ping_samples {
            return Err(SpeedError::ExcessiveSampleCount {
                requested: count,
                max: self.config.max_ping_samples,
            });
        }

        let mut conn = Connection::connect(&server.host, self.config.ping_timeout()).await?;
        let mut samples = Vec::with_capacity(count);

        for i in 0..count {
            let stamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis();
            let start = Instant::now();
            conn.send_line(&format!("PING {}\n", stamp), self.config.command_timeout())
                .await?;
            let line = conn.read_line(self.config.ping_timeout()).await?;
            let rtt = start.elapsed();

            validate_pong(&line)?;
            tracing::debug!(server = %server.name, sample = i, rtt_us = rtt.as_micros() as u64, "ping");
            samples.push(rtt);
        }

        Ok(samples)
    }
}

#[async_trait]
impl LatencyProbe for LatencyProber {
    async fn median_ping(&self, server: &Server, count: usize) -> Result<Duration> {
        let samples = self.ping(server, count).await?;
        median(samples).ok_or_else(|| SpeedError::Custom("no latency samples requested".to_string()))
    }
}

/// `PONG <integer>`: 恰好两个字段
fn validate_pong(line: &str) -> Result<()> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    match fields.as_slice() {
        ["PONG", value] if value.parse::<i64>().is_ok() => Ok(()),
        _ => Err(SpeedError::ProtocolViolation(format!(
            "expected 'PONG <n>', got {:?}",
            line.trim_end()
        ))),
    }
}

/// Element at `len / 2` after an ascending sort.
pub fn median(mut samples: Vec<Duration>) -> Option<Duration> {
    if samples.is_empty() {
        return None;
    }
    samples.sort();
    Some(samples[samples.len() / 2])
}

/// 完整延迟测试的统计结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyStats {
    pub min: Duration,
    pub max: Duration,
    pub mean: Duration,
    pub median: Duration,
}

impl LatencyStats {
    pub fn from_samples(samples: &[Duration]) -> Option<Self> {
        let min = *samples.iter().min()?;
        let max = *samples.iter().max()?;
        let total: Duration = samples.iter().sum();
        let mean = total / samples.len() as u32;
        let median = median(samples.to_vec())?;
        Some(Self {
            min,
            max,
            mean,
            median,
        })
    }
}
