use crate::error::Result;
use crate::types::{DirectorySnapshot, Server};
use async_trait::async_trait;
use std::time::Duration;

/// DirectorySource: 服务器目录的提供者 (speedtest.net, 本地 JSON 文件 ...)
#[async_trait]
pub trait DirectorySource: Sync + Send {
    /// 来源名称, 用于日志显示
    fn name(&self) -> &'static str;

    /// 拉取客户端位置, 原始服务器列表以及需要忽略的服务器 ID
    async fn fetch(&self) -> Result<DirectorySnapshot>;
}

/// LatencyProbe: 候选服务器选择器依赖的延迟探测接口
#[async_trait]
pub trait LatencyProbe: Sync + Send {
    /// 对单台服务器做 `count` 次往返, 返回中位数延迟
    /// 失败时不产生任何部分结果
    async fn median_ping(&self, server: &Server, count: usize) -> Result<Duration>;
}
