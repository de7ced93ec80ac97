use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// 地理坐标 (度)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl Point {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// 客户端自身信息, 由目录服务提供
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientLocation {
    #[serde(default)]
    pub ip: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub isp: String,
    #[serde(default)]
    pub license_key: String,
}

impl ClientLocation {
    pub fn point(&self) -> Point {
        Point::new(self.lat, self.lon)
    }
}

/// 目录中解码出的原始服务器记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub sponsor: String,
    #[serde(default)]
    pub country: String,
    pub host: String,
    pub lat: f64,
    pub lon: f64,
    /// Upload endpoints (`url`, `url2`), kept for callers that want them
    #[serde(default)]
    pub urls: Vec<String>,
}

/// 目录服务一次拉取的结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    pub client: ClientLocation,
    #[serde(default)]
    pub servers: Vec<ServerRecord>,
    #[serde(default)]
    pub ignore_ids: HashSet<u32>,
}

/// 测速服务器
#[derive(Debug, Clone, PartialEq)]
pub struct Server {
    pub id: u32,
    pub name: String,
    pub sponsor: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
    /// km, fixed when the directory is built
    pub distance: f64,
    pub host: String,
    /// Median of the most recent successful latency probe
    pub latency: Option<Duration>,
}
