use crate::error::Result;
use crate::traits::DirectorySource;
use crate::types::DirectorySnapshot;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;

/// 从本地 JSON 文件读取服务器目录 (离线使用或私有测速节点)
pub struct JsonDirectory {
    path: PathBuf,
}

impl JsonDirectory {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl DirectorySource for JsonDirectory {
    fn name(&self) -> &'static str {
        "json"
    }

    async fn fetch(&self) -> Result<DirectorySnapshot> {
        let content = fs::read_to_string(&self.path).await?;
        let snapshot: DirectorySnapshot = serde_json::from_str(&content)?;
        tracing::info!(
            path = %self.path.display(),
            servers = snapshot.servers.len(),
            "loaded directory file"
        );
        Ok(snapshot)
    }
}
