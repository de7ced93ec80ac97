use crate::error::{Result, SpeedError};
use crate::geo;
use crate::types::{ClientLocation, Point, Server, ServerRecord};
use std::collections::HashSet;

/// 按距离升序排列的服务器目录
///
/// 构建后顺序不再改变, 只有 `latency` 字段会被选择器回写
#[derive(Debug, Clone, Default)]
pub struct Directory {
    servers: Vec<Server>,
}

impl Directory {
    /// 过滤 ignore 列表, 计算每台服务器到客户端的距离, 然后稳定排序
    pub fn build(
        client: &ClientLocation,
        records: Vec<ServerRecord>,
        ignore_ids: &HashSet<u32>,
    ) -> Result<Self> {
        let origin = client.point();
        // checked up front so an empty or fully ignored list still rejects a bad client
        geo::distance(origin, origin)
            .map_err(|e| SpeedError::InvalidLocation(format!("client: {}", e)))?;
        let mut servers = Vec::with_capacity(records.len());

        for rec in records {
            if ignore_ids.contains(&rec.id) {
                continue;
            }
            let distance = geo::distance(origin, Point::new(rec.lat, rec.lon))
                .map_err(|e| SpeedError::InvalidLocation(format!("server '{}': {}", rec.name, e)))?;

            servers.push(Server {
                id: rec.id,
                name: rec.name,
                sponsor: rec.sponsor,
                country: rec.country,
                lat: rec.lat,
                lon: rec.lon,
                distance,
                host: rec.host,
                latency: None,
            });
        }

        // sort_by is stable: equal distances keep input order
        servers.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        tracing::debug!(count = servers.len(), "directory built");
        Ok(Self { servers })
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    pub(crate) fn servers_mut(&mut self) -> &mut [Server] {
        &mut self.servers
    }
}
