use crate::config::SelectConfig;
use crate::directory::Directory;
use crate::error::{Result, SpeedError};
use crate::traits::LatencyProbe;
use crate::types::Server;

/// 由近到远逐个测延迟, 收集前 `want_count` 台可响应的服务器
///
/// 失败计数在整个选择过程中累计, 不因中间的成功而清零.
/// 达到 `max_failures` 时: 已有成功结果则返回部分列表, 否则返回 `NoResponsiveServers`.
/// 成功探测的延迟会回写到目录中对应的服务器上.
pub async fn select<P, F>(
    directory: &mut Directory,
    probe: &P,
    config: &SelectConfig,
    mut on_probe: F,
) -> Result<Vec<Server>>
where
    P: LatencyProbe + ?Sized,
    F: FnMut(&Server, &Result<std::time::Duration>),
{
    let mut chosen: Vec<Server> = Vec::new();
    let mut failures = 0usize;

    for server in directory.servers_mut() {
        if chosen.len() >= config.want_count {
            break;
        }
        if failures >= config.max_failures {
            break;
        }

        let res = probe.median_ping(server, config.sample_count).await;
        on_probe(server, &res);

        match res {
            Ok(latency) => {
                server.latency = Some(latency);
                tracing::info!(
                    server = %server.name,
                    distance_km = server.distance,
                    latency_ms = latency.as_millis() as u64,
                    "candidate responded"
                );
                chosen.push(server.clone());
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(server = %server.name, error = %e, failures, "candidate failed");
            }
        }
    }

    if chosen.is_empty() {
        return Err(SpeedError::NoResponsiveServers);
    }
    Ok(chosen)
}

/// 不做任何网络探测, 返回名称包含 `query` 的所有服务器 (忽略大小写)
pub fn filter_by_name(directory: &Directory, query: &str) -> Result<Vec<Server>> {
    let needle = query.to_lowercase();
    let matches: Vec<Server> = directory
        .servers()
        .iter()
        .filter(|s| s.name.to_lowercase().contains(&needle))
        .cloned()
        .collect();

    if matches.is_empty() {
        return Err(SpeedError::NoMatches(query.to_string()));
    }
    Ok(matches)
}
