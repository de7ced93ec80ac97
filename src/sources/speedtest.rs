use crate::error::{Result, SpeedError};
use crate::traits::DirectorySource;
use crate::types::{ClientLocation, DirectorySnapshot, ServerRecord};
use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

const CLIENT_CONFIG_URL: &str = "http://www.speedtest.net/speedtest-config.php";
const SERVER_LIST_URL: &str = "http://www.speedtest.net/speedtest-servers-static.php?x=whysosad";
const REQUEST_TIMEOUT: u64 = 2;
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 6.1; WOW64; rv:40.0) Gecko/20100101 Firefox/40.1";

/// speedtest.net 公共目录
pub struct SpeedtestNet {
    client_url: String,
    servers_url: String,
    /// Bypass any system proxy
    direct: bool,
}

impl SpeedtestNet {
    pub fn new() -> Self {
        Self {
            client_url: CLIENT_CONFIG_URL.to_string(),
            servers_url: SERVER_LIST_URL.to_string(),
            direct: false,
        }
    }

    #[cfg(test)]
    pub fn with_urls(client_url: &str, servers_url: &str) -> Self {
        Self {
            client_url: client_url.to_string(),
            servers_url: servers_url.to_string(),
            direct: true,
        }
    }
}

impl Default for SpeedtestNet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DirectorySource for SpeedtestNet {
    fn name(&self) -> &'static str {
        "speedtest.net"
    }

    async fn fetch(&self) -> Result<DirectorySnapshot> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT))
            .user_agent(USER_AGENT);
        if self.direct {
            builder = builder.no_proxy();
        }
        let client = builder.build()?;

        // 两个文档互不依赖, 同时请求
        let (config_xml, servers_xml) = futures::future::try_join(
            get_text(&client, &self.client_url),
            get_text(&client, &self.servers_url),
        )
        .await?;

        let (client, ignore_ids) = parse_client_config(&config_xml)?;
        let servers = parse_server_list(&servers_xml)?;
        tracing::info!(
            servers = servers.len(),
            ignored = ignore_ids.len(),
            isp = %client.isp,
            "fetched speedtest.net directory"
        );

        Ok(DirectorySnapshot {
            client,
            servers,
            ignore_ids,
        })
    }
}

async fn get_text(client: &Client, url: &str) -> Result<String> {
    let resp = client.get(url).send().await?;
    if resp.status() != StatusCode::OK {
        return Err(SpeedError::Custom(format!(
            "Invalid status {} from {}",
            resp.status().as_u16(),
            url
        )));
    }
    Ok(resp.text().await?)
}

/// 解析 `<settings>` 文档: licensekey, `<client .../>` 以及 `<server-config ignoreids="..."/>`
pub fn parse_client_config(xml: &str) -> Result<(ClientLocation, HashSet<u32>)> {
    let license_re = Regex::new(r"<licensekey>([^<]*)</licensekey>")?;
    let license_key = license_re
        .captures(xml)
        .map(|caps| unescape(caps[1].trim()))
        .unwrap_or_default();

    let attrs = find_tags(xml, "client")?
        .into_iter()
        .next()
        .ok_or_else(|| SpeedError::InvalidLocation("no <client> element in configuration".to_string()))?;

    let coord = |key: &str| -> Result<f64> {
        attrs
            .get(key)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| SpeedError::InvalidLocation(format!("invalid client attribute '{}'", key)))
    };
    let client = ClientLocation {
        ip: attrs.get("ip").cloned().unwrap_or_default(),
        lat: coord("lat")?,
        lon: coord("lon")?,
        isp: attrs.get("isp").cloned().unwrap_or_default(),
        license_key,
    };

    // 无法解析的 ID 直接跳过
    let ignore_ids: HashSet<u32> = find_tags(xml, "server-config")?
        .into_iter()
        .next()
        .and_then(|attrs| attrs.get("ignoreids").cloned())
        .map(|ids| {
            ids.split(',')
                .filter_map(|id| id.trim().parse::<u32>().ok())
                .collect()
        })
        .unwrap_or_default();

    Ok((client, ignore_ids))
}

/// 解析服务器列表中的每个 `<server .../>`; 缺少必需属性的条目会被跳过
pub fn parse_server_list(xml: &str) -> Result<Vec<ServerRecord>> {
    let mut records = Vec::new();

    for attrs in find_tags(xml, "server")? {
        match to_record(&attrs) {
            Some(rec) => records.push(rec),
            None => tracing::warn!(?attrs, "skipping malformed server entry"),
        }
    }
    Ok(records)
}

fn to_record(attrs: &HashMap<String, String>) -> Option<ServerRecord> {
    let urls = ["url", "url2"]
        .iter()
        .filter_map(|k| attrs.get(*k))
        .filter(|u| !u.is_empty())
        .cloned()
        .collect();

    Some(ServerRecord {
        id: attrs.get("id")?.parse().ok()?,
        name: attrs.get("name")?.clone(),
        sponsor: attrs.get("sponsor").cloned().unwrap_or_default(),
        country: attrs.get("country").cloned().unwrap_or_default(),
        host: attrs.get("host")?.clone(),
        lat: attrs.get("lat")?.parse().ok()?,
        lon: attrs.get("lon")?.parse().ok()?,
        urls,
    })
}

/// 返回所有名为 `name` 的元素的属性表 (按文档顺序)
fn find_tags(xml: &str, name: &str) -> Result<Vec<HashMap<String, String>>> {
    let tag_re = Regex::new(&format!(r"<{}\s([^>]*)>", regex::escape(name)))?;
    let attr_re = Regex::new(r#"([\w:-]+)\s*=\s*"([^"]*)""#)?;

    Ok(tag_re
        .captures_iter(xml)
        .map(|tag| {
            attr_re
                .captures_iter(&tag[1])
                .map(|a| (a[1].to_string(), unescape(&a[2])))
                .collect()
        })
        .collect())
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
