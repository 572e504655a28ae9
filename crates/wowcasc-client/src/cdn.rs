//! CDN addressing and host selection

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{CascError, Result};
use crate::transport::HttpClient;

/// Split a key into the CDN fan-out path `ab/cd/abcd...`
///
/// Keys shorter than four characters are returned unchanged.
pub fn format_cdn_key(key: &str) -> String {
    match (key.get(0..2), key.get(2..4)) {
        (Some(a), Some(b)) => format!("{a}/{b}/{key}"),
        _ => key.to_string(),
    }
}

/// Measures how quickly a CDN host answers
#[async_trait]
pub trait HostProbe: Send + Sync {
    /// Round-trip time, or `None` when the host did not answer
    async fn ping(&self, host: &str) -> Option<Duration>;
}

/// Probe issuing a plain HTTP request to the host root
#[derive(Debug, Clone)]
pub struct HttpProbe {
    http: HttpClient,
}

impl HttpProbe {
    /// Probe with the ping timeout of `http`
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HostProbe for HttpProbe {
    async fn ping(&self, host: &str) -> Option<Duration> {
        self.http.ping(&format!("http://{host}/")).await
    }
}

/// Ping every host and pick the fastest
///
/// All pings run to completion before the minimum is taken; on a tie the
/// host listed first wins.
pub async fn resolve_fastest_host(probe: &dyn HostProbe, hosts: &[String]) -> Result<String> {
    let latencies = join_all(hosts.iter().map(|host| probe.ping(host))).await;

    let mut best: Option<(&String, Duration)> = None;
    for (host, latency) in hosts.iter().zip(latencies) {
        match latency {
            Some(latency) => {
                debug!(host, ?latency, "host answered");
                if best.is_none_or(|(_, fastest)| latency < fastest) {
                    best = Some((host, latency));
                }
            }
            None => warn!(host, "host did not answer"),
        }
    }

    let (host, latency) = best.ok_or_else(|| CascError::HostResolution {
        hosts: hosts.to_vec(),
    })?;
    info!(host, ?latency, "selected CDN host");
    Ok(host.clone())
}

/// Base URL of a CDN product path, `http://<host>/<path>/`
pub fn cdn_base_url(host: &str, path: &str) -> Result<Url> {
    let raw = format!("http://{}/{}/", host.trim_end_matches('/'), path.trim_matches('/'));
    Url::parse(&raw).map_err(|e| CascError::missing(format!("valid CDN URL ({raw}): {e}")))
}

/// Kind of CDN resource, which selects the path prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// `config/` documents
    Config,
    /// `data/` blobs and indices
    Data,
}

impl ContentType {
    fn prefix(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Data => "data",
        }
    }
}

/// Resolved CDN product endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdnEndpoint {
    base: Url,
}

impl CdnEndpoint {
    /// Endpoint rooted at `base`, which must end in `/`
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    /// Endpoint for `host` and product `path`
    pub fn from_host(host: &str, path: &str) -> Result<Self> {
        cdn_base_url(host, path).map(Self::new)
    }

    /// Base URL
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// URL of a path relative to the base
    pub fn url(&self, relative: &str) -> Result<String> {
        self.base
            .join(relative)
            .map(String::from)
            .map_err(|e| CascError::missing(format!("valid CDN path ({relative}): {e}")))
    }

    /// URL of a hashed resource, `<base><type>/ab/cd/<key><suffix>`
    pub fn key_url(&self, content: ContentType, key: &str, suffix: &str) -> Result<String> {
        self.url(&format!("{}/{}{suffix}", content.prefix(), format_cdn_key(key)))
    }
}
