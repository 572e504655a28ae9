//! HTTP transport
//!
//! Thin wrapper over a pooled `reqwest` client. Text documents map a
//! non-success status to [`CascError::ConfigFetch`]; binary fetches do the
//! same so callers can tell a missing blob from a transport failure.

use std::sync::Once;
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::header::RANGE;
use reqwest::{Client, ClientBuilder, Response};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{CascError, Result};

static INSTALL_PROVIDER: Once = Once::new();

/// Install the ring TLS provider once per process
fn install_crypto_provider() {
    INSTALL_PROVIDER.call_once(|| {
        // Fails only when another provider is already installed
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// HTTP client with pooled connections and configured timeouts
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    ping_timeout: Duration,
}

impl HttpClient {
    /// Build a client from the timeouts in `config`
    pub fn new(config: &ClientConfig) -> Result<Self> {
        install_crypto_provider();
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(config.archive_fanout.max(1))
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .tcp_nodelay(true)
            .use_rustls_tls()
            .https_only(false)
            .gzip(true)
            .deflate(true)
            .redirect(reqwest::redirect::Policy::limited(3))
            .user_agent(concat!("wowcasc/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            ping_timeout: config.ping_timeout,
        })
    }

    /// Underlying reqwest client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    async fn send(&self, url: &str, range: Option<(u64, u64)>) -> Result<Response> {
        let mut request = self.client.get(url);
        if let Some((offset, len)) = range {
            let end = offset + len.saturating_sub(1);
            request = request.header(RANGE, format!("bytes={offset}-{end}"));
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(url, status = status.as_u16(), "HTTP GET");
        if !status.is_success() {
            return Err(CascError::ConfigFetch {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    /// Fetch a text document
    pub async fn get_text(&self, url: &str) -> Result<String> {
        Ok(self.send(url, None).await?.text().await?)
    }

    /// Fetch a whole binary resource
    pub async fn get_bytes(&self, url: &str) -> Result<Bytes> {
        Ok(self.send(url, None).await?.bytes().await?)
    }

    /// Fetch `len` bytes starting at `offset`
    pub async fn get_range(&self, url: &str, offset: u64, len: u64) -> Result<Bytes> {
        Ok(self.send(url, Some((offset, len))).await?.bytes().await?)
    }

    /// Time a request to `url`; any HTTP response counts as alive
    pub async fn ping(&self, url: &str) -> Option<Duration> {
        let start = Instant::now();
        match self.client.get(url).timeout(self.ping_timeout).send().await {
            Ok(_) => Some(start.elapsed()),
            Err(err) => {
                debug!(url, error = %err, "ping failed");
                None
            }
        }
    }
}
