//! Client configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CascError, Result};

/// Configuration shared by the local and remote clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    /// Region used to pick version and CDN rows, such as `us` or `eu`
    pub region: String,

    /// Active locale, such as `enUS`
    pub locale: String,

    /// Root of the on-disk cache
    pub cache_dir: PathBuf,

    /// Base URL of the patch service; derived from the region when unset
    pub patch_host: Option<String>,

    /// Whole-request timeout
    #[serde(with = "secs")]
    pub request_timeout: Duration,

    /// TCP connect timeout
    #[serde(with = "secs")]
    pub connect_timeout: Duration,

    /// Timeout of a single host ping
    #[serde(with = "secs")]
    pub ping_timeout: Duration,

    /// Concurrent archive index downloads
    pub archive_fanout: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            region: "us".to_string(),
            locale: "enUS".to_string(),
            cache_dir: default_cache_dir(),
            patch_host: None,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            ping_timeout: Duration::from_secs(5),
            archive_fanout: 50,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `WOWCASC_*` environment variables
    ///
    /// Unparseable numeric values fall back to their defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs = |name: &str, default: Duration| {
            var(name)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map_or(default, Duration::from_secs)
        };

        Self {
            region: var("WOWCASC_REGION").unwrap_or(defaults.region),
            locale: var("WOWCASC_LOCALE").unwrap_or(defaults.locale),
            cache_dir: var("WOWCASC_CACHE_DIR").map_or(defaults.cache_dir, PathBuf::from),
            patch_host: var("WOWCASC_PATCH_HOST").or(defaults.patch_host),
            request_timeout: secs("WOWCASC_REQUEST_TIMEOUT", defaults.request_timeout),
            connect_timeout: secs("WOWCASC_CONNECT_TIMEOUT", defaults.connect_timeout),
            ping_timeout: defaults.ping_timeout,
            archive_fanout: var("WOWCASC_ARCHIVE_FANOUT")
                .and_then(|v| v.trim().parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.archive_fanout),
        }
    }

    /// Load from a JSON file; absent fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| CascError::CacheIo {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Patch service base URL, always ending in `/`
    pub fn patch_base(&self) -> String {
        let base = self
            .patch_host
            .clone()
            .unwrap_or_else(|| format!("http://{}.patch.battle.net:1119/", self.region));
        if base.ends_with('/') {
            base
        } else {
            format!("{base}/")
        }
    }
}

fn default_cache_dir() -> PathBuf {
    std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))
        .unwrap_or_else(std::env::temp_dir)
        .join("wowcasc")
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.ping_timeout, Duration::from_secs(5));
        assert_eq!(config.archive_fanout, 50);
        assert_eq!(config.patch_base(), "http://us.patch.battle.net:1119/");
    }

    #[test]
    fn test_from_vars() {
        let vars: HashMap<&str, &str> = [
            ("WOWCASC_REGION", "eu"),
            ("WOWCASC_CACHE_DIR", "/tmp/casc"),
            ("WOWCASC_REQUEST_TIMEOUT", "90"),
            ("WOWCASC_CONNECT_TIMEOUT", "soon"),
            ("WOWCASC_ARCHIVE_FANOUT", "0"),
            ("WOWCASC_PATCH_HOST", "http://localhost:8080"),
        ]
        .into_iter()
        .collect();
        let config = ClientConfig::from_vars(|name| vars.get(name).map(ToString::to_string));

        assert_eq!(config.region, "eu");
        assert_eq!(config.locale, "enUS");
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/casc"));
        assert_eq!(config.request_timeout, Duration::from_secs(90));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.archive_fanout, 50);
        assert_eq!(config.patch_base(), "http://localhost:8080/");
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().expect("Test operation should succeed");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"region": "kr", "request_timeout": 5, "archive_fanout": 8}"#)
            .expect("Test operation should succeed");

        let config = ClientConfig::from_json_file(&path).expect("Test operation should succeed");
        assert_eq!(config.region, "kr");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.archive_fanout, 8);
        assert_eq!(config.locale, "enUS");

        let round_trip: ClientConfig = serde_json::from_str(&serde_json::to_string(&config).expect("Test operation should succeed"))
            .expect("Test operation should succeed");
        assert_eq!(round_trip, config);
    }
}
