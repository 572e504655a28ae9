//! `key = value value...` configs fetched from `config/xx/yy/<key>`

use std::collections::HashMap;

use wowcasc_crypto::{ContentKey, EncodingKey};

use super::error::ConfigError;

/// Parse `key = value` lines, skipping blanks and `#` comments
fn parse_lines(content: &str) -> HashMap<String, Vec<String>> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() || !key.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
                return None;
            }
            Some((
                key.to_string(),
                value.split_whitespace().map(String::from).collect(),
            ))
        })
        .collect()
}

fn parse_key<T>(
    field: &'static str,
    value: Option<&str>,
    from_hex: impl Fn(&str) -> Result<T, hex::FromHexError>,
) -> Result<T, ConfigError> {
    let value = value.ok_or(ConfigError::MissingKey(field))?;
    from_hex(value).map_err(|_| ConfigError::InvalidKey {
        field,
        value: value.to_string(),
    })
}

/// Build config: system file references of one build
#[derive(Debug, Clone, Default)]
pub struct BuildConfig {
    entries: HashMap<String, Vec<String>>,
}

impl BuildConfig {
    /// Parse config text
    pub fn parse(content: &str) -> Self {
        Self {
            entries: parse_lines(content),
        }
    }

    /// All values of a key
    pub fn values(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// First value of a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values(key)?.first().map(String::as_str)
    }

    /// Content key of the root manifest
    pub fn root(&self) -> Result<ContentKey, ConfigError> {
        parse_key("root", self.get("root"), ContentKey::from_hex)
    }

    /// Values of `encoding`, as `[ckey, ekey]`
    pub fn encoding(&self) -> Option<&[String]> {
        self.values("encoding")
    }

    /// Encoding key of the encoding table, the second `encoding` value
    pub fn encoding_key(&self) -> Result<EncodingKey, ConfigError> {
        let value = self.encoding().and_then(|v| v.get(1)).map(String::as_str);
        parse_key("encoding", value, EncodingKey::from_hex)
    }

    /// Human readable build name
    pub fn build_name(&self) -> Option<&str> {
        self.get("build-name")
    }
}

/// CDN config: archive list of one build
#[derive(Debug, Clone, Default)]
pub struct CdnConfig {
    entries: HashMap<String, Vec<String>>,
}

impl CdnConfig {
    /// Parse config text
    pub fn parse(content: &str) -> Self {
        Self {
            entries: parse_lines(content),
        }
    }

    /// Archive keys, in file order
    pub fn archives(&self) -> &[String] {
        self.entries.get("archives").map_or(&[], Vec::as_slice)
    }

    /// Combined archive index key, when present
    pub fn archive_group(&self) -> Option<&str> {
        self.entries
            .get("archive-group")
            .and_then(|v| v.first())
            .map(String::as_str)
    }
}
