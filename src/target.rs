//! Custom-scheme request targets.
//!
//! A target names an archive and a path inside it:
//! `kiwix://<archive-id>/<percent-encoded path>`.

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("malformed URL: {0}")]
    Malformed(#[from] url::ParseError),

    #[error("unexpected scheme '{found}', expected '{expected}'")]
    WrongScheme { found: String, expected: String },

    #[error("missing archive id")]
    MissingArchive,

    #[error("path is not valid UTF-8 after percent-decoding")]
    InvalidEncoding,
}

/// Parsed request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    url: Url,
    archive_id: String,
    path: String,
}

impl Target {
    /// Parse `raw`, requiring the given custom scheme.
    pub fn parse(raw: &str, scheme: &str) -> Result<Self, TargetError> {
        let url = Url::parse(raw)?;

        if !url.scheme().eq_ignore_ascii_case(scheme) {
            return Err(TargetError::WrongScheme {
                found: url.scheme().to_string(),
                expected: scheme.to_string(),
            });
        }

        let archive_id = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(TargetError::MissingArchive),
        };

        let path = percent_decode_str(url.path())
            .decode_utf8()
            .map_err(|_| TargetError::InvalidEncoding)?
            .trim_start_matches('/')
            .to_string();

        Ok(Self {
            url,
            archive_id,
            path,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn archive_id(&self) -> &str {
        &self.archive_id
    }

    /// Decoded in-archive path without a leading slash.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment, empty for the archive root.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    /// Same archive, different path. Used to follow main-page lookups.
    ///
    /// The URL is rebuilt so diagnostics name the path actually read.
    pub fn with_path(&self, path: &str) -> Self {
        let path = path.trim_start_matches('/');
        let mut url = self.url.clone();
        url.set_path(&format!("/{path}"));
        url.set_query(None);
        url.set_fragment(None);
        Self {
            url,
            archive_id: self.archive_id.clone(),
            path: path.to_string(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Policy rejecting media player scripts before any lookup happens.
///
/// A target is blocked when its file name ends with `suffix` and contains
/// any of `markers`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BlockedScriptPolicy {
    #[serde(default = "default_suffix")]
    pub suffix: String,
    #[serde(default = "default_markers")]
    pub markers: Vec<String>,
}

impl Default for BlockedScriptPolicy {
    fn default() -> Self {
        Self {
            suffix: default_suffix(),
            markers: default_markers(),
        }
    }
}

fn default_suffix() -> String {
    ".js".to_string()
}

fn default_markers() -> Vec<String> {
    vec!["video".to_string(), "ogv".to_string()]
}

impl BlockedScriptPolicy {
    pub fn is_blocked(&self, target: &Target) -> bool {
        let name = target.file_name();
        name.ends_with(&self.suffix) && self.markers.iter().any(|m| name.contains(m.as_str()))
    }
}
