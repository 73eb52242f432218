//! Client configuration.
//!
//! Parsed from a TOML document shipped alongside the component, or built
//! in code with the `with_*` methods. Every key is optional.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Default chunk size for [`ResponseBody::chunks`](crate::ResponseBody::chunks) (64 KB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// How a header key with several values is laid out in the substrate's
/// field list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeaderEncoding {
    /// One field entry per key, values appended back to back with no
    /// delimiter. `X-A: 1` and `X-A: 2` become a single `X-A: 12`.
    #[default]
    Concatenate,
    /// One field entry per value, in order.
    RepeatFields,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ClientConfig {
    /// Layout of multi-valued request headers (default: concatenate).
    pub header_encoding: HeaderEncoding,
    /// Read size used when a response body is consumed as chunks (default: 64 KB).
    pub chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            header_encoding: HeaderEncoding::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Builder method: set the header encoding.
    pub fn with_header_encoding(self, header_encoding: HeaderEncoding) -> Self {
        Self {
            header_encoding,
            ..self
        }
    }

    /// Builder method: set the body chunk size. Zero is clamped to one byte.
    pub fn with_chunk_size(self, chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            ..self
        }
    }
}
