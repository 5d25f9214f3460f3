//! Checksums for schema sources and registry snapshots

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::engine::SourceFile;

/// SHA256 checksum, hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Checksum over a set of source files, in the order given.
    /// File names take part so that renames change the checksum.
    pub fn from_sources(sources: &[SourceFile]) -> Self {
        let mut hasher = Sha256::new();
        for source in sources {
            let name = source
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            hasher.update(source.contents.as_bytes());
            hasher.update([0u8]);
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Digest of a whole snapshot from its `(kind, checksum)` entries
    pub fn digest<'a>(entries: impl IntoIterator<Item = (&'a str, &'a Checksum)>) -> Self {
        let mut hasher = Sha256::new();
        for (kind, checksum) in entries {
            hasher.update(kind.as_bytes());
            hasher.update(b":");
            hasher.update(checksum.as_str().as_bytes());
            hasher.update(b"\n");
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First characters of the checksum, for log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Checksum {
    fn from(s: String) -> Self {
        Self(s)
    }
}
