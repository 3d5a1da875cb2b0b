//! Core object model for dotfile
//!
//! A tracked file is an ordered chain of commits. Each commit is addressed by
//! the SHA-256 of the full content it reconstructs to, not of its stored bytes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;

/// Digest of a file's full content at one commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hash file content
    pub fn of(content: &[u8]) -> Self {
        Self(Sha256::digest(content).into())
    }

    /// Convert to hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hexadecimal string
    pub fn from_hex(hex_str: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(hex_str)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Abbreviated form used in log listings
    pub fn short(&self) -> String {
        self.to_hex()[..7].to_string()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = hex::FromHexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_hex()
    }
}

/// Metadata of one commit in a chain; the revision bytes are stored apart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub hash: ContentHash,
    pub message: String,
    /// Unix seconds
    pub timestamp: i64,
    /// Provenance of a forked first commit: `/username/alias/hash`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forked_from: Option<String>,
}

impl CommitInfo {
    pub fn new(hash: ContentHash, message: impl Into<String>, timestamp: i64) -> Self {
        Self {
            hash,
            message: message.into(),
            timestamp,
            forked_from: None,
        }
    }
}

/// Derived working-copy state of a tracked alias
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// No tracking data for the alias
    Untracked,
    /// Working copy matches the checked out commit
    Clean,
    /// Working copy differs from the checked out commit
    Dirty,
    /// Tracked but the working copy path does not exist
    Missing,
}

impl std::fmt::Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FileState::Untracked => "untracked",
            FileState::Clean => "clean",
            FileState::Dirty => "dirty",
            FileState::Missing => "missing",
        };
        f.write_str(s)
    }
}

/// Provenance message for a forked commit
pub fn fork_message(username: &str, alias: &str, hash: &ContentHash) -> String {
    format!("/{}/{}/{}", username, alias, hash)
}
