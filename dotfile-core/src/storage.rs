//! Storage abstraction for commit chains
//!
//! The revision engine only ever talks to a [`Storer`]. The local
//! filesystem store, the SQLite-backed server store and the in-memory
//! store below all implement it.

use crate::error::{Error, Result};
use crate::object::ContentHash;
use crate::revision;

/// Read access to one alias' commit chain
pub trait Storer {
    /// Alias the chain belongs to, used for error context
    fn alias(&self) -> &str;

    /// Raw bytes of the working copy, `None` when there is none
    fn working_copy(&self) -> Result<Option<Vec<u8>>>;

    /// Known commit hashes in chain order
    fn hashes(&self) -> Result<Vec<ContentHash>>;

    /// Compressed revision bytes stored for `hash`
    fn revision(&self, hash: &ContentHash) -> Result<Vec<u8>>;
}

/// Commit chain held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStorer {
    alias: String,
    working: Option<Vec<u8>>,
    chain: Vec<(ContentHash, Vec<u8>)>,
    tail: Option<Vec<u8>>,
}

impl MemoryStorer {
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            ..Default::default()
        }
    }

    /// Replace the working copy
    pub fn set_working_copy(&mut self, content: Option<Vec<u8>>) {
        self.working = content;
    }

    /// Append a commit for `content`, returning its hash
    pub fn commit(&mut self, content: &[u8]) -> Result<ContentHash> {
        let hash = ContentHash::of(content);
        let revision = revision::new_revision(self.tail.as_deref(), content)?;
        self.chain.push((hash, revision));
        self.tail = Some(content.to_vec());
        Ok(hash)
    }

    /// Append already-built revision bytes without verification
    pub fn push_raw(&mut self, hash: ContentHash, revision: Vec<u8>) {
        self.chain.push((hash, revision));
        self.tail = None;
    }
}

impl Storer for MemoryStorer {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn working_copy(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.working.clone())
    }

    fn hashes(&self) -> Result<Vec<ContentHash>> {
        Ok(self.chain.iter().map(|(h, _)| *h).collect())
    }

    fn revision(&self, hash: &ContentHash) -> Result<Vec<u8>> {
        self.chain
            .iter()
            .find(|(h, _)| h == hash)
            .map(|(_, r)| r.clone())
            .ok_or_else(|| Error::CommitNotFound {
                alias: self.alias.clone(),
                hash: *hash,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storer_chain_order() {
        let mut s = MemoryStorer::new("vimrc");
        let h1 = s.commit(b"set nu\n").unwrap();
        let h2 = s.commit(b"set nu\nset hls\n").unwrap();
        assert_eq!(s.hashes().unwrap(), vec![h1, h2]);
        assert!(s.revision(&h2).is_ok());
        assert!(s.working_copy().unwrap().is_none());
    }

    #[test]
    fn test_memory_storer_unknown_hash() {
        let s = MemoryStorer::new("vimrc");
        let err = s.revision(&ContentHash::of(b"nope")).unwrap_err();
        assert!(matches!(err, Error::CommitNotFound { .. }));
    }
}
