//! Revision engine
//!
//! Pure functions over a [`Storer`]: content reconstruction by replaying the
//! patch chain, diffs, the dirty check, and revision encoding. No I/O of its
//! own and no logging.
//!
//! Revision bytes are zstd compressed. The first commit of a chain stores the
//! full content; every later commit stores a bincode [`Patch`] against the
//! content of the commit before it.

use crate::delta::{FileDiff, Patch};
use crate::error::{Error, Result};
use crate::object::ContentHash;
use crate::storage::Storer;

const COMPRESSION_LEVEL: i32 = 3;

/// Compress revision bytes
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    zstd::encode_all(data, COMPRESSION_LEVEL)
        .map_err(|e| Error::Serialization(format!("compression failed: {}", e)))
}

/// Decompress the revision stored for `hash`. Failure is always corruption.
pub fn uncompress(hash: &ContentHash, data: &[u8]) -> Result<Vec<u8>> {
    zstd::decode_all(data).map_err(|e| Error::corrupt(hash, format!("decompression failed: {}", e)))
}

/// Fetch and decompress the raw revision for `hash`
pub fn uncompress_revision(storer: &dyn Storer, hash: &ContentHash) -> Result<Vec<u8>> {
    let data = storer.revision(hash)?;
    uncompress(hash, &data)
}

/// Build the revision bytes for a new commit of `content` on top of `prev`
pub fn new_revision(prev: Option<&[u8]>, content: &[u8]) -> Result<Vec<u8>> {
    match prev {
        None => compress(content),
        Some(prev) => compress(&Patch::compute(prev, content).to_bytes()?),
    }
}

/// Apply one stored revision to the content of its predecessor and verify
/// the result hashes to `hash`
pub fn apply_revision(prev: Option<&[u8]>, hash: &ContentHash, revision: &[u8]) -> Result<Vec<u8>> {
    let raw = uncompress(hash, revision)?;
    let content = match prev {
        None => raw,
        Some(prev) => {
            let patch = Patch::from_bytes(&raw)
                .map_err(|e| Error::corrupt(hash, format!("undecodable patch: {}", e)))?;
            patch
                .apply(prev)
                .map_err(|e| Error::corrupt(hash, format!("patch failed: {}", e)))?
        }
    };
    let actual = ContentHash::of(&content);
    if actual != *hash {
        return Err(Error::corrupt(hash, format!("content hashes to {}", actual)));
    }
    Ok(content)
}

/// Reconstruct the full content at `hash` by replaying the chain up to it
pub fn reconstruct(storer: &dyn Storer, hash: &ContentHash) -> Result<Vec<u8>> {
    let hashes = storer.hashes()?;
    let target = hashes
        .iter()
        .position(|h| h == hash)
        .ok_or_else(|| Error::CommitNotFound {
            alias: storer.alias().to_string(),
            hash: *hash,
        })?;

    let mut content: Option<Vec<u8>> = None;
    for h in &hashes[..=target] {
        let revision = storer.revision(h)?;
        content = Some(apply_revision(content.as_deref(), h, &revision)?);
    }
    // target is in range, so the loop ran at least once
    content.ok_or_else(|| Error::NoCommits(storer.alias().to_string()))
}

/// Diff the content at `from` against the content at `to`, or against the
/// working copy when `to` is `None`
pub fn diff(storer: &dyn Storer, from: &ContentHash, to: Option<&ContentHash>) -> Result<FileDiff> {
    let old = reconstruct(storer, from)?;
    let new = match to {
        Some(hash) => reconstruct(storer, hash)?,
        None => storer
            .working_copy()?
            .ok_or_else(|| Error::MissingWorkingCopy(storer.alias().to_string()))?,
    };
    if old == new {
        return Err(Error::NoChanges);
    }
    Ok(FileDiff::compute(&old, &new))
}

/// Whether the working copy matches the content at `hash`. A missing working
/// copy has nothing to lose and counts as clean.
pub fn is_clean(storer: &dyn Storer, hash: &ContentHash) -> Result<bool> {
    let Some(working) = storer.working_copy()? else {
        return Ok(true);
    };
    Ok(reconstruct(storer, hash)? == working)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::MemoryStorer;

    const C1: &[u8] = b"export A=1\n";
    const C2: &[u8] = b"export A=1\nexport B=2\n";

    fn bashrc() -> (MemoryStorer, ContentHash, ContentHash) {
        let mut s = MemoryStorer::new("bashrc");
        let h1 = s.commit(C1).unwrap();
        let h2 = s.commit(C2).unwrap();
        (s, h1, h2)
    }

    #[test]
    fn test_round_trip_first_commit() {
        let mut s = MemoryStorer::new("gitconfig");
        let content = b"[user]\n\tname = a\n";
        let hash = s.commit(content).unwrap();
        assert_eq!(hash, ContentHash::of(content));
        assert_eq!(reconstruct(&s, &hash).unwrap(), content);
    }

    #[test]
    fn test_chain_replay_every_step() {
        let mut s = MemoryStorer::new("zshrc");
        let steps: Vec<String> = (1..=6)
            .map(|n| (1..=n).map(|i| format!("alias a{}=b{}\n", i, i * n)).collect())
            .collect();
        let hashes: Vec<_> = steps.iter().map(|c| s.commit(c.as_bytes()).unwrap()).collect();
        for (hash, content) in hashes.iter().zip(&steps) {
            assert_eq!(reconstruct(&s, hash).unwrap(), content.as_bytes());
        }
    }

    #[test]
    fn test_bashrc_scenario() {
        let (s, h1, h2) = bashrc();
        let d = diff(&s, &h1, Some(&h2)).unwrap();
        assert_eq!(d.added_lines().collect::<Vec<_>>(), vec!["export B=2"]);
        assert_eq!(d.removed_lines().count(), 0);
        assert_eq!(reconstruct(&s, &h2).unwrap(), C2);
        assert_eq!(reconstruct(&s, &h1).unwrap(), C1);
    }

    #[test]
    fn test_reconstruct_unknown_hash() {
        let (s, _, _) = bashrc();
        let err = reconstruct(&s, &ContentHash::of(b"other")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_reconstruct_detects_hash_mismatch() {
        let mut s = MemoryStorer::new("bashrc");
        let lie = ContentHash::of(b"something else");
        s.push_raw(lie, compress(C1).unwrap());
        let err = reconstruct(&s, &lie).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptChain);
    }

    #[test]
    fn test_reconstruct_detects_bad_compression() {
        let mut s = MemoryStorer::new("bashrc");
        let hash = ContentHash::of(C1);
        s.push_raw(hash, b"not zstd".to_vec());
        let err = reconstruct(&s, &hash).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptChain);
        assert_eq!(uncompress_revision(&s, &hash).unwrap_err().kind(), ErrorKind::CorruptChain);
    }

    #[test]
    fn test_reconstruct_detects_patch_on_wrong_base() {
        let mut s = MemoryStorer::new("bashrc");
        let h1 = ContentHash::of(C1);
        s.push_raw(h1, compress(C1).unwrap());
        let patch = Patch::compute(b"a different base\n", C2).to_bytes().unwrap();
        let h2 = ContentHash::of(C2);
        s.push_raw(h2, compress(&patch).unwrap());
        assert_eq!(reconstruct(&s, &h2).unwrap_err().kind(), ErrorKind::CorruptChain);
    }

    #[test]
    fn test_uncompress_revision_ok() {
        let (s, h1, _) = bashrc();
        assert_eq!(uncompress_revision(&s, &h1).unwrap(), C1);
    }

    #[test]
    fn test_diff_identical_is_no_changes() {
        let (s, h1, _) = bashrc();
        assert!(diff(&s, &h1, Some(&h1)).unwrap_err().is_no_changes());
    }

    #[test]
    fn test_diff_against_working_copy() {
        let (mut s, _, h2) = bashrc();
        s.set_working_copy(Some(b"export B=2\n".to_vec()));
        let d = diff(&s, &h2, None).unwrap();
        assert_eq!(d.removed_lines().collect::<Vec<_>>(), vec!["export A=1"]);

        s.set_working_copy(None);
        assert_eq!(diff(&s, &h2, None).unwrap_err().kind(), ErrorKind::NotFound);

        s.set_working_copy(Some(C2.to_vec()));
        assert!(diff(&s, &h2, None).unwrap_err().is_no_changes());
    }

    #[test]
    fn test_is_clean_single_byte_flip() {
        let (mut s, _, h2) = bashrc();
        s.set_working_copy(Some(C2.to_vec()));
        assert!(is_clean(&s, &h2).unwrap());

        let mut flipped = C2.to_vec();
        flipped[3] ^= 0x01;
        s.set_working_copy(Some(flipped));
        assert!(!is_clean(&s, &h2).unwrap());
    }

    #[test]
    fn test_is_clean_without_working_copy() {
        let (s, _, h2) = bashrc();
        assert!(is_clean(&s, &h2).unwrap());
    }

    #[test]
    fn test_empty_working_copy_is_content() {
        let (mut s, h1, _) = bashrc();
        s.set_working_copy(Some(Vec::new()));
        assert!(!is_clean(&s, &h1).unwrap());

        let mut empty = MemoryStorer::new("empty");
        let h = empty.commit(b"").unwrap();
        empty.set_working_copy(Some(Vec::new()));
        assert!(is_clean(&empty, &h).unwrap());
    }
}
