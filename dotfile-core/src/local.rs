//! Local commit chain store
//!
//! Layout on disk:
//! ```text
//! {storage}/
//!   {alias}/
//!     tracking.json          path, checked out hash, commits in chain order
//!     revisions/{hash}       compressed revision bytes
//! ```
//!
//! Paths under the home directory are stored as `~/...` so a file pulled on
//! another machine lands at the same home-relative location.

use crate::delta::FileDiff;
use crate::error::{Error, IoContext, Result, UserError};
use crate::object::{CommitInfo, ContentHash, FileState};
use crate::protocol::TransferCommit;
use crate::revision;
use crate::storage::Storer;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const TRACKING_FILE: &str = "tracking.json";
const REVISIONS_DIR: &str = "revisions";

/// Tracking data persisted per alias
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingData {
    /// Working copy location, home-relative as `~/...` when possible
    pub path: String,
    /// Checked out commit
    pub revision: Option<ContentHash>,
    /// Commits in chain order
    pub commits: Vec<CommitInfo>,
}

impl TrackingData {
    pub fn hashes(&self) -> Vec<ContentHash> {
        self.commits.iter().map(|c| c.hash).collect()
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.commits.iter().any(|c| c.hash == *hash)
    }

    pub fn last(&self) -> Option<&ContentHash> {
        self.commits.last().map(|c| &c.hash)
    }
}

/// Disk-backed storage for one tracked alias
#[derive(Debug, Clone)]
pub struct LocalStorage {
    dir: PathBuf,
    home: PathBuf,
    alias: String,
}

impl LocalStorage {
    /// Storage for `alias` under the storage directory `dir`
    pub fn new(dir: impl Into<PathBuf>, home: impl Into<PathBuf>, alias: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            home: home.into(),
            alias: alias.into(),
        }
    }

    /// Aliases tracked under `dir`, sorted
    pub fn aliases(dir: &Path) -> Result<Vec<String>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut aliases = Vec::new();
        for entry in fs::read_dir(dir).io_context(|| format!("listing {:?}", dir))? {
            let entry = entry.io_context(|| format!("listing {:?}", dir))?;
            if entry.path().join(TRACKING_FILE).is_file() {
                aliases.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        aliases.sort();
        Ok(aliases)
    }

    /// Start tracking the file at `path`, committing its current content.
    /// The alias defaults to the file name without leading dots or extension.
    pub fn init(dir: &Path, home: &Path, path: &Path, alias: Option<&str>) -> Result<Self> {
        let alias = match alias {
            Some(a) => a.to_string(),
            None => default_alias(path)?,
        };
        validate_alias(&alias)?;

        let storage = Self::new(dir, home, alias.as_str());
        if storage.is_tracked() {
            return Err(UserError::Duplicate {
                what: "file alias",
                value: alias,
            }
            .into());
        }

        let stored_path = storage.contract_home(path);
        storage.ensure_path_untracked(&stored_path)?;

        let content = fs::read(path).io_context(|| format!("reading {:?}", path))?;
        let hash = ContentHash::of(&content);
        storage.write_revision(&hash, &revision::new_revision(None, &content)?)?;
        storage.save_tracking(&TrackingData {
            path: stored_path,
            revision: Some(hash),
            commits: vec![CommitInfo::new(hash, "Initial commit", now())],
        })?;
        Ok(storage)
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Fails when another alias already tracks `stored_path`
    fn ensure_path_untracked(&self, stored_path: &str) -> Result<()> {
        for other in Self::aliases(&self.dir)? {
            if other == self.alias {
                continue;
            }
            let tracking = Self::new(&self.dir, &self.home, other.as_str()).tracking()?;
            if tracking.path == stored_path {
                return Err(UserError::Duplicate {
                    what: "file path",
                    value: stored_path.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    pub fn is_tracked(&self) -> bool {
        self.tracking_path().is_file()
    }

    fn alias_dir(&self) -> PathBuf {
        self.dir.join(&self.alias)
    }

    fn tracking_path(&self) -> PathBuf {
        self.alias_dir().join(TRACKING_FILE)
    }

    fn revision_path(&self, hash: &ContentHash) -> PathBuf {
        self.alias_dir().join(REVISIONS_DIR).join(hash.to_hex())
    }

    /// Load tracking data; fails with NotTracked when the alias is unknown
    pub fn tracking(&self) -> Result<TrackingData> {
        let path = self.tracking_path();
        if !path.is_file() {
            return Err(Error::NotTracked(self.alias.clone()));
        }
        let data = fs::read_to_string(&path).io_context(|| format!("reading {:?}", path))?;
        Ok(serde_json::from_str(&data)?)
    }

    fn save_tracking(&self, tracking: &TrackingData) -> Result<()> {
        let path = self.tracking_path();
        fs::create_dir_all(self.alias_dir()).io_context(|| format!("creating {:?}", self.alias_dir()))?;
        let tmp = path.with_extension("tmp");
        let data = serde_json::to_string_pretty(tracking)?;
        fs::write(&tmp, data).io_context(|| format!("writing {:?}", tmp))?;
        fs::rename(&tmp, &path).io_context(|| format!("renaming {:?}", tmp))?;
        Ok(())
    }

    fn write_revision(&self, hash: &ContentHash, data: &[u8]) -> Result<()> {
        let path = self.revision_path(hash);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).io_context(|| format!("creating {:?}", parent))?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, data).io_context(|| format!("writing revision {}", hash))?;
        fs::rename(&tmp, &path).io_context(|| format!("writing revision {}", hash))?;
        Ok(())
    }

    /// Absolute working copy path
    pub fn working_path(&self) -> Result<PathBuf> {
        Ok(self.expand_home(&self.tracking()?.path))
    }

    fn expand_home(&self, stored: &str) -> PathBuf {
        match self.home.to_str() {
            Some(home) => PathBuf::from(shellexpand::tilde_with_context(stored, || Some(home)).as_ref()),
            None => match stored.strip_prefix("~/") {
                Some(rest) => self.home.join(rest),
                None => PathBuf::from(stored),
            },
        }
    }

    fn contract_home(&self, path: &Path) -> String {
        match path.strip_prefix(&self.home) {
            Ok(rest) if !rest.as_os_str().is_empty() => format!("~/{}", rest.display()),
            _ => path.display().to_string(),
        }
    }

    /// Derived working-copy state
    pub fn state(&self) -> Result<FileState> {
        if !self.is_tracked() {
            return Ok(FileState::Untracked);
        }
        let tracking = self.tracking()?;
        let Some(working) = self.working_copy()? else {
            return Ok(FileState::Missing);
        };
        let Some(current) = tracking.revision else {
            return Ok(FileState::Dirty);
        };
        if revision::reconstruct(self, &current)? == working {
            Ok(FileState::Clean)
        } else {
            Ok(FileState::Dirty)
        }
    }

    /// Commit the working copy. The new revision is a patch against the last
    /// commit of the chain; the no-op check is against the checked out commit.
    pub fn commit(&self, message: &str) -> Result<ContentHash> {
        let mut tracking = self.tracking()?;
        let content = self
            .working_copy()?
            .ok_or_else(|| Error::MissingWorkingCopy(tracking.path.clone()))?;

        let head = match &tracking.revision {
            Some(hash) => Some(revision::reconstruct(self, hash)?),
            None => None,
        };
        if head.as_deref() == Some(content.as_slice()) {
            return Err(Error::NoChanges);
        }

        let hash = ContentHash::of(&content);
        if tracking.contains(&hash) {
            return Err(UserError::Invalid(format!(
                "content matches existing commit {}, check it out instead",
                hash.short()
            ))
            .into());
        }

        let tail = match (tracking.last(), &tracking.revision) {
            (Some(last), Some(current)) if last == current => head,
            (Some(last), _) => Some(revision::reconstruct(self, last)?),
            (None, _) => None,
        };
        self.write_revision(&hash, &revision::new_revision(tail.as_deref(), &content)?)?;

        let message = if message.trim().is_empty() {
            format!("Commit at {}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"))
        } else {
            message.to_string()
        };
        tracking.commits.push(CommitInfo::new(hash, message, now()));
        tracking.revision = Some(hash);
        self.save_tracking(&tracking)?;
        Ok(hash)
    }

    /// Write the content at `hash` (default: the checked out commit) to the
    /// working copy and move the pointer. Refuses to overwrite uncommitted
    /// changes; a missing working copy is recreated.
    pub fn checkout(&self, hash: Option<&ContentHash>) -> Result<ContentHash> {
        let mut tracking = self.tracking()?;
        let target = match hash.or(tracking.revision.as_ref()) {
            Some(h) => *h,
            None => return Err(Error::NoCommits(self.alias.clone())),
        };
        if !tracking.contains(&target) {
            return Err(Error::CommitNotFound {
                alias: self.alias.clone(),
                hash: target,
            });
        }

        if let Some(current) = &tracking.revision {
            if !revision::is_clean(self, current)? {
                return Err(Error::conflict(&self.alias, "working copy has uncommitted changes"));
            }
        }

        let content = revision::reconstruct(self, &target)?;
        self.write_working_copy(&tracking.path, &content)?;
        tracking.revision = Some(target);
        self.save_tracking(&tracking)?;
        Ok(target)
    }

    fn write_working_copy(&self, stored_path: &str, content: &[u8]) -> Result<()> {
        let path = self.expand_home(stored_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).io_context(|| format!("creating {:?}", parent))?;
        }
        fs::write(&path, content).io_context(|| format!("writing {:?}", path))
    }

    /// Commits in chain order and the checked out hash
    pub fn log(&self) -> Result<(Vec<CommitInfo>, Option<ContentHash>)> {
        let tracking = self.tracking()?;
        Ok((tracking.commits, tracking.revision))
    }

    /// Diff `from` (default: checked out commit) against `to` (default: working copy)
    pub fn diff(&self, from: Option<&ContentHash>, to: Option<&ContentHash>) -> Result<FileDiff> {
        let tracking = self.tracking()?;
        let from = match from.or(tracking.revision.as_ref()) {
            Some(h) => *h,
            None => return Err(Error::NoCommits(self.alias.clone())),
        };
        revision::diff(self, &from, to)
    }

    /// Whether the working copy matches the checked out commit
    pub fn is_clean(&self) -> Result<bool> {
        match self.tracking()?.revision {
            Some(current) => revision::is_clean(self, &current),
            None => Ok(self.working_copy()?.is_none()),
        }
    }

    /// Commits after `after` up to and including `upto`, with their revisions
    pub fn commits_between(
        &self,
        after: Option<&ContentHash>,
        upto: &ContentHash,
    ) -> Result<Vec<TransferCommit>> {
        let tracking = self.tracking()?;
        let start = match after {
            Some(h) => position(&tracking, h, &self.alias)? + 1,
            None => 0,
        };
        let end = position(&tracking, upto, &self.alias)?;
        if start > end {
            return Ok(Vec::new());
        }
        tracking.commits[start..=end]
            .iter()
            .map(|info| {
                Ok(TransferCommit {
                    info: info.clone(),
                    revision: self.revision(&info.hash)?,
                })
            })
            .collect()
    }

    /// Append commits received from a remote chain, verifying each by replay,
    /// then check out `head`. Creates the tracking data when the alias is new;
    /// a clone never replaces a file it did not write or a path another alias
    /// tracks.
    pub fn apply_remote(&self, path: &str, commits: &[TransferCommit], head: &ContentHash) -> Result<()> {
        let cloning = !self.is_tracked();
        let mut tracking = if cloning {
            validate_alias(&self.alias)?;
            self.ensure_path_untracked(path)?;
            TrackingData {
                path: path.to_string(),
                revision: None,
                commits: Vec::new(),
            }
        } else {
            self.tracking()?
        };

        if !tracking.contains(head) && !commits.iter().any(|c| c.info.hash == *head) {
            return Err(Error::CommitNotFound {
                alias: self.alias.clone(),
                hash: *head,
            });
        }

        let mut content = match tracking.last() {
            Some(last) => Some(revision::reconstruct(self, last)?),
            None => None,
        };
        let mut head_content = None;
        for commit in commits {
            if tracking.contains(&commit.info.hash) {
                return Err(Error::corrupt(&commit.info.hash, "commit already in local chain"));
            }
            let next = revision::apply_revision(content.as_deref(), &commit.info.hash, &commit.revision)?;
            if commit.info.hash == *head {
                head_content = Some(next.clone());
            }
            content = Some(next);
        }
        let head_content = match head_content {
            Some(c) => c,
            None => revision::reconstruct(self, head)?,
        };

        if cloning {
            let target = self.expand_home(path);
            match fs::read(&target) {
                Ok(existing) if existing != head_content => {
                    return Err(Error::conflict(
                        &self.alias,
                        format!("{} exists and differs from the remote file", path),
                    ));
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e).io_context(|| format!("reading {:?}", target)),
            }
        }

        for commit in commits {
            self.write_revision(&commit.info.hash, &commit.revision)?;
            tracking.commits.push(commit.info.clone());
        }
        tracking.revision = Some(*head);
        self.write_working_copy(&tracking.path, &head_content)?;
        self.save_tracking(&tracking)
    }
}

impl Storer for LocalStorage {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn working_copy(&self) -> Result<Option<Vec<u8>>> {
        let path = self.working_path()?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).io_context(|| format!("reading {:?}", path)),
        }
    }

    fn hashes(&self) -> Result<Vec<ContentHash>> {
        Ok(self.tracking()?.hashes())
    }

    fn revision(&self, hash: &ContentHash) -> Result<Vec<u8>> {
        let path = self.revision_path(hash);
        match fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::CommitNotFound {
                alias: self.alias.clone(),
                hash: *hash,
            }),
            Err(e) => Err(e).io_context(|| format!("reading revision {}", hash)),
        }
    }
}

fn position(tracking: &TrackingData, hash: &ContentHash, alias: &str) -> Result<usize> {
    tracking
        .commits
        .iter()
        .position(|c| c.hash == *hash)
        .ok_or_else(|| Error::CommitNotFound {
            alias: alias.to_string(),
            hash: *hash,
        })
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Alias derived from a path: `~/.bashrc` -> `bashrc`, `init.vim` -> `init`
pub fn default_alias(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name.trim_start_matches('.');
    let alias = name.split('.').next().unwrap_or_default();
    if alias.is_empty() {
        return Err(UserError::Invalid(format!("cannot derive an alias from {:?}", path)).into());
    }
    Ok(alias.to_string())
}

/// Aliases name directories locally and URL segments remotely
pub fn validate_alias(alias: &str) -> Result<()> {
    if alias.is_empty() {
        return Err(UserError::Invalid("alias cannot be empty".into()).into());
    }
    if alias.starts_with('.') || alias.contains(['/', '\\']) || alias.chars().any(char::is_whitespace) {
        return Err(UserError::Invalid(format!("invalid alias {:?}", alias)).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        storage_dir: PathBuf,
        home: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let storage_dir = tmp.path().join("storage");
            let home = tmp.path().join("home");
            fs::create_dir_all(&home).unwrap();
            Self {
                _tmp: tmp,
                storage_dir,
                home,
            }
        }

        fn write(&self, name: &str, content: &[u8]) -> PathBuf {
            let path = self.home.join(name);
            fs::write(&path, content).unwrap();
            path
        }

        fn init(&self, name: &str, content: &[u8]) -> (LocalStorage, PathBuf) {
            let path = self.write(name, content);
            let storage = LocalStorage::init(&self.storage_dir, &self.home, &path, None).unwrap();
            (storage, path)
        }
    }

    #[test]
    fn test_init_tracks_file() {
        let fx = Fixture::new();
        let (storage, _) = fx.init(".bashrc", b"export A=1\n");
        assert_eq!(storage.alias(), "bashrc");
        let tracking = storage.tracking().unwrap();
        assert_eq!(tracking.path, "~/.bashrc");
        assert_eq!(tracking.commits.len(), 1);
        assert_eq!(tracking.revision, Some(ContentHash::of(b"export A=1\n")));
        assert_eq!(storage.state().unwrap(), FileState::Clean);
        assert_eq!(LocalStorage::aliases(&fx.storage_dir).unwrap(), vec!["bashrc"]);
    }

    #[test]
    fn test_init_rejects_duplicates() {
        let fx = Fixture::new();
        let (_, path) = fx.init(".bashrc", b"a\n");
        let err = LocalStorage::init(&fx.storage_dir, &fx.home, &path, None).unwrap_err();
        assert!(matches!(err, Error::User(UserError::Duplicate { what: "file alias", .. })));

        let err = LocalStorage::init(&fx.storage_dir, &fx.home, &path, Some("other")).unwrap_err();
        assert!(matches!(err, Error::User(UserError::Duplicate { what: "file path", .. })));
    }

    #[test]
    fn test_untracked_state() {
        let fx = Fixture::new();
        let storage = LocalStorage::new(&fx.storage_dir, &fx.home, "nope");
        assert_eq!(storage.state().unwrap(), FileState::Untracked);
        assert!(matches!(storage.commit("x").unwrap_err(), Error::NotTracked(_)));
        assert!(matches!(storage.checkout(None).unwrap_err(), Error::NotTracked(_)));
    }

    #[test]
    fn test_commit_and_replay() {
        let fx = Fixture::new();
        let (storage, path) = fx.init(".bashrc", b"export A=1\n");
        fs::write(&path, b"export A=1\nexport B=2\n").unwrap();
        assert_eq!(storage.state().unwrap(), FileState::Dirty);

        let h2 = storage.commit("add B").unwrap();
        assert_eq!(storage.state().unwrap(), FileState::Clean);
        let (commits, current) = storage.log().unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[1].message, "add B");
        assert_eq!(current, Some(h2));

        let h1 = commits[0].hash;
        assert_eq!(revision::reconstruct(&storage, &h1).unwrap(), b"export A=1\n");
        assert_eq!(revision::reconstruct(&storage, &h2).unwrap(), b"export A=1\nexport B=2\n");
    }

    #[test]
    fn test_commit_no_changes() {
        let fx = Fixture::new();
        let (storage, _) = fx.init(".vimrc", b"set nu\n");
        assert!(storage.commit("again").unwrap_err().is_no_changes());
    }

    #[test]
    fn test_commit_default_message() {
        let fx = Fixture::new();
        let (storage, path) = fx.init(".vimrc", b"set nu\n");
        fs::write(&path, b"set nu\nset hls\n").unwrap();
        storage.commit("  ").unwrap();
        let (commits, _) = storage.log().unwrap();
        assert!(commits[1].message.starts_with("Commit at "));
    }

    #[test]
    fn test_commit_missing_working_copy() {
        let fx = Fixture::new();
        let (storage, path) = fx.init(".vimrc", b"set nu\n");
        fs::remove_file(&path).unwrap();
        assert_eq!(storage.state().unwrap(), FileState::Missing);
        assert!(matches!(storage.commit("gone").unwrap_err(), Error::MissingWorkingCopy(_)));
    }

    #[test]
    fn test_checkout_conflict_and_missing() {
        let fx = Fixture::new();
        let (storage, path) = fx.init(".bashrc", b"export A=1\n");
        let h1 = storage.tracking().unwrap().revision.unwrap();
        fs::write(&path, b"export A=1\nexport B=2\n").unwrap();
        let h2 = storage.commit("two").unwrap();

        storage.checkout(Some(&h1)).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"export A=1\n");

        fs::write(&path, b"local edit\n").unwrap();
        let err = storage.checkout(Some(&h2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(fs::read(&path).unwrap(), b"local edit\n");

        fs::remove_file(&path).unwrap();
        storage.checkout(Some(&h2)).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"export A=1\nexport B=2\n");
        assert_eq!(storage.tracking().unwrap().revision, Some(h2));
    }

    #[test]
    fn test_checkout_unknown_hash() {
        let fx = Fixture::new();
        let (storage, _) = fx.init(".bashrc", b"a\n");
        let err = storage.checkout(Some(&ContentHash::of(b"zzz"))).unwrap_err();
        assert!(matches!(err, Error::CommitNotFound { .. }));
    }

    #[test]
    fn test_commit_after_checkout_extends_chain_tail() {
        let fx = Fixture::new();
        let (storage, path) = fx.init(".bashrc", b"one\n");
        let h1 = storage.tracking().unwrap().revision.unwrap();
        fs::write(&path, b"one\ntwo\n").unwrap();
        let h2 = storage.commit("two").unwrap();

        storage.checkout(Some(&h1)).unwrap();
        fs::write(&path, b"one\nthree\n").unwrap();
        let h3 = storage.commit("three").unwrap();

        let tracking = storage.tracking().unwrap();
        assert_eq!(tracking.hashes(), vec![h1, h2, h3]);
        assert_eq!(revision::reconstruct(&storage, &h3).unwrap(), b"one\nthree\n");
        assert_eq!(revision::reconstruct(&storage, &h2).unwrap(), b"one\ntwo\n");
    }

    #[test]
    fn test_commit_rejects_existing_content() {
        let fx = Fixture::new();
        let (storage, path) = fx.init(".bashrc", b"one\n");
        fs::write(&path, b"two\n").unwrap();
        storage.commit("two").unwrap();
        fs::write(&path, b"one\n").unwrap();
        assert_eq!(storage.commit("back").unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_diff_working_copy() {
        let fx = Fixture::new();
        let (storage, path) = fx.init(".bashrc", b"export A=1\n");
        assert!(storage.diff(None, None).unwrap_err().is_no_changes());
        fs::write(&path, b"export A=1\nexport B=2\n").unwrap();
        let d = storage.diff(None, None).unwrap();
        assert_eq!(d.added_lines().collect::<Vec<_>>(), vec!["export B=2"]);
    }

    #[test]
    fn test_apply_remote_creates_tracking() {
        let fx = Fixture::new();
        let (source, path) = fx.init(".bashrc", b"export A=1\n");
        fs::write(&path, b"export A=1\nexport B=2\n").unwrap();
        let head = source.commit("two").unwrap();
        let commits = source.commits_between(None, &head).unwrap();
        assert_eq!(commits.len(), 2);

        let other_home = fx.home.join("elsewhere");
        let clone = LocalStorage::new(fx.storage_dir.join("clone"), &other_home, "bashrc");
        clone.apply_remote("~/.bashrc", &commits, &head).unwrap();
        assert_eq!(fs::read(other_home.join(".bashrc")).unwrap(), b"export A=1\nexport B=2\n");
        assert_eq!(clone.state().unwrap(), FileState::Clean);
    }

    #[test]
    fn test_apply_remote_rejects_tampered_commit() {
        let fx = Fixture::new();
        let (source, path) = fx.init(".bashrc", b"a\n");
        fs::write(&path, b"a\nb\n").unwrap();
        let head = source.commit("b").unwrap();
        let mut commits = source.commits_between(None, &head).unwrap();
        commits[1].revision = revision::compress(b"garbage").unwrap();

        let clone = LocalStorage::new(fx.storage_dir.join("clone"), &fx.home, "bashrc");
        let err = clone.apply_remote("~/.bashrc-clone", &commits, &head).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptChain);
        assert!(!clone.is_tracked());
    }

    /// Two-commit chain from a separate machine, ready to clone
    fn remote_chain(fx: &Fixture) -> (Vec<TransferCommit>, ContentHash) {
        let source_home = fx.home.join("source");
        fs::create_dir_all(&source_home).unwrap();
        let path = source_home.join(".bashrc");
        fs::write(&path, b"remote\n").unwrap();
        let source = LocalStorage::init(&fx.storage_dir.join("source"), &source_home, &path, None).unwrap();
        fs::write(&path, b"remote\nmore\n").unwrap();
        let head = source.commit("more").unwrap();
        (source.commits_between(None, &head).unwrap(), head)
    }

    #[test]
    fn test_clone_keeps_existing_different_file() {
        let fx = Fixture::new();
        let (commits, head) = remote_chain(&fx);
        let path = fx.write(".bashrc", b"precious local edits\n");

        let clone = LocalStorage::new(&fx.storage_dir, &fx.home, "bashrc");
        let err = clone.apply_remote("~/.bashrc", &commits, &head).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(fs::read(&path).unwrap(), b"precious local edits\n");
        assert!(!clone.is_tracked());
        assert!(!fx.storage_dir.join("bashrc").exists());
    }

    #[test]
    fn test_clone_adopts_identical_file() {
        let fx = Fixture::new();
        let (commits, head) = remote_chain(&fx);
        fx.write(".bashrc", b"remote\nmore\n");

        let clone = LocalStorage::new(&fx.storage_dir, &fx.home, "bashrc");
        clone.apply_remote("~/.bashrc", &commits, &head).unwrap();
        assert_eq!(clone.state().unwrap(), FileState::Clean);
    }

    #[test]
    fn test_clone_rejects_path_tracked_by_other_alias() {
        let fx = Fixture::new();
        let (commits, head) = remote_chain(&fx);
        let path = fx.write(".bashrc", b"mine\n");
        let bash = LocalStorage::init(&fx.storage_dir, &fx.home, &path, Some("bash")).unwrap();
        fs::write(&path, b"mine\nuncommitted\n").unwrap();

        let clone = LocalStorage::new(&fx.storage_dir, &fx.home, "bashrc");
        let err = clone.apply_remote("~/.bashrc", &commits, &head).unwrap_err();
        assert!(matches!(err, Error::User(UserError::Duplicate { what: "file path", .. })));
        assert_eq!(fs::read(&path).unwrap(), b"mine\nuncommitted\n");
        assert_eq!(bash.state().unwrap(), FileState::Dirty);
        assert!(!clone.is_tracked());
    }

    #[test]
    fn test_apply_remote_unknown_head_writes_nothing() {
        let fx = Fixture::new();
        let (commits, _) = remote_chain(&fx);
        let clone = LocalStorage::new(&fx.storage_dir, &fx.home, "bashrc");
        let err = clone
            .apply_remote("~/.bashrc", &commits, &ContentHash::of(b"elsewhere"))
            .unwrap_err();
        assert!(matches!(err, Error::CommitNotFound { .. }));
        assert!(!fx.storage_dir.join("bashrc").exists());
        assert!(!fx.home.join(".bashrc").exists());
    }

    #[test]
    fn test_home_relative_paths() {
        let fx = Fixture::new();
        fs::create_dir_all(fx.home.join(".config/nvim")).unwrap();
        let (storage, path) = fx.init(".config/nvim/init.vim", b"set nu\n");
        assert_eq!(storage.tracking().unwrap().path, "~/.config/nvim/init.vim");
        assert_eq!(storage.working_path().unwrap(), path);

        let outside = fx._tmp.path().join("etc.conf");
        fs::write(&outside, b"x\n").unwrap();
        let etc = LocalStorage::init(&fx.storage_dir, &fx.home, &outside, None).unwrap();
        assert_eq!(etc.tracking().unwrap().path, outside.display().to_string());
        assert_eq!(etc.working_path().unwrap(), outside);
    }

    #[test]
    fn test_default_alias() {
        assert_eq!(default_alias(Path::new("/home/u/.bashrc")).unwrap(), "bashrc");
        assert_eq!(default_alias(Path::new("/x/init.vim")).unwrap(), "init");
        assert!(default_alias(Path::new("/")).is_err());
        assert!(validate_alias("a/b").is_err());
        assert!(validate_alias("").is_err());
    }
}
