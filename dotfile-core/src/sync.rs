//! Sync coordinator
//!
//! Moves commits between a [`LocalStorage`] chain and a remote chain for the
//! same alias. Both directions are fast-forward only: the receiving chain must
//! be a prefix of the sending chain, otherwise the operation fails with
//! [`Error::Conflict`] and nothing is written.

use crate::error::{Error, Result};
use crate::local::LocalStorage;
use crate::object::ContentHash;
use crate::protocol::{PushRequest, RemoteFile, TransferCommit};
use crate::sqlite_store::SqliteStore;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The remote side of a sync, scoped to one user's namespace
#[async_trait]
pub trait Remote: Send + Sync {
    /// Aliases in the namespace
    async fn aliases(&self) -> Result<Vec<String>>;

    /// File metadata, `None` when the alias does not exist remotely
    async fn file(&self, alias: &str) -> Result<Option<RemoteFile>>;

    /// Commits after `after` (all when `None`), in chain order
    async fn commits_after(&self, alias: &str, after: Option<&ContentHash>) -> Result<Vec<TransferCommit>>;

    /// Append commits in one remote transaction; returns the new head
    async fn append(&self, alias: &str, request: &PushRequest) -> Result<ContentHash>;

    /// Full content at `hash`
    async fn content(&self, alias: &str, hash: &ContentHash) -> Result<Vec<u8>>;

    /// Copy `owner`'s `alias` at `hash` into this namespace
    async fn fork(&self, owner: &str, alias: &str, hash: &ContentHash) -> Result<ContentHash>;
}

/// [`Remote`] backed by an in-process [`SqliteStore`]
#[derive(Clone)]
pub struct StoreRemote {
    store: Arc<SqliteStore>,
    username: String,
}

impl StoreRemote {
    pub fn new(store: Arc<SqliteStore>, username: impl Into<String>) -> Self {
        Self {
            store,
            username: username.into(),
        }
    }
}

#[async_trait]
impl Remote for StoreRemote {
    async fn aliases(&self) -> Result<Vec<String>> {
        self.store.aliases(&self.username)
    }

    async fn file(&self, alias: &str) -> Result<Option<RemoteFile>> {
        match self.store.remote_file(&self.username, alias) {
            Ok(file) => Ok(Some(file)),
            Err(Error::NotTracked(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn commits_after(&self, alias: &str, after: Option<&ContentHash>) -> Result<Vec<TransferCommit>> {
        self.store.commits_after(&self.username, alias, after)
    }

    async fn append(&self, alias: &str, request: &PushRequest) -> Result<ContentHash> {
        self.store.append_commits(&self.username, alias, request)
    }

    async fn content(&self, alias: &str, hash: &ContentHash) -> Result<Vec<u8>> {
        self.store.content(&self.username, alias, hash)
    }

    async fn fork(&self, owner: &str, alias: &str, hash: &ContentHash) -> Result<ContentHash> {
        self.store.fork_file(owner, alias, hash, &self.username)
    }
}

/// Outcome of one alias-level sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub alias: String,
    /// Number of commits moved
    pub transferred: usize,
    /// Pointer of the receiving side afterwards
    pub head: Option<ContentHash>,
}

fn is_prefix(prefix: &[ContentHash], chain: &[ContentHash]) -> bool {
    prefix.len() <= chain.len() && prefix == &chain[..prefix.len()]
}

fn ensure_clean(local: &LocalStorage) -> Result<()> {
    if !local.is_clean()? {
        return Err(Error::conflict(
            local.alias(),
            "working copy has uncommitted changes",
        ));
    }
    Ok(())
}

/// Push local commits up to the checked out commit
pub async fn push(local: &LocalStorage, remote: &dyn Remote) -> Result<SyncReport> {
    let alias = local.alias().to_string();
    let tracking = local.tracking()?;
    ensure_clean(local)?;
    let head = tracking.revision.ok_or_else(|| Error::NoCommits(alias.clone()))?;

    let local_hashes = tracking.hashes();
    let head_pos = local_hashes
        .iter()
        .position(|h| *h == head)
        .ok_or_else(|| Error::corrupt(&head, "checked out commit missing from local chain"))?;

    let remote_file = remote.file(&alias).await?;
    let remote_hashes = remote_file.as_ref().map(RemoteFile::hashes).unwrap_or_default();
    debug!(
        alias = %alias,
        local = local_hashes.len(),
        remote = remote_hashes.len(),
        head = %head.short(),
        "comparing chains for push"
    );

    if !is_prefix(&remote_hashes, &local_hashes[..=head_pos]) {
        return Err(Error::conflict(
            &alias,
            "remote has commits that are not in the local history, pull first",
        ));
    }

    let base = remote_hashes.last().copied();
    let commits = local.commits_between(base.as_ref(), &head)?;
    let remote_current = remote_file.and_then(|f| f.current);
    if commits.is_empty() && remote_current == Some(head) {
        debug!(alias = %alias, "remote already up to date");
        return Ok(SyncReport {
            alias,
            transferred: 0,
            head: remote_current,
        });
    }

    let request = PushRequest {
        path: tracking.path,
        base,
        commits,
        head: Some(head),
    };
    let new_head = remote.append(&alias, &request).await?;
    info!(alias = %alias, commits = request.commits.len(), head = %new_head.short(), "pushed");
    Ok(SyncReport {
        alias,
        transferred: request.commits.len(),
        head: Some(new_head),
    })
}

/// Pull remote commits and check out the remote head. An untracked alias is
/// cloned from the remote chain.
pub async fn pull(local: &LocalStorage, remote: &dyn Remote) -> Result<SyncReport> {
    let alias = local.alias().to_string();
    let tracking = if local.is_tracked() {
        ensure_clean(local)?;
        Some(local.tracking()?)
    } else {
        None
    };

    let remote_file = remote
        .file(&alias)
        .await?
        .ok_or_else(|| Error::NotTracked(alias.clone()))?;
    let remote_head = remote_file.current.ok_or_else(|| Error::NoCommits(alias.clone()))?;
    let remote_hashes = remote_file.hashes();

    let after = match &tracking {
        None => None,
        Some(tracking) => {
            let local_hashes = tracking.hashes();
            debug!(
                alias = %alias,
                local = local_hashes.len(),
                remote = remote_hashes.len(),
                head = %remote_head.short(),
                "comparing chains for pull"
            );
            if is_prefix(&remote_hashes, &local_hashes) && remote_hashes.len() < local_hashes.len() {
                debug!(alias = %alias, "local chain is ahead of remote");
                return Ok(SyncReport {
                    alias,
                    transferred: 0,
                    head: tracking.revision,
                });
            }
            if !is_prefix(&local_hashes, &remote_hashes) {
                return Err(Error::conflict(
                    &alias,
                    "local has commits that are not in the remote history",
                ));
            }
            if local_hashes.len() == remote_hashes.len() && tracking.revision == Some(remote_head) {
                debug!(alias = %alias, "already up to date");
                return Ok(SyncReport {
                    alias,
                    transferred: 0,
                    head: Some(remote_head),
                });
            }
            tracking.last().copied()
        }
    };

    let commits = remote.commits_after(&alias, after.as_ref()).await?;
    local.apply_remote(&remote_file.path, &commits, &remote_head)?;
    info!(alias = %alias, commits = commits.len(), head = %remote_head.short(), "pulled");
    Ok(SyncReport {
        alias,
        transferred: commits.len(),
        head: Some(remote_head),
    })
}

/// Pull every alias of the remote namespace in order. Stops at the first
/// failure, naming the alias in [`Error::Aborted`].
pub async fn pull_all(dir: &Path, home: &Path, remote: &dyn Remote) -> Result<Vec<SyncReport>> {
    let aliases = remote.aliases().await?;
    let mut reports = Vec::with_capacity(aliases.len());
    for alias in aliases {
        let local = LocalStorage::new(dir, home, alias.as_str());
        match pull(&local, remote).await {
            Ok(report) => reports.push(report),
            Err(e) => {
                warn!(alias = %alias, error = %e, "pull all aborted");
                return Err(Error::Aborted {
                    alias,
                    source: Box::new(e),
                });
            }
        }
    }
    Ok(reports)
}

/// Push every locally tracked alias in order. Stops at the first failure.
pub async fn push_all(dir: &Path, home: &Path, remote: &dyn Remote) -> Result<Vec<SyncReport>> {
    let aliases = LocalStorage::aliases(dir)?;
    let mut reports = Vec::with_capacity(aliases.len());
    for alias in aliases {
        let local = LocalStorage::new(dir, home, alias.as_str());
        match push(&local, remote).await {
            Ok(report) => reports.push(report),
            Err(e) => {
                warn!(alias = %alias, error = %e, "push all aborted");
                return Err(Error::Aborted {
                    alias,
                    source: Box::new(e),
                });
            }
        }
    }
    Ok(reports)
}

/// Fork `owner`'s `alias` at `hash` into the remote's namespace
pub async fn fork(remote: &dyn Remote, owner: &str, alias: &str, hash: &ContentHash) -> Result<SyncReport> {
    let head = remote.fork(owner, alias, hash).await?;
    info!(owner = %owner, alias = %alias, head = %head.short(), "forked");
    Ok(SyncReport {
        alias: alias.to_string(),
        transferred: 1,
        head: Some(head),
    })
}
