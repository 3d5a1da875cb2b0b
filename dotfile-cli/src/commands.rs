//! Command implementations behind the `dotfile` binary

use crate::config::ClientConfig;
use crate::remote::HttpRemote;
use anyhow::{anyhow, bail, Context, Result};
use dotfile_core::sync::{self, SyncReport};
use dotfile_core::{ContentHash, FileDiff, LocalStorage, TrackingData};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Shortest hash prefix accepted on the command line
const MIN_PREFIX_LEN: usize = 4;

/// Where the client keeps its state
#[derive(Debug, Clone)]
pub struct Env {
    pub storage_dir: PathBuf,
    pub home: PathBuf,
    pub config_path: PathBuf,
}

impl Env {
    pub fn storage(&self, alias: &str) -> LocalStorage {
        LocalStorage::new(&self.storage_dir, &self.home, alias)
    }

    pub fn config(&self) -> Result<ClientConfig> {
        ClientConfig::load(&self.config_path)
    }

    /// Remote for `namespace` (default: the configured username)
    pub fn remote(&self, namespace: Option<&str>) -> Result<HttpRemote> {
        let config = self.config()?;
        let namespace = match namespace {
            Some(user) => user.to_string(),
            None => config.require_username()?.to_string(),
        };
        Ok(HttpRemote::new(&config.remote, &namespace, config.credentials())?)
    }
}

/// Start tracking `path`; returns the alias
pub fn init(env: &Env, path: &Path, alias: Option<&str>) -> Result<String> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("resolving the current directory")?
            .join(path)
    };
    let storage = LocalStorage::init(&env.storage_dir, &env.home, &path, alias)?;
    Ok(storage.alias().to_string())
}

/// Open the tracked file in `$EDITOR`
pub fn edit(env: &Env, alias: &str) -> Result<()> {
    let path = env.storage(alias).working_path()?;
    let editor = std::env::var("EDITOR")
        .ok()
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| "vi".to_string());
    let status = Command::new(&editor)
        .arg(&path)
        .status()
        .with_context(|| format!("running {}", editor))?;
    if !status.success() {
        bail!("{} exited with {}", editor, status);
    }
    Ok(())
}

/// Diff two commits, or a commit against the working copy
pub fn diff(env: &Env, alias: &str, from: Option<&str>, to: Option<&str>) -> Result<FileDiff> {
    let storage = env.storage(alias);
    let tracking = storage.tracking()?;
    let from = from.map(|h| resolve_hash(&tracking, h)).transpose()?;
    let to = to.map(|h| resolve_hash(&tracking, h)).transpose()?;
    Ok(storage.diff(from.as_ref(), to.as_ref())?)
}

/// Commit log, newest first, with the checked out commit marked
pub fn log(env: &Env, alias: &str) -> Result<String> {
    let storage = env.storage(alias);
    let (commits, current) = storage.log()?;
    let mut out = String::new();
    for commit in commits.iter().rev() {
        let marker = if Some(commit.hash) == current { "*" } else { " " };
        let when = chrono::DateTime::from_timestamp(commit.timestamp, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        writeln!(out, "{} {}  {}  {}", marker, commit.hash.short(), when, commit.message)?;
    }
    write!(out, "state: {}", storage.state()?)?;
    Ok(out)
}

/// Check out `hash` (default: the current commit, restoring the working copy)
pub fn checkout(env: &Env, alias: &str, hash: Option<&str>) -> Result<ContentHash> {
    let storage = env.storage(alias);
    let tracking = storage.tracking()?;
    let hash = hash.map(|h| resolve_hash(&tracking, h)).transpose()?;
    Ok(storage.checkout(hash.as_ref())?)
}

pub fn commit(env: &Env, alias: &str, message: &str) -> Result<ContentHash> {
    Ok(env.storage(alias).commit(message)?)
}

/// Push one alias, or every tracked alias
pub async fn push(env: &Env, alias: Option<&str>) -> Result<Vec<SyncReport>> {
    let remote = env.remote(None)?;
    if remote_credentials_missing(env)? {
        bail!("username and token must be set to push, see `dotfile config`");
    }
    match alias {
        Some(alias) => Ok(vec![sync::push(&env.storage(alias), &remote).await?]),
        None => Ok(sync::push_all(&env.storage_dir, &env.home, &remote).await?),
    }
}

/// Pull one alias, or every alias of the remote namespace
pub async fn pull(env: &Env, alias: Option<&str>, all: bool, username: Option<&str>) -> Result<Vec<SyncReport>> {
    let remote = env.remote(username)?;
    match (alias, all) {
        (_, true) => Ok(sync::pull_all(&env.storage_dir, &env.home, &remote).await?),
        (Some(alias), false) => Ok(vec![sync::pull(&env.storage(alias), &remote).await?]),
        (None, false) => bail!("neither alias nor --all provided to pull"),
    }
}

/// Print the config, or set `key` to `value` (empty when omitted)
pub fn config(env: &Env, key: Option<&str>, value: Option<&str>) -> Result<Option<String>> {
    let mut config = env.config()?;
    match key {
        None => Ok(Some(config.to_string())),
        Some(key) => {
            config.set(key, value.unwrap_or_default())?;
            config.save(&env.config_path)?;
            Ok(None)
        }
    }
}

fn remote_credentials_missing(env: &Env) -> Result<bool> {
    Ok(env.config()?.credentials().is_none())
}

/// Full hash or a unique prefix of a hash in the chain
pub fn resolve_hash(tracking: &TrackingData, input: &str) -> Result<ContentHash> {
    if let Ok(hash) = input.parse::<ContentHash>() {
        return Ok(hash);
    }
    if input.len() < MIN_PREFIX_LEN {
        bail!("hash prefix {:?} is too short", input);
    }
    let prefix = input.to_ascii_lowercase();
    let mut matches = tracking
        .commits
        .iter()
        .filter(|c| c.hash.to_hex().starts_with(&prefix));
    match (matches.next(), matches.next()) {
        (Some(c), None) => Ok(c.hash),
        (None, _) => Err(anyhow!("no commit matches {:?}", input)),
        (Some(_), Some(_)) => Err(anyhow!("hash prefix {:?} is ambiguous", input)),
    }
}

/// One line per sync result
pub fn describe(report: &SyncReport) -> String {
    match (report.transferred, report.head) {
        (0, _) => format!("{}: up to date", report.alias),
        (n, Some(head)) => format!("{}: {} commit(s), now at {}", report.alias, n, head.short()),
        (n, None) => format!("{}: {} commit(s)", report.alias, n),
    }
}
