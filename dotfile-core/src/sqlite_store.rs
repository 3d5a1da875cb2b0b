//! SQLite-backed commit chain store for the server
//!
//! Tables:
//! - `users`: accounts and bcrypt hashed API tokens
//! - `files`: one row per tracked file, unique `(user_id, alias)` and `(user_id, path)`
//! - `commits`: chain entries, ordered by `id` within a file
//!
//! Every multi-statement mutation runs in one transaction. A
//! [`rusqlite::Transaction`] rolls back when dropped, so any `?` before
//! `commit()` leaves the database untouched.

use crate::auth::{self, AuthResult};
use crate::error::{DbContext, Error, Result, UserError};
use crate::object::{fork_message, CommitInfo, ContentHash};
use crate::protocol::{FileSummary, PushRequest, RemoteFile, TransferCommit};
use crate::revision;
use crate::storage::Storer;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Maximum number of files a single user can own
pub const MAX_FILES_PER_USER: usize = 100;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users(
    id          INTEGER PRIMARY KEY,
    username    TEXT NOT NULL UNIQUE COLLATE NOCASE,
    token_hash  TEXT NOT NULL,
    created_at  INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS files(
    id                 INTEGER PRIMARY KEY,
    user_id            INTEGER NOT NULL REFERENCES users,
    alias              TEXT NOT NULL COLLATE NOCASE,
    path               TEXT NOT NULL COLLATE NOCASE,
    current_commit_id  INTEGER REFERENCES commits,
    created_at         INTEGER NOT NULL,
    updated_at         INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS files_user_index ON files(user_id);
CREATE UNIQUE INDEX IF NOT EXISTS files_user_alias_index ON files(user_id, alias);
CREATE UNIQUE INDEX IF NOT EXISTS files_user_path_index ON files(user_id, path);
CREATE TABLE IF NOT EXISTS commits(
    id           INTEGER PRIMARY KEY,
    file_id      INTEGER NOT NULL REFERENCES files,
    hash         TEXT NOT NULL,
    revision     BLOB NOT NULL,
    message      TEXT NOT NULL,
    forked_from  INTEGER REFERENCES commits ON DELETE SET NULL,
    created_at   INTEGER NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS commits_file_hash_index ON commits(file_id, hash);
";

/// A row of the `files` table with its current hash resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: i64,
    pub user_id: i64,
    pub alias: String,
    pub path: String,
    pub current: Option<ContentHash>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Database-backed [`Storer`] over one file's chain. The server has no
/// working copy.
pub struct FileStorer<'a> {
    conn: &'a Connection,
    file_id: i64,
    alias: String,
}

impl Storer for FileStorer<'_> {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn working_copy(&self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn hashes(&self) -> Result<Vec<ContentHash>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT hash FROM commits WHERE file_id = ?1 ORDER BY id")
            .db_context(|| format!("listing hashes of {:?}", self.alias))?;
        let rows = stmt
            .query_map(params![self.file_id], |row| row.get::<_, String>(0))
            .db_context(|| format!("listing hashes of {:?}", self.alias))?;
        let mut hashes = Vec::new();
        for row in rows {
            let hex = row.db_context(|| format!("listing hashes of {:?}", self.alias))?;
            hashes.push(parse_hash(&hex)?);
        }
        Ok(hashes)
    }

    fn revision(&self, hash: &ContentHash) -> Result<Vec<u8>> {
        self.conn
            .query_row(
                "SELECT revision FROM commits WHERE file_id = ?1 AND hash = ?2",
                params![self.file_id, hash.to_hex()],
                |row| row.get(0),
            )
            .optional()
            .db_context(|| format!("reading revision {} of {:?}", hash, self.alias))?
            .ok_or_else(|| Error::CommitNotFound {
                alias: self.alias.clone(),
                hash: *hash,
            })
    }
}

/// SQLite-backed store of every user's files
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).db_context(|| format!("opening {:?}", path))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .db_context(|| "enabling WAL")?;
        Self::with_connection(conn)
    }

    /// Fresh in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().db_context(|| "opening in-memory database")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .db_context(|| "enabling foreign keys")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .db_context(|| "setting busy timeout")?;
        conn.execute_batch(SCHEMA).db_context(|| "creating schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ==================== Users ====================

    /// Create a user and return its API token. Only the token's hash is stored.
    pub fn create_user(&self, username: &str) -> Result<String> {
        validate_username(username)?;
        let conn = self.conn();
        if user_id(&conn, username).is_ok() {
            return Err(UserError::Duplicate {
                what: "username",
                value: username.to_string(),
            }
            .into());
        }
        let token = auth::generate_token();
        let token_hash =
            auth::hash_token(&token).map_err(|e| Error::Serialization(format!("hashing token: {}", e)))?;
        conn.execute(
            "INSERT INTO users(username, token_hash, created_at) VALUES(?1, ?2, ?3)",
            params![username, token_hash, now()],
        )
        .db_context(|| format!("inserting user {:?}", username))?;
        Ok(token)
    }

    /// Check `token` for `username`
    pub fn authenticate(&self, username: &str, token: &str) -> Result<AuthResult> {
        let row: Option<(i64, String)> = self
            .conn()
            .query_row(
                "SELECT id, token_hash FROM users WHERE username = ?1",
                params![username],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .db_context(|| format!("authenticating {:?}", username))?;
        Ok(match row {
            Some((id, hash)) if auth::verify_token(token, &hash) => AuthResult::Success(id),
            _ => AuthResult::Failed,
        })
    }

    // ==================== Reads ====================

    /// The file row for `username`/`alias`
    pub fn file(&self, username: &str, alias: &str) -> Result<FileRecord> {
        file_record(&self.conn(), username, alias)
    }

    /// A file with its commit metadata in chain order
    pub fn remote_file(&self, username: &str, alias: &str) -> Result<RemoteFile> {
        let conn = self.conn();
        let record = file_record(&conn, username, alias)?;
        Ok(RemoteFile {
            commits: commit_infos(&conn, record.id)?,
            alias: record.alias,
            path: record.path,
            current: record.current,
        })
    }

    /// Aliases owned by `username`, sorted
    pub fn aliases(&self, username: &str) -> Result<Vec<String>> {
        Ok(self.list_files(username)?.into_iter().map(|f| f.alias).collect())
    }

    /// Summaries of every file owned by `username`
    pub fn list_files(&self, username: &str) -> Result<Vec<FileSummary>> {
        let conn = self.conn();
        let uid = user_id(&conn, username)?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT files.alias, files.path, COUNT(commits.id), files.updated_at
                 FROM files LEFT JOIN commits ON commits.file_id = files.id
                 WHERE files.user_id = ?1
                 GROUP BY files.id
                 ORDER BY files.alias",
            )
            .db_context(|| format!("listing files of {:?}", username))?;
        let rows = stmt
            .query_map(params![uid], |row| {
                Ok(FileSummary {
                    alias: row.get(0)?,
                    path: row.get(1)?,
                    num_commits: row.get::<_, i64>(2)? as usize,
                    updated_at: row.get(3)?,
                })
            })
            .db_context(|| format!("listing files of {:?}", username))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .db_context(|| format!("listing files of {:?}", username))
    }

    /// Commits after `after` (all when `None`) in chain order, with revisions
    pub fn commits_after(
        &self,
        username: &str,
        alias: &str,
        after: Option<&ContentHash>,
    ) -> Result<Vec<TransferCommit>> {
        let conn = self.conn();
        let record = file_record(&conn, username, alias)?;
        let infos = commit_infos(&conn, record.id)?;
        let start = match after {
            Some(hash) => {
                infos
                    .iter()
                    .position(|c| c.hash == *hash)
                    .ok_or_else(|| Error::CommitNotFound {
                        alias: alias.to_string(),
                        hash: *hash,
                    })?
                    + 1
            }
            None => 0,
        };
        let storer = FileStorer {
            conn: &conn,
            file_id: record.id,
            alias: record.alias.clone(),
        };
        infos
            .into_iter()
            .skip(start)
            .map(|info| {
                Ok(TransferCommit {
                    revision: storer.revision(&info.hash)?,
                    info,
                })
            })
            .collect()
    }

    /// Full content of `username`/`alias` at `hash`
    pub fn content(&self, username: &str, alias: &str, hash: &ContentHash) -> Result<Vec<u8>> {
        let conn = self.conn();
        let record = file_record(&conn, username, alias)?;
        let storer = FileStorer {
            conn: &conn,
            file_id: record.id,
            alias: record.alias,
        };
        revision::reconstruct(&storer, hash)
    }

    // ==================== Mutations ====================

    /// Create a file together with its first commit
    pub fn create_file(
        &self,
        username: &str,
        alias: &str,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> Result<ContentHash> {
        let mut conn = self.conn();
        let tx = conn.transaction().db_context(|| "starting create file transaction")?;
        let uid = user_id(&tx, username)?;
        check_new_file(&tx, uid, alias, path)?;
        let file_id = insert_file(&tx, uid, alias, path)?;

        let hash = ContentHash::of(content);
        let info = CommitInfo::new(hash, message, now());
        let commit_id = insert_commit(&tx, file_id, &info, &revision::new_revision(None, content)?, None)?;
        set_file_to_commit_id(&tx, file_id, commit_id)?;

        tx.commit().db_context(|| "closing create file transaction")?;
        Ok(hash)
    }

    /// Append pushed commits. `request.base` must be the last commit of the
    /// stored chain, otherwise the push is not a fast-forward. Every incoming
    /// commit is verified by replay before anything is written. A request
    /// without commits only moves the current commit to `request.head`.
    pub fn append_commits(&self, username: &str, alias: &str, request: &PushRequest) -> Result<ContentHash> {
        let mut conn = self.conn();
        let tx = conn.transaction().db_context(|| "starting push transaction")?;
        let uid = user_id(&tx, username)?;

        let existing = match file_record(&tx, username, alias) {
            Ok(record) => Some(record),
            Err(Error::NotTracked(_)) => None,
            Err(e) => return Err(e),
        };
        let file_id = match &existing {
            Some(record) => record.id,
            None => {
                if request.base.is_some() {
                    return Err(Error::conflict(alias, "remote file no longer exists"));
                }
                check_new_file(&tx, uid, alias, &request.path)?;
                insert_file(&tx, uid, alias, &request.path)?
            }
        };
        if let Some(record) = &existing {
            let moves_pointer = request.head.is_some() && request.head != record.current;
            if request.commits.is_empty() && !moves_pointer {
                return Err(Error::NoChanges);
            }
        }

        let storer = FileStorer {
            conn: &tx,
            file_id,
            alias: alias.to_string(),
        };
        let chain = storer.hashes()?;
        if chain.last() != request.base.as_ref() {
            return Err(Error::conflict(
                alias,
                "remote has commits that are not in the local history, pull first",
            ));
        }

        let mut content = match &request.base {
            Some(base) => Some(revision::reconstruct(&storer, base)?),
            None => None,
        };
        let mut seen = chain;
        for commit in &request.commits {
            let hash = commit.info.hash;
            if seen.contains(&hash) {
                return Err(UserError::Duplicate {
                    what: "commit",
                    value: hash.to_hex(),
                }
                .into());
            }
            content = Some(revision::apply_revision(content.as_deref(), &hash, &commit.revision)?);
            insert_commit(&tx, file_id, &commit.info, &commit.revision, None)?;
            seen.push(hash);
        }

        let head = match request.head.or_else(|| request.commits.last().map(|c| c.info.hash)) {
            Some(h) => h,
            None => return Err(Error::NoChanges),
        };
        let head_id = commit_id(&tx, file_id, alias, &head)?;
        set_file_to_commit_id(&tx, file_id, head_id)?;

        tx.commit().db_context(|| "closing push transaction")?;
        Ok(head)
    }

    /// Move a file's current commit to `hash`
    pub fn set_file_to_hash(&self, username: &str, alias: &str, hash: &ContentHash) -> Result<()> {
        let affected = self
            .conn()
            .execute(
                "WITH new_commit(id, file_id) AS (
                     SELECT commits.id, commits.file_id
                     FROM commits
                     JOIN files ON files.id = commits.file_id
                     JOIN users ON users.id = files.user_id
                     WHERE users.username = ?1 AND files.alias = ?2 AND commits.hash = ?3
                 )
                 UPDATE files
                 SET current_commit_id = (SELECT id FROM new_commit), updated_at = ?4
                 WHERE id = (SELECT file_id FROM new_commit)",
                params![username, alias, hash.to_hex(), now()],
            )
            .db_context(|| format!("setting {:?} {:?} to hash {}", username, alias, hash))?;
        if affected == 0 {
            return Err(Error::CommitNotFound {
                alias: alias.to_string(),
                hash: *hash,
            });
        }
        Ok(())
    }

    /// Delete every commit of a file; the file remains with no current commit
    pub fn clear_commits(&self, username: &str, alias: &str) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().db_context(|| "starting clear file transaction")?;
        let record = file_record(&tx, username, alias)?;
        tx.execute(
            "UPDATE files SET current_commit_id = NULL, updated_at = ?2 WHERE id = ?1",
            params![record.id, now()],
        )
        .db_context(|| format!("clearing current commit of {:?}", alias))?;
        tx.execute("DELETE FROM commits WHERE file_id = ?1", params![record.id])
            .db_context(|| format!("deleting commits of {:?}", alias))?;
        tx.commit().db_context(|| "closing clear file transaction")
    }

    /// Delete a file and its commits. `confirm` must repeat the alias.
    pub fn delete_file(&self, username: &str, alias: &str, confirm: &str) -> Result<()> {
        if alias != confirm {
            return Err(UserError::Invalid("alias does not match".into()).into());
        }
        let mut conn = self.conn();
        let tx = conn.transaction().db_context(|| "starting delete file transaction")?;
        let record = file_record(&tx, username, alias)?;
        tx.execute("UPDATE files SET current_commit_id = NULL WHERE id = ?1", params![record.id])
            .db_context(|| format!("detaching current commit of {:?}", alias))?;
        tx.execute("DELETE FROM commits WHERE file_id = ?1", params![record.id])
            .db_context(|| format!("deleting commits of {:?}", alias))?;
        tx.execute("DELETE FROM files WHERE id = ?1", params![record.id])
            .db_context(|| format!("deleting file {:?}", alias))?;
        tx.commit().db_context(|| "closing delete file transaction")
    }

    /// Rename a file and/or move its path
    pub fn update_file(&self, username: &str, alias: &str, new_alias: &str, new_path: &str) -> Result<()> {
        if new_alias.is_empty() || new_path.is_empty() {
            return Err(UserError::Invalid(format!(
                "cannot update to empty value, alias: {:?}, path: {:?}",
                new_alias, new_path
            ))
            .into());
        }
        crate::local::validate_alias(new_alias)?;

        let conn = self.conn();
        let record = file_record(&conn, username, alias)?;
        if record.alias == new_alias && record.path == new_path {
            return Ok(());
        }
        if !record.alias.eq_ignore_ascii_case(new_alias) && alias_taken(&conn, record.user_id, new_alias)? {
            return Err(UserError::Duplicate {
                what: "file alias",
                value: new_alias.to_string(),
            }
            .into());
        }
        if !record.path.eq_ignore_ascii_case(new_path) && path_taken(&conn, record.user_id, new_path)? {
            return Err(UserError::Duplicate {
                what: "file path",
                value: new_path.to_string(),
            }
            .into());
        }
        conn.execute(
            "UPDATE files SET alias = ?1, path = ?2, updated_at = ?3 WHERE id = ?4",
            params![new_alias, new_path, now(), record.id],
        )
        .db_context(|| format!("updating file {} to {:?} {:?}", record.id, new_alias, new_path))?;
        Ok(())
    }

    /// Copy `username`/`alias` at `hash` into a new file owned by `new_username`.
    /// The new file's only commit reconstructs to the same content and hash
    /// and records the source commit as its provenance.
    pub fn fork_file(&self, username: &str, alias: &str, hash: &ContentHash, new_username: &str) -> Result<ContentHash> {
        let mut conn = self.conn();
        let tx = conn.transaction().db_context(|| "starting fork file transaction")?;

        let source = file_record(&tx, username, alias)?;
        let source_storer = FileStorer {
            conn: &tx,
            file_id: source.id,
            alias: source.alias.clone(),
        };
        let source_commit_id = commit_id(&tx, source.id, alias, hash)?;
        let is_first = source_storer.hashes()?.first() == Some(hash);
        let revision_bytes = if is_first {
            source_storer.revision(hash)?
        } else {
            revision::new_revision(None, &revision::reconstruct(&source_storer, hash)?)?
        };

        let new_uid = user_id(&tx, new_username)?;
        check_new_file(&tx, new_uid, &source.alias, &source.path)?;
        let new_file_id = insert_file(&tx, new_uid, &source.alias, &source.path)?;

        let mut info = CommitInfo::new(*hash, fork_message(username, &source.alias, hash), now());
        info.forked_from = Some(info.message.clone());
        let new_commit_id = insert_commit(&tx, new_file_id, &info, &revision_bytes, Some(source_commit_id))?;
        set_file_to_commit_id(&tx, new_file_id, new_commit_id)?;

        tx.commit().db_context(|| "closing fork file transaction")?;
        Ok(*hash)
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn parse_hash(hex: &str) -> Result<ContentHash> {
    ContentHash::from_hex(hex).map_err(|e| Error::Serialization(format!("stored hash {:?}: {}", hex, e)))
}

fn validate_username(username: &str) -> Result<()> {
    let valid = !username.is_empty()
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(UserError::Invalid(format!("invalid username {:?}", username)).into());
    }
    Ok(())
}

fn user_id(conn: &Connection, username: &str) -> Result<i64> {
    conn.query_row(
        "SELECT id FROM users WHERE username = ?1",
        params![username],
        |row| row.get(0),
    )
    .optional()
    .db_context(|| format!("looking up user {:?}", username))?
    .ok_or_else(|| Error::UserNotFound(username.to_string()))
}

fn file_record(conn: &Connection, username: &str, alias: &str) -> Result<FileRecord> {
    let row = conn
        .query_row(
            "SELECT files.id, files.user_id, files.alias, files.path, commits.hash,
                    files.created_at, files.updated_at
             FROM files
             JOIN users ON users.id = files.user_id
             LEFT JOIN commits ON commits.id = files.current_commit_id
             WHERE users.username = ?1 AND files.alias = ?2",
            params![username, alias],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            },
        )
        .optional()
        .db_context(|| format!("querying for user {:?} file {:?}", username, alias))?;

    let Some((id, user_id_, alias_, path, hash, created_at, updated_at)) = row else {
        user_id(conn, username)?;
        return Err(Error::NotTracked(alias.to_string()));
    };
    Ok(FileRecord {
        id,
        user_id: user_id_,
        alias: alias_,
        path,
        current: hash.as_deref().map(parse_hash).transpose()?,
        created_at,
        updated_at,
    })
}

fn commit_infos(conn: &Connection, file_id: i64) -> Result<Vec<CommitInfo>> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT c.hash, c.message, c.created_at, su.username, sf.alias, sc.hash
             FROM commits c
             LEFT JOIN commits sc ON sc.id = c.forked_from
             LEFT JOIN files sf ON sf.id = sc.file_id
             LEFT JOIN users su ON su.id = sf.user_id
             WHERE c.file_id = ?1
             ORDER BY c.id",
        )
        .db_context(|| format!("listing commits of file {}", file_id))?;
    let rows = stmt
        .query_map(params![file_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })
        .db_context(|| format!("listing commits of file {}", file_id))?;

    let mut infos = Vec::new();
    for row in rows {
        let (hash, message, timestamp, src_user, src_alias, src_hash) =
            row.db_context(|| format!("listing commits of file {}", file_id))?;
        let forked_from = match (src_user, src_alias, src_hash) {
            (Some(u), Some(a), Some(h)) => Some(fork_message(&u, &a, &parse_hash(&h)?)),
            _ => None,
        };
        infos.push(CommitInfo {
            hash: parse_hash(&hash)?,
            message,
            timestamp,
            forked_from,
        });
    }
    Ok(infos)
}

fn commit_id(conn: &Connection, file_id: i64, alias: &str, hash: &ContentHash) -> Result<i64> {
    conn.query_row(
        "SELECT id FROM commits WHERE file_id = ?1 AND hash = ?2",
        params![file_id, hash.to_hex()],
        |row| row.get(0),
    )
    .optional()
    .db_context(|| format!("looking up commit {} of {:?}", hash, alias))?
    .ok_or_else(|| Error::CommitNotFound {
        alias: alias.to_string(),
        hash: *hash,
    })
}

fn alias_taken(conn: &Connection, uid: i64, alias: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM files WHERE user_id = ?1 AND alias = ?2",
            params![uid, alias],
            |row| row.get(0),
        )
        .db_context(|| format!("checking if file {:?} exists for user {}", alias, uid))?;
    Ok(count > 0)
}

fn path_taken(conn: &Connection, uid: i64, path: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM files WHERE user_id = ?1 AND path = ?2",
            params![uid, path],
            |row| row.get(0),
        )
        .db_context(|| format!("checking if path {:?} exists for user {}", path, uid))?;
    Ok(count > 0)
}

/// Validation shared by every path that creates a file row
fn check_new_file(conn: &Connection, uid: i64, alias: &str, path: &str) -> Result<()> {
    crate::local::validate_alias(alias)?;
    if path.is_empty() {
        return Err(UserError::Invalid("path cannot be empty".into()).into());
    }
    if alias_taken(conn, uid, alias)? {
        return Err(UserError::Duplicate {
            what: "file alias",
            value: alias.to_string(),
        }
        .into());
    }
    if path_taken(conn, uid, path)? {
        return Err(UserError::Duplicate {
            what: "file path",
            value: path.to_string(),
        }
        .into());
    }
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM files WHERE user_id = ?1", params![uid], |row| row.get(0))
        .db_context(|| format!("counting user {} files", uid))?;
    if count as usize >= MAX_FILES_PER_USER {
        return Err(UserError::LimitExceeded {
            limit: MAX_FILES_PER_USER,
        }
        .into());
    }
    Ok(())
}

fn insert_file(conn: &Connection, uid: i64, alias: &str, path: &str) -> Result<i64> {
    let ts = now();
    conn.execute(
        "INSERT INTO files(user_id, alias, path, current_commit_id, created_at, updated_at)
         VALUES(?1, ?2, ?3, NULL, ?4, ?4)",
        params![uid, alias, path, ts],
    )
    .db_context(|| format!("inserting file {:?} for user {}", alias, uid))?;
    Ok(conn.last_insert_rowid())
}

fn insert_commit(
    conn: &Connection,
    file_id: i64,
    info: &CommitInfo,
    revision: &[u8],
    forked_from: Option<i64>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO commits(file_id, hash, revision, message, forked_from, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
        params![file_id, info.hash.to_hex(), revision, info.message, forked_from, info.timestamp],
    )
    .db_context(|| format!("inserting commit {} into file {}", info.hash, file_id))?;
    Ok(conn.last_insert_rowid())
}

fn set_file_to_commit_id(conn: &Connection, file_id: i64, commit_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE files SET current_commit_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![commit_id, now(), file_id],
    )
    .db_context(|| format!("updating content in file {}", file_id))?;
    Ok(())
}
