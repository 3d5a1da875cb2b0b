//! Dotfile Core Library
//!
//! Core functionality for dotfile including:
//! - Content hashes and commit metadata
//! - Line diffs and binary patches
//! - Storer abstraction over local and remote chains
//! - Revision engine (compression, replay, dirty check)
//! - Local commit chain store on the filesystem
//! - Remote commit chain store using rusqlite (WAL mode)
//! - Sync protocol types and the push/pull/fork coordinator

pub mod auth;
pub mod delta;
pub mod error;
pub mod local;
pub mod object;
pub mod protocol;
pub mod revision;
pub mod sqlite_store;
pub mod storage;
pub mod sync;

pub use auth::AuthResult;
pub use delta::{ChunkKind, DiffChunk, FileDiff, Patch};
pub use error::{Error, ErrorKind, Result, UserError};
pub use local::{LocalStorage, TrackingData};
pub use object::{CommitInfo, ContentHash, FileState};
pub use protocol::{
    ErrorBody, FileSummary, PushRequest, RemoteFile, TransferCommit, UpdateFileRequest,
    PROTOCOL_VERSION,
};
pub use sqlite_store::{SqliteStore, MAX_FILES_PER_USER};
pub use storage::{MemoryStorer, Storer};
pub use sync::{Remote, StoreRemote, SyncReport};
