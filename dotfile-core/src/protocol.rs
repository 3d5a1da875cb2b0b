//! Sync protocol types shared by the server, the HTTP client and the
//! sync coordinator. Encoded as JSON on the wire; revision bytes travel
//! base64 encoded.

use crate::error::{Error, ErrorKind};
use crate::object::{CommitInfo, ContentHash};
use serde::{Deserialize, Serialize};

/// Protocol version advertised by the server
pub const PROTOCOL_VERSION: u32 = 1;

/// A remote file and its chain metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub alias: String,
    pub path: String,
    /// `None` once the chain was cleared
    pub current: Option<ContentHash>,
    /// Commits in chain order
    pub commits: Vec<CommitInfo>,
}

impl RemoteFile {
    pub fn hashes(&self) -> Vec<ContentHash> {
        self.commits.iter().map(|c| c.hash).collect()
    }
}

/// One commit with its stored revision, as moved between chains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCommit {
    #[serde(flatten)]
    pub info: CommitInfo,
    #[serde(with = "base64_bytes")]
    pub revision: Vec<u8>,
}

/// Body of a push: commits to append after `base`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    /// Path used if the push creates the file
    pub path: String,
    /// Last commit of the remote chain the commits extend; `None` for an empty chain
    pub base: Option<ContentHash>,
    pub commits: Vec<TransferCommit>,
    /// Commit the remote pointer moves to; defaults to the last pushed commit
    #[serde(default)]
    pub head: Option<ContentHash>,
}

/// Body of a rename/move request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateFileRequest {
    pub alias: String,
    pub path: String,
}

/// Summary row of a user's file listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub alias: String,
    pub path: String,
    pub num_commits: usize,
    /// Unix seconds
    pub updated_at: i64,
}

/// JSON error body. The optional fields carry what the receiving side needs
/// to rebuild the same [`Error`] variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<ContentHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ErrorBody {
    pub fn from_error(err: &Error) -> Self {
        let mut body = Self {
            error: err.to_string(),
            kind: err.kind().as_str().to_string(),
            ..Self::default()
        };
        match err {
            Error::Conflict { alias, reason } => {
                body.alias = Some(alias.clone());
                body.error = reason.clone();
            }
            Error::NotTracked(alias) | Error::NoCommits(alias) => body.alias = Some(alias.clone()),
            Error::CommitNotFound { alias, hash } => {
                body.alias = Some(alias.clone());
                body.hash = Some(*hash);
            }
            Error::UserNotFound(user) => body.user = Some(user.clone()),
            Error::MissingWorkingCopy(path) => body.path = Some(path.clone()),
            Error::CorruptChain { hash, reason } => {
                body.hash = Some(*hash);
                body.error = reason.clone();
            }
            _ => {}
        }
        body
    }

    /// Rebuild an [`Error`] of the same kind on the receiving side
    pub fn into_error(self) -> Error {
        let kind = self.kind.as_str();
        if kind == ErrorKind::Conflict.as_str() {
            if self.error == Error::NoChanges.to_string() {
                return Error::NoChanges;
            }
            return Error::Conflict {
                alias: self.alias.unwrap_or_default(),
                reason: self.error,
            };
        }
        if kind == ErrorKind::NotFound.as_str() {
            return match (self.alias, self.hash, self.user, self.path) {
                (Some(alias), Some(hash), _, _) => Error::CommitNotFound { alias, hash },
                (Some(alias), None, _, _) if self.error == Error::NoCommits(alias.clone()).to_string() => {
                    Error::NoCommits(alias)
                }
                (Some(alias), None, _, _) => Error::NotTracked(alias),
                (None, _, Some(user), _) => Error::UserNotFound(user),
                (None, _, None, Some(path)) => Error::MissingWorkingCopy(path),
                _ => Error::Remote(self.error),
            };
        }
        if kind == ErrorKind::CorruptChain.as_str() {
            if let Some(hash) = self.hash {
                return Error::CorruptChain {
                    hash,
                    reason: self.error,
                };
            }
        }
        if kind == ErrorKind::Validation.as_str() {
            return crate::error::UserError::Invalid(self.error).into();
        }
        Error::Remote(self.error)
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_commit_json_shape() {
        let hash = ContentHash::of(b"x");
        let commit = TransferCommit {
            info: CommitInfo::new(hash, "first", 10),
            revision: vec![0, 1, 2, 255],
        };
        let json = serde_json::to_value(&commit).unwrap();
        assert_eq!(json["hash"], hash.to_hex());
        assert_eq!(json["message"], "first");
        assert_eq!(json["revision"], "AAEC/w==");
        assert!(json.get("forked_from").is_none());

        let back: TransferCommit = serde_json::from_value(json).unwrap();
        assert_eq!(back, commit);
    }

    #[test]
    fn test_error_body_preserves_conflict() {
        let body = ErrorBody::from_error(&Error::conflict("bashrc", "remote has diverged"));
        assert_eq!(body.kind, "conflict");
        match body.into_error() {
            Error::Conflict { alias, reason } => {
                assert_eq!(alias, "bashrc");
                assert_eq!(reason, "remote has diverged");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_error_body_preserves_no_changes() {
        let body = ErrorBody::from_error(&Error::NoChanges);
        assert!(body.into_error().is_no_changes());
    }

    /// Send through JSON like the HTTP layer does
    fn over_the_wire(err: &Error) -> Error {
        let json = serde_json::to_string(&ErrorBody::from_error(err)).unwrap();
        serde_json::from_str::<ErrorBody>(&json).unwrap().into_error()
    }

    #[test]
    fn test_error_body_preserves_not_found_variants() {
        let hash = ContentHash::of(b"x");
        match over_the_wire(&Error::CommitNotFound {
            alias: "bashrc".into(),
            hash,
        }) {
            Error::CommitNotFound { alias, hash: h } => {
                assert_eq!(alias, "bashrc");
                assert_eq!(h, hash);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            over_the_wire(&Error::UserNotFound("carol".into())),
            Error::UserNotFound(user) if user == "carol"
        ));
        assert!(matches!(
            over_the_wire(&Error::NotTracked("vimrc".into())),
            Error::NotTracked(alias) if alias == "vimrc"
        ));
        assert!(matches!(
            over_the_wire(&Error::NoCommits("vimrc".into())),
            Error::NoCommits(alias) if alias == "vimrc"
        ));
    }

    #[test]
    fn test_error_body_preserves_corrupt_chain() {
        let hash = ContentHash::of(b"x");
        let err = over_the_wire(&Error::corrupt(&hash, "hash mismatch"));
        assert_eq!(err.kind(), ErrorKind::CorruptChain);
        assert_eq!(err.to_string(), Error::corrupt(&hash, "hash mismatch").to_string());
    }

    #[test]
    fn test_error_body_keeps_every_kind() {
        let errors = [
            Error::from(crate::error::UserError::LimitExceeded { limit: 100 }),
            Error::conflict("bashrc", "pull first"),
            Error::UserNotFound("carol".into()),
            Error::corrupt(&ContentHash::of(b"y"), "bad zstd frame"),
            Error::Remote("boom".into()),
        ];
        for err in &errors {
            assert_eq!(over_the_wire(err).kind(), err.kind(), "{}", err);
        }
    }
}
