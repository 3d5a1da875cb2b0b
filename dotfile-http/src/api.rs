//! HTTP API handlers for the dotfile sync protocol.
//!
//! Endpoints (relative to `/api/v1`):
//!   GET    /                          → protocol version
//!   GET    /{user}                    → file summaries
//!   GET    /{user}/{alias}            → file with commit metadata
//!   PUT    /{user}/{alias}            → rename / move (auth)
//!   DELETE /{user}/{alias}?confirm=   → delete file (auth)
//!   GET    /{user}/{alias}/commits    → commits with revisions (`after` query param)
//!   POST   /{user}/{alias}/commits    → push (auth)
//!   POST   /{user}/{alias}/clear      → delete all commits (auth)
//!   GET    /{user}/{alias}/{hash}/raw → full content at hash
//!   POST   /{user}/{alias}/{hash}/checkout → move current commit (auth)
//!   POST   /{user}/{alias}/{hash}/fork     → fork into the caller's namespace (auth)

use bytes::Bytes;
use dotfile_core::auth::parse_basic_auth;
use dotfile_core::{
    AuthResult, ContentHash, Error, ErrorBody, ErrorKind, PushRequest, SqliteStore,
    UpdateFileRequest, UserError, PROTOCOL_VERSION,
};
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE, WWW_AUTHENTICATE};
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Decoded request as seen by the dispatcher
pub struct ApiRequest<'a> {
    pub method: &'a str,
    /// Path after the `/api/v1` prefix
    pub path: &'a str,
    pub query: &'a str,
    /// Raw `Authorization` header value
    pub authorization: Option<&'a str>,
    pub body: &'a [u8],
}

#[derive(Serialize)]
struct ServerInfo {
    protocol_version: u32,
}

#[derive(Serialize)]
struct HeadResponse {
    head: ContentHash,
}

// ─────────────────────────────────────────────────────
// Public dispatch
// ─────────────────────────────────────────────────────

/// Route an API request to the appropriate handler
pub async fn handle_api_request(req: &ApiRequest<'_>, store: &Arc<SqliteStore>) -> Response<Full<Bytes>> {
    let segments: Vec<String> = req
        .path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(urldecode)
        .collect();
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
    tracing::debug!("API request: {} /{}", req.method, segments.join("/"));

    route(req, store, &segments).unwrap_or_else(Rejection::into_response)
}

fn route(req: &ApiRequest<'_>, store: &SqliteStore, segments: &[&str]) -> HandlerResult {
    match (req.method, segments) {
        ("GET", []) => Ok(json_ok(&ServerInfo {
            protocol_version: PROTOCOL_VERSION,
        })),
        ("GET", [user]) => Ok(json_ok(&store.list_files(user)?)),
        ("GET", [user, alias]) => Ok(json_ok(&store.remote_file(user, alias)?)),
        ("PUT", [user, alias]) => handle_update(req, store, user, alias),
        ("DELETE", [user, alias]) => handle_delete(req, store, user, alias),
        ("GET", [user, alias, "commits"]) => handle_commits(req, store, user, alias),
        ("POST", [user, alias, "commits"]) => handle_push(req, store, user, alias),
        ("POST", [user, alias, "clear"]) => handle_clear(req, store, user, alias),
        ("GET", [user, alias, hash, "raw"]) => handle_raw(store, user, alias, hash),
        ("POST", [user, alias, hash, "checkout"]) => handle_checkout(req, store, user, alias, hash),
        ("POST", [user, alias, hash, "fork"]) => handle_fork(req, store, user, alias, hash),
        _ => Ok(json_error(
            StatusCode::NOT_FOUND,
            &ErrorBody {
                error: format!("unknown endpoint: {} {}", req.method, req.path),
                kind: ErrorKind::NotFound.as_str().to_string(),
                ..ErrorBody::default()
            },
        )),
    }
}

/// Why a request did not succeed
enum Rejection {
    Unauthorized,
    Forbidden(String),
    Failed(Error),
}

impl From<Error> for Rejection {
    fn from(e: Error) -> Self {
        Rejection::Failed(e)
    }
}

impl Rejection {
    fn into_response(self) -> Response<Full<Bytes>> {
        match self {
            Rejection::Unauthorized => {
                let mut resp = json_error(
                    StatusCode::UNAUTHORIZED,
                    &ErrorBody {
                        error: "invalid username or token".into(),
                        kind: "unauthorized".into(),
                        ..ErrorBody::default()
                    },
                );
                resp.headers_mut()
                    .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Basic realm=\"dotfile\""));
                resp
            }
            Rejection::Forbidden(user) => json_error(
                StatusCode::FORBIDDEN,
                &ErrorBody {
                    error: format!("not allowed to modify files of {:?}", user),
                    kind: "forbidden".into(),
                    ..ErrorBody::default()
                },
            ),
            Rejection::Failed(e) => {
                let status = status_for(e.kind());
                if status.is_server_error() {
                    tracing::error!("API request failed: {}", e);
                } else {
                    tracing::debug!("API request rejected: {}", e);
                }
                json_error(status, &ErrorBody::from_error(&e))
            }
        }
    }
}

type HandlerResult = Result<Response<Full<Bytes>>, Rejection>;

/// HTTP status for an error kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::CorruptChain | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Resolve the caller from the `Authorization` header
fn authenticate(req: &ApiRequest<'_>, store: &SqliteStore) -> Result<String, Rejection> {
    let (username, token) = req
        .authorization
        .and_then(parse_basic_auth)
        .ok_or(Rejection::Unauthorized)?;
    match store.authenticate(&username, &token)? {
        AuthResult::Success(_) => Ok(username),
        AuthResult::Failed => Err(Rejection::Unauthorized),
    }
}

/// The caller must own `user`'s namespace
fn authorize(req: &ApiRequest<'_>, store: &SqliteStore, user: &str) -> Result<String, Rejection> {
    let caller = authenticate(req, store)?;
    if !caller.eq_ignore_ascii_case(user) {
        return Err(Rejection::Forbidden(user.to_string()));
    }
    Ok(caller)
}

fn parse_body<'de, T: serde::Deserialize<'de>>(body: &'de [u8]) -> Result<T, Rejection> {
    serde_json::from_slice(body)
        .map_err(|e| Rejection::Failed(UserError::Invalid(format!("invalid request body: {}", e)).into()))
}

fn parse_hash(hash: &str) -> Result<ContentHash, Rejection> {
    ContentHash::from_hex(hash)
        .map_err(|_| Rejection::Failed(UserError::Invalid(format!("invalid hash {:?}", hash)).into()))
}

// ─────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────

fn handle_update(req: &ApiRequest<'_>, store: &SqliteStore, user: &str, alias: &str) -> HandlerResult {
    authorize(req, store, user)?;
    let update: UpdateFileRequest = parse_body(req.body)?;
    store.update_file(user, alias, &update.alias, &update.path)?;
    Ok(empty(StatusCode::NO_CONTENT))
}

fn handle_delete(req: &ApiRequest<'_>, store: &SqliteStore, user: &str, alias: &str) -> HandlerResult {
    authorize(req, store, user)?;
    let params = parse_query(req.query);
    let confirm = params.get("confirm").map(String::as_str).unwrap_or_default();
    store.delete_file(user, alias, confirm)?;
    Ok(empty(StatusCode::NO_CONTENT))
}

fn handle_clear(req: &ApiRequest<'_>, store: &SqliteStore, user: &str, alias: &str) -> HandlerResult {
    authorize(req, store, user)?;
    store.clear_commits(user, alias)?;
    Ok(empty(StatusCode::NO_CONTENT))
}

fn handle_commits(req: &ApiRequest<'_>, store: &SqliteStore, user: &str, alias: &str) -> HandlerResult {
    let params = parse_query(req.query);
    let after = match params.get("after").filter(|v| !v.is_empty()) {
        Some(hex) => Some(parse_hash(hex)?),
        None => None,
    };
    let commits = store.commits_after(user, alias, after.as_ref())?;
    Ok(json_ok(&commits))
}

fn handle_push(req: &ApiRequest<'_>, store: &SqliteStore, user: &str, alias: &str) -> HandlerResult {
    authorize(req, store, user)?;
    let push: PushRequest = parse_body(req.body)?;
    let head = store.append_commits(user, alias, &push)?;
    tracing::info!(user = %user, alias = %alias, commits = push.commits.len(), "push accepted");
    Ok(json_ok(&HeadResponse { head }))
}

fn handle_raw(store: &SqliteStore, user: &str, alias: &str, hash: &str) -> HandlerResult {
    let hash = parse_hash(hash)?;
    let content = store.content(user, alias, &hash)?;
    let mut resp = Response::new(Full::new(Bytes::from(content)));
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    Ok(resp)
}

fn handle_checkout(
    req: &ApiRequest<'_>,
    store: &SqliteStore,
    user: &str,
    alias: &str,
    hash: &str,
) -> HandlerResult {
    authorize(req, store, user)?;
    let hash = parse_hash(hash)?;
    store.set_file_to_hash(user, alias, &hash)?;
    Ok(json_ok(&HeadResponse { head: hash }))
}

fn handle_fork(
    req: &ApiRequest<'_>,
    store: &SqliteStore,
    owner: &str,
    alias: &str,
    hash: &str,
) -> HandlerResult {
    let caller = authenticate(req, store)?;
    let hash = parse_hash(hash)?;
    let head = store.fork_file(owner, alias, &hash, &caller)?;
    tracing::info!(owner = %owner, alias = %alias, to = %caller, "fork created");
    Ok(json_ok(&HeadResponse { head }))
}

// ─────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────

/// Parse a query string into a key-value map
fn parse_query(query: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        if let Some((k, v)) = pair.split_once('=') {
            map.insert(urldecode(k), urldecode(v));
        }
    }
    map
}

/// Percent-decoding; invalid UTF-8 is replaced
fn urldecode(s: &str) -> String {
    let mut out = Vec::with_capacity(s.len());
    let mut bytes = s.bytes();
    while let Some(b) = bytes.next() {
        match b {
            b'%' => {
                let hi = bytes.next().and_then(hex_val);
                let lo = bytes.next().and_then(hex_val);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => out.push(hi << 4 | lo),
                    _ => out.push(b'%'),
                }
            }
            b'+' => out.push(b' '),
            _ => out.push(b),
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn empty(status: StatusCode) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::new()));
    *resp.status_mut() = status;
    resp
}

pub(crate) fn json_ok<T: Serialize>(data: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, serde_json::to_vec(data).unwrap_or_default())
}

pub(crate) fn json_error(status: StatusCode, body: &ErrorBody) -> Response<Full<Bytes>> {
    json_response(status, serde_json::to_vec(body).unwrap_or_default())
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::from(body)));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}
