//! Integration tests for the /api/v1 HTTP endpoints.

use base64::Engine;
use dotfile_core::revision::new_revision;
use dotfile_core::{
    CommitInfo, ContentHash, Error, ErrorBody, FileSummary, PushRequest, RemoteFile, SqliteStore,
    TransferCommit,
};
use dotfile_http::{handle_api_request, ApiRequest};
use http_body_util::BodyExt;
use std::sync::Arc;

const C1: &[u8] = b"export A=1\n";
const C2: &[u8] = b"export A=1\nexport B=2\n";

struct Fixture {
    store: Arc<SqliteStore>,
    alice: String,
    bob: String,
}

/// Store with users alice and bob; alice owns `bashrc` with two commits
fn setup() -> Fixture {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let alice = basic("alice", &store.create_user("alice").unwrap());
    let bob = basic("bob", &store.create_user("bob").unwrap());
    store.create_file("alice", "bashrc", "~/.bashrc", C1, "init").unwrap();
    let push = PushRequest {
        path: "~/.bashrc".into(),
        base: Some(ContentHash::of(C1)),
        commits: vec![commit(Some(C1), C2)],
        head: None,
    };
    store.append_commits("alice", "bashrc", &push).unwrap();
    Fixture { store, alice, bob }
}

fn basic(user: &str, token: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", user, token));
    format!("Basic {}", encoded)
}

fn commit(prev: Option<&[u8]>, content: &[u8]) -> TransferCommit {
    TransferCommit {
        info: CommitInfo::new(ContentHash::of(content), "msg", 1),
        revision: new_revision(prev, content).unwrap(),
    }
}

async fn call(
    fx: &Fixture,
    method: &str,
    path: &str,
    query: &str,
    auth: Option<&str>,
    body: &[u8],
) -> (u16, Vec<u8>) {
    let req = ApiRequest {
        method,
        path,
        query,
        authorization: auth,
        body,
    };
    let resp = handle_api_request(&req, &fx.store).await;
    let status = resp.status().as_u16();
    let body = resp.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, body)
}

#[tokio::test]
async fn test_list_and_get_file() {
    let fx = setup();

    let (status, body) = call(&fx, "GET", "/alice", "", None, &[]).await;
    assert_eq!(status, 200);
    let files: Vec<FileSummary> = serde_json::from_slice(&body).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].alias, "bashrc");
    assert_eq!(files[0].num_commits, 2);

    let (status, body) = call(&fx, "GET", "/alice/bashrc", "", None, &[]).await;
    assert_eq!(status, 200);
    let file: RemoteFile = serde_json::from_slice(&body).unwrap();
    assert_eq!(file.current, Some(ContentHash::of(C2)));
    assert_eq!(file.commits.len(), 2);
}

#[tokio::test]
async fn test_unknown_file_and_endpoint() {
    let fx = setup();

    let (status, body) = call(&fx, "GET", "/alice/vimrc", "", None, &[]).await;
    assert_eq!(status, 404);
    let err: ErrorBody = serde_json::from_slice(&body).unwrap();
    assert_eq!(err.kind, "not_found");
    assert_eq!(err.alias.as_deref(), Some("vimrc"));

    let (status, _) = call(&fx, "PATCH", "/alice/bashrc", "", None, &[]).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_commits_after_and_raw() {
    let fx = setup();
    let h1 = ContentHash::of(C1).to_hex();

    let (status, body) = call(&fx, "GET", "/alice/bashrc/commits", &format!("after={}", h1), None, &[]).await;
    assert_eq!(status, 200);
    let commits: Vec<TransferCommit> = serde_json::from_slice(&body).unwrap();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].info.hash, ContentHash::of(C2));

    let (status, body) = call(&fx, "GET", &format!("/alice/bashrc/{}/raw", h1), "", None, &[]).await;
    assert_eq!(status, 200);
    assert_eq!(body, C1);

    let (status, _) = call(&fx, "GET", "/alice/bashrc/nothex/raw", "", None, &[]).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_push_requires_owner() {
    let fx = setup();
    let c3 = b"export A=1\nexport B=2\nexport C=3\n";
    let push = PushRequest {
        path: "~/.bashrc".into(),
        base: Some(ContentHash::of(C2)),
        commits: vec![commit(Some(C2), c3)],
        head: None,
    };
    let body = serde_json::to_vec(&push).unwrap();

    let (status, _) = call(&fx, "POST", "/alice/bashrc/commits", "", None, &body).await;
    assert_eq!(status, 401);
    let (status, _) = call(&fx, "POST", "/alice/bashrc/commits", "", Some(&fx.bob), &body).await;
    assert_eq!(status, 403);
    let (status, _) = call(&fx, "POST", "/alice/bashrc/commits", "", Some("Basic YWxpY2U6d3Jvbmc="), &body).await;
    assert_eq!(status, 401);

    let (status, _) = call(&fx, "POST", "/alice/bashrc/commits", "", Some(&fx.alice), &body).await;
    assert_eq!(status, 200);
    assert_eq!(
        fx.store.file("alice", "bashrc").unwrap().current,
        Some(ContentHash::of(c3))
    );

    // same base again: no longer a fast-forward
    let (status, body) = call(&fx, "POST", "/alice/bashrc/commits", "", Some(&fx.alice), &body).await;
    assert_eq!(status, 409);
    let err: ErrorBody = serde_json::from_slice(&body).unwrap();
    assert_eq!(err.kind, "conflict");
}

#[tokio::test]
async fn test_push_invalid_body() {
    let fx = setup();
    let (status, body) = call(&fx, "POST", "/alice/bashrc/commits", "", Some(&fx.alice), b"{").await;
    assert_eq!(status, 400);
    let err: ErrorBody = serde_json::from_slice(&body).unwrap();
    assert_eq!(err.kind, "validation");
}

#[tokio::test]
async fn test_checkout_and_clear() {
    let fx = setup();
    let h1 = ContentHash::of(C1);

    let path = format!("/alice/bashrc/{}/checkout", h1);
    let (status, _) = call(&fx, "POST", &path, "", Some(&fx.alice), &[]).await;
    assert_eq!(status, 200);
    assert_eq!(fx.store.file("alice", "bashrc").unwrap().current, Some(h1));

    let missing = format!("/alice/bashrc/{}/checkout", ContentHash::of(b"nope"));
    let (status, body) = call(&fx, "POST", &missing, "", Some(&fx.alice), &[]).await;
    assert_eq!(status, 404);
    let err: ErrorBody = serde_json::from_slice(&body).unwrap();
    assert!(matches!(
        err.into_error(),
        Error::CommitNotFound { alias, hash } if alias == "bashrc" && hash == ContentHash::of(b"nope")
    ));

    let (status, _) = call(&fx, "POST", "/alice/bashrc/clear", "", Some(&fx.alice), &[]).await;
    assert_eq!(status, 204);
    assert!(fx.store.remote_file("alice", "bashrc").unwrap().commits.is_empty());
}

#[tokio::test]
async fn test_fork_into_caller_namespace() {
    let fx = setup();
    let h2 = ContentHash::of(C2);

    let path = format!("/alice/bashrc/{}/fork", h2);
    let (status, _) = call(&fx, "POST", &path, "", Some(&fx.bob), &[]).await;
    assert_eq!(status, 200);
    assert_eq!(fx.store.content("bob", "bashrc", &h2).unwrap(), C2);

    let (status, body) = call(&fx, "POST", &path, "", Some(&fx.bob), &[]).await;
    assert_eq!(status, 400);
    let err: ErrorBody = serde_json::from_slice(&body).unwrap();
    assert!(err.error.contains("already exists"));
}

#[tokio::test]
async fn test_update_and_delete() {
    let fx = setup();
    let body = br#"{"alias":"bash","path":"~/.config/bashrc"}"#;
    let (status, _) = call(&fx, "PUT", "/alice/bashrc", "", Some(&fx.alice), body).await;
    assert_eq!(status, 204);
    assert_eq!(fx.store.file("alice", "bash").unwrap().path, "~/.config/bashrc");

    let (status, _) = call(&fx, "DELETE", "/alice/bash", "confirm=wrong", Some(&fx.alice), &[]).await;
    assert_eq!(status, 400);
    let (status, _) = call(&fx, "DELETE", "/alice/bash", "confirm=bash", Some(&fx.alice), &[]).await;
    assert_eq!(status, 204);
    assert!(fx.store.aliases("alice").unwrap().is_empty());
}
