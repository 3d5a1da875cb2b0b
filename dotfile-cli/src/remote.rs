//! HTTP remote for the sync coordinator.
//!
//! Talks to a dotfile server's `/api/v1` endpoints. Error responses carry
//! an [`ErrorBody`] that is mapped back onto the core error so conflicts and
//! unknown aliases keep their kind across the network.

use async_trait::async_trait;
use dotfile_core::{
    ContentHash, Error, ErrorBody, FileSummary, PushRequest, Remote, RemoteFile, Result,
    TransferCommit,
};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize)]
struct HeadResponse {
    head: ContentHash,
}

/// HTTP client scoped to one user's namespace on a dotfile server
pub struct HttpRemote {
    base_url: Url,
    username: String,
    credentials: Option<(String, String)>,
    http: reqwest::Client,
}

impl HttpRemote {
    /// Create a client for `username`'s files on the server at `base_url`.
    /// `credentials` (username, token) are sent with every request.
    pub fn new(base_url: &str, username: &str, credentials: Option<(String, String)>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Remote(format!("invalid remote url {:?}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Remote(format!("invalid remote url {:?}", base_url.as_str())));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Remote(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            base_url,
            username: username.to_string(),
            credentials,
            http,
        })
    }

    /// `/api/v1/{user}/{segments..}` with every segment percent-encoded
    fn url(&self, user: &str, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Remote(format!("invalid remote url {:?}", self.base_url.as_str())))?
            .pop_if_empty()
            .extend(["api", "v1", user])
            .extend(segments);
        Ok(url)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((user, token)) => builder.basic_auth(user, Some(token)),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        let resp = self
            .authed(builder)
            .send()
            .await
            .map_err(|e| Error::Remote(format!("{} failed: {}", what, e)))?;
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let body = resp.bytes().await.unwrap_or_default();
        tracing::debug!("{} returned {}", what, status);
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Remote(
                "authentication failed, check `dotfile config username` and `dotfile config token`".into(),
            ));
        }
        match serde_json::from_slice::<ErrorBody>(&body) {
            Ok(err) => Err(err.into_error()),
            Err(_) => Err(Error::Remote(format!(
                "{} failed ({}): {}",
                what,
                status,
                String::from_utf8_lossy(&body)
            ))),
        }
    }

    async fn json<T: serde::de::DeserializeOwned>(resp: Response, what: &str) -> Result<T> {
        resp.json()
            .await
            .map_err(|e| Error::Remote(format!("failed to parse {} response: {}", what, e)))
    }
}

#[async_trait]
impl Remote for HttpRemote {
    async fn aliases(&self) -> Result<Vec<String>> {
        let url = self.url(&self.username, &[])?;
        let resp = self.send(self.http.get(url), "list files").await?;
        let files: Vec<FileSummary> = Self::json(resp, "list files").await?;
        Ok(files.into_iter().map(|f| f.alias).collect())
    }

    async fn file(&self, alias: &str) -> Result<Option<RemoteFile>> {
        let url = self.url(&self.username, &[alias])?;
        match self.send(self.http.get(url), "get file").await {
            Ok(resp) => Ok(Some(Self::json(resp, "get file").await?)),
            Err(Error::NotTracked(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn commits_after(&self, alias: &str, after: Option<&ContentHash>) -> Result<Vec<TransferCommit>> {
        let mut url = self.url(&self.username, &[alias, "commits"])?;
        if let Some(after) = after {
            url.query_pairs_mut().append_pair("after", &after.to_hex());
        }
        let resp = self.send(self.http.get(url), "get commits").await?;
        Self::json(resp, "get commits").await
    }

    async fn append(&self, alias: &str, request: &PushRequest) -> Result<ContentHash> {
        let url = self.url(&self.username, &[alias, "commits"])?;
        let resp = self.send(self.http.post(url).json(request), "push").await?;
        let head: HeadResponse = Self::json(resp, "push").await?;
        Ok(head.head)
    }

    async fn content(&self, alias: &str, hash: &ContentHash) -> Result<Vec<u8>> {
        let hex = hash.to_hex();
        let url = self.url(&self.username, &[alias, hex.as_str(), "raw"])?;
        let resp = self.send(self.http.get(url), "get content").await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::Remote(format!("failed to read content: {}", e)))?;
        Ok(bytes.to_vec())
    }

    async fn fork(&self, owner: &str, alias: &str, hash: &ContentHash) -> Result<ContentHash> {
        let hex = hash.to_hex();
        let url = self.url(owner, &[alias, hex.as_str(), "fork"])?;
        let resp = self.send(self.http.post(url), "fork").await?;
        let head: HeadResponse = Self::json(resp, "fork").await?;
        Ok(head.head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let remote = HttpRemote::new("http://localhost:8080/", "alice", None).unwrap();
        let url = remote.url("alice", &["bash rc", "commits"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/v1/alice/bash%20rc/commits");

        let remote = HttpRemote::new("https://example.com/dotfile", "bob", None).unwrap();
        let url = remote.url("bob", &[]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/dotfile/api/v1/bob");
    }

    #[test]
    fn test_invalid_url() {
        assert!(HttpRemote::new("not a url", "alice", None).is_err());
        assert!(HttpRemote::new("mailto:alice@example.com", "alice", None).is_err());
    }
}
