// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP Policy Feed
//!
//! Fetches signed policy deltas from the policy server.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Transport for [`PolicyFeed`]
//! - **Integration:** Policy server → raw update blob → policy sync service
//!
//! The delta endpoint is `GET {base_url}{updates_path}/{since}`; it returns
//! every authority whose timestamp is newer than `since`.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::domain::capabilities::{FeedError, PolicyFeed};
use crate::domain::engine_config::FeedConfig;

pub struct HttpPolicyFeed {
    base_url: String,
    updates_path: String,
    timeout: Duration,
    client: Client,
}

impl HttpPolicyFeed {
    pub fn new(base_url: impl Into<String>, updates_path: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            updates_path: updates_path.into(),
            timeout,
            client,
        })
    }

    pub fn from_config(config: &FeedConfig, timeout: Duration) -> Result<Self, FeedError> {
        Self::new(config.base_url.clone(), config.updates_path.clone(), timeout)
    }

    fn updates_url(&self, since: i64) -> String {
        let path = self.updates_path.trim_matches('/');
        if path.is_empty() {
            format!("{}/{}", self.base_url, since)
        } else {
            format!("{}/{}/{}", self.base_url, path, since)
        }
    }
}

#[async_trait]
impl PolicyFeed for HttpPolicyFeed {
    async fn fetch(&self, since: i64) -> Result<Vec<u8>, FeedError> {
        let url = self.updates_url(since);
        debug!(url = %url, since, "Fetching policy updates");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                FeedError::Timeout(self.timeout)
            } else {
                FeedError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FeedError::Timeout(self.timeout)
            } else {
                FeedError::Transport(e.to_string())
            }
        })?;

        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_updates_url() {
        let feed = HttpPolicyFeed::new("http://policy.local/", "/getDatabaseUpdates", Duration::from_secs(1)).unwrap();
        assert_eq!(feed.updates_url(0), "http://policy.local/getDatabaseUpdates/0");
        assert_eq!(feed.updates_url(1700000000), "http://policy.local/getDatabaseUpdates/1700000000");

        let bare = HttpPolicyFeed::new("http://policy.local", "", Duration::from_secs(1)).unwrap();
        assert_eq!(bare.updates_url(5), "http://policy.local/5");
    }

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/getDatabaseUpdates/42")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"authorities":[]}"#)
            .create_async()
            .await;

        let feed = HttpPolicyFeed::new(server.url(), "/getDatabaseUpdates", Duration::from_secs(5)).unwrap();
        let body = feed.fetch(42).await.unwrap();

        assert_eq!(body, br#"{"authorities":[]}"#.to_vec());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_maps_http_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/getDatabaseUpdates/0")
            .with_status(503)
            .create_async()
            .await;

        let feed = HttpPolicyFeed::new(server.url(), "/getDatabaseUpdates", Duration::from_secs(5)).unwrap();
        assert!(matches!(feed.fetch(0).await, Err(FeedError::Status(503))));
    }

    #[tokio::test]
    async fn test_fetch_unreachable_server() {
        let feed = HttpPolicyFeed::new("http://127.0.0.1:9", "/getDatabaseUpdates", Duration::from_secs(2)).unwrap();
        assert!(matches!(
            feed.fetch(0).await,
            Err(FeedError::Transport(_)) | Err(FeedError::Timeout(_))
        ));
    }
}
