// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Operator position override used for field testing.
//!
//! The endpoint answers `{"status": "inactive"}` when no override is set, or
//! `{"status": "active", "latitude", "longitude", "altitude"}` otherwise.
//! Coordinates may be JSON numbers or decimal strings.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::domain::capabilities::{DebugPositionFeed, FeedError};
use crate::domain::geometry::Coordinate;
use crate::infrastructure::feed_codec::Scalar;

pub struct HttpDebugPositionFeed {
    url: String,
    timeout: Duration,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct OverrideResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    latitude: Option<Scalar>,
    #[serde(default)]
    longitude: Option<Scalar>,
    #[serde(default)]
    altitude: Option<Scalar>,
}

fn coordinate_field(name: &str, value: Option<Scalar>) -> Result<f64, FeedError> {
    let value = value
        .ok_or_else(|| FeedError::Malformed(format!("position override has no '{}'", name)))?;
    value
        .to_finite_f64()
        .map_err(|e| FeedError::Malformed(format!("position override '{}': {}", name, e)))
}

/// Parse an override response body.
pub fn parse_override(body: &[u8]) -> Result<Option<Coordinate>, FeedError> {
    let response: OverrideResponse = serde_json::from_slice(body)
        .map_err(|e| FeedError::Malformed(format!("position override is not valid JSON: {}", e)))?;

    if response.status.as_deref() == Some("inactive") {
        return Ok(None);
    }

    let latitude = coordinate_field("latitude", response.latitude)?;
    let longitude = coordinate_field("longitude", response.longitude)?;
    let altitude = match response.altitude {
        None => 0.0,
        value => coordinate_field("altitude", value)?,
    };

    Ok(Some(Coordinate::new(latitude, longitude, altitude)))
}

impl HttpDebugPositionFeed {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            url: url.into(),
            timeout,
            client,
        })
    }
}

#[async_trait]
impl DebugPositionFeed for HttpDebugPositionFeed {
    async fn poll(&self) -> Result<Option<Coordinate>, FeedError> {
        let response = self.client.get(&self.url).send().await.map_err(|e| {
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

        let body = response
            .bytes()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;
        parse_override(&body)
    }
}
