// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Policy Sync Service
//!
//! Turns one feed request into a verified [`PolicyUpdate`]:
//! fetch (bounded) → split envelope → verify canonical payload → decode.
//! Nothing reaches the policy graph unless the signature checks out.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::capabilities::{FeedError, PolicyFeed, SignatureVerifier};
use crate::domain::policy_graph::PolicyUpdate;
use crate::infrastructure::feed_codec::UpdateEnvelope;

pub struct PolicySyncService {
    feed: Arc<dyn PolicyFeed>,
    verifier: Arc<dyn SignatureVerifier>,
    algorithm: String,
    public_key: Option<String>,
    fetch_timeout: Duration,
}

impl PolicySyncService {
    pub fn new(
        feed: Arc<dyn PolicyFeed>,
        verifier: Arc<dyn SignatureVerifier>,
        algorithm: impl Into<String>,
        public_key: Option<String>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            feed,
            verifier,
            algorithm: algorithm.into(),
            public_key,
            fetch_timeout,
        }
    }

    /// Fetch every authority changed after `since`.
    pub async fn fetch_update(&self, since: i64) -> Result<PolicyUpdate, FeedError> {
        let blob = tokio::time::timeout(self.fetch_timeout, self.feed.fetch(since))
            .await
            .map_err(|_| FeedError::Timeout(self.fetch_timeout))??;

        debug!(since, bytes = blob.len(), "Received policy update blob");
        let envelope = UpdateEnvelope::decode(&blob)?;
        self.verify(&envelope)?;
        envelope.into_update()
    }

    fn verify(&self, envelope: &UpdateEnvelope) -> Result<(), FeedError> {
        let public_key = self.public_key.as_deref().ok_or(FeedError::MissingPublicKey)?;

        if let Some(claimed) = envelope.algorithm.as_deref() {
            if claimed != self.algorithm {
                warn!(claimed, expected = %self.algorithm, "Update names an unexpected signature algorithm");
                return Err(FeedError::SignatureRejected {
                    algorithm: claimed.to_string(),
                });
            }
        }

        let Some(signature) = envelope.signature.as_deref() else {
            return Err(FeedError::SignatureRejected {
                algorithm: "none".to_string(),
            });
        };

        if self
            .verifier
            .verify(&envelope.payload, signature, &self.algorithm, public_key)
        {
            Ok(())
        } else {
            Err(FeedError::SignatureRejected {
                algorithm: self.algorithm.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::feed_codec::canonical_payload;
    use crate::infrastructure::signature::{CryptoSignatureVerifier, ED25519};
    use crate::infrastructure::simulation::ScriptedPolicyFeed;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use ed25519_dalek::{Signer, SigningKey};
    use rand_core::OsRng;
    use serde_json::{json, Value};

    fn authorities() -> Value {
        json!([{
            "id": "city",
            "timestamp": "7",
            "spaceList": [{
                "space": {"id": "z", "boundary": [
                    {"latitude": 0, "longitude": 0},
                    {"latitude": 0, "longitude": 2},
                    {"latitude": 2, "longitude": 2}
                ]},
                "restrictions": [{"permission": "CAMERA", "appId": "*"}]
            }]
        }])
    }

    fn signed_blob(key: &SigningKey, authorities: &Value) -> Vec<u8> {
        let payload = canonical_payload(authorities).unwrap();
        let signature = STANDARD.encode(key.sign(&payload).to_bytes());
        serde_json::to_vec(&json!({
            "signature": signature,
            "algorithm": ED25519,
            "authorities": authorities,
        }))
        .unwrap()
    }

    fn service(feed: Arc<ScriptedPolicyFeed>, key: &SigningKey) -> PolicySyncService {
        PolicySyncService::new(
            feed,
            Arc::new(CryptoSignatureVerifier::new()),
            ED25519,
            Some(STANDARD.encode(key.verifying_key().to_bytes())),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_verified_update_is_decoded() {
        let key = SigningKey::generate(&mut OsRng);
        let feed = Arc::new(ScriptedPolicyFeed::new());
        feed.push_blob(signed_blob(&key, &authorities()));

        let update = service(feed.clone(), &key).fetch_update(3).await.unwrap();
        assert_eq!(update.authorities.len(), 1);
        assert_eq!(update.authorities[0].timestamp, 7);
        assert_eq!(feed.requested_since(), vec![3]);
    }

    #[tokio::test]
    async fn test_tampered_update_is_rejected() {
        let key = SigningKey::generate(&mut OsRng);
        let mut blob: Value = serde_json::from_slice(&signed_blob(&key, &authorities())).unwrap();
        blob["authorities"][0]["spaceList"][0]["restrictions"][0]["permission"] = json!("LOCATION");

        let feed = Arc::new(ScriptedPolicyFeed::new());
        feed.push_blob(serde_json::to_vec(&blob).unwrap());

        let err = service(feed, &key).fetch_update(0).await.unwrap_err();
        assert!(matches!(err, FeedError::SignatureRejected { .. }));
    }

    #[tokio::test]
    async fn test_unsigned_or_wrong_algorithm_is_rejected() {
        let key = SigningKey::generate(&mut OsRng);
        let feed = Arc::new(ScriptedPolicyFeed::new());
        feed.push_blob(serde_json::to_vec(&json!({"authorities": authorities()})).unwrap());

        let mut foreign: Value = serde_json::from_slice(&signed_blob(&key, &authorities())).unwrap();
        foreign["algorithm"] = json!("SHA512withRSA");
        feed.push_blob(serde_json::to_vec(&foreign).unwrap());

        let service = service(feed, &key);
        assert!(matches!(
            service.fetch_update(0).await,
            Err(FeedError::SignatureRejected { algorithm }) if algorithm == "none"
        ));
        assert!(matches!(
            service.fetch_update(0).await,
            Err(FeedError::SignatureRejected { algorithm }) if algorithm == "SHA512withRSA"
        ));
    }

    #[tokio::test]
    async fn test_missing_key_and_transport_failure() {
        let key = SigningKey::generate(&mut OsRng);
        let feed = Arc::new(ScriptedPolicyFeed::new());
        feed.push_blob(signed_blob(&key, &authorities()));
        feed.push_failure("connection refused");

        let keyless = PolicySyncService::new(
            feed,
            Arc::new(CryptoSignatureVerifier::new()),
            ED25519,
            None,
            Duration::from_secs(1),
        );
        assert!(matches!(keyless.fetch_update(0).await, Err(FeedError::MissingPublicKey)));
        assert!(matches!(keyless.fetch_update(0).await, Err(FeedError::Transport(_))));
    }
}
