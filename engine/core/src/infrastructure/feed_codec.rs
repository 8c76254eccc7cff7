// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Policy Feed Codec
//!
//! Decodes the JSON update blob served by the policy server:
//!
//! ```text
//! { "signature": "<base64>", "algorithm": "Ed25519",
//!   "authorities": [ { "id", "timestamp", "spaceList": [ { "space", "restrictions", "delegations" } ] } ] }
//! ```
//!
//! The policy server emits numbers (timestamps and coordinates) as decimal
//! strings; both strings and JSON numbers are accepted.
//!
//! The signed message is the canonical serialization of the `authorities`
//! value: compact JSON with object keys in lexicographic order. Decoding into
//! the policy graph only happens through [`UpdateEnvelope::into_update`], which
//! callers invoke after the signature has been checked.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use crate::domain::capabilities::FeedError;
use crate::domain::geometry::{Coordinate, Polygon};
use crate::domain::policy_graph::{
    Authority, AuthorityUpdate, PolicyUpdate, Restriction, RestrictionEntry, Space, SpaceRecord,
};

/// Update blob split into its signature and the canonical signed message.
#[derive(Debug, Clone)]
pub struct UpdateEnvelope {
    /// Decoded signature bytes; `None` for unsigned snapshots.
    pub signature: Option<Vec<u8>>,
    /// Algorithm named by the blob, if any.
    pub algorithm: Option<String>,
    /// Canonical bytes the signature covers.
    pub payload: Vec<u8>,
    authorities: Value,
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    algorithm: Option<String>,
    authorities: Option<Value>,
}

impl UpdateEnvelope {
    pub fn decode(blob: &[u8]) -> Result<Self, FeedError> {
        let raw: RawEnvelope = serde_json::from_slice(blob)
            .map_err(|e| FeedError::Malformed(format!("update is not valid JSON: {}", e)))?;

        let authorities = raw
            .authorities
            .ok_or_else(|| FeedError::Malformed("update has no 'authorities' field".to_string()))?;
        if !authorities.is_array() {
            return Err(FeedError::Malformed("'authorities' must be an array".to_string()));
        }

        let signature = match raw.signature {
            Some(encoded) => Some(
                STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| FeedError::Malformed(format!("invalid base64 signature: {}", e)))?,
            ),
            None => None,
        };

        Ok(Self {
            signature,
            algorithm: raw.algorithm,
            payload: canonical_payload(&authorities)?,
            authorities,
        })
    }

    /// Convert the authorities into domain form. Any malformed or ambiguous
    /// entry rejects the whole update.
    pub fn into_update(self) -> Result<PolicyUpdate, FeedError> {
        let authorities: Vec<AuthorityDto> = serde_json::from_value(self.authorities)
            .map_err(|e| FeedError::Malformed(format!("invalid authority list: {}", e)))?;

        let authorities = authorities
            .into_iter()
            .map(AuthorityDto::into_domain)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PolicyUpdate { authorities })
    }
}

/// Compact JSON with lexicographically ordered object keys.
pub fn canonical_payload(authorities: &Value) -> Result<Vec<u8>, FeedError> {
    serde_json::to_vec(authorities).map_err(|e| FeedError::Malformed(e.to_string()))
}

/// A number the server may send either as JSON or as a decimal string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub(crate) enum Scalar {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Whole numbers only; floats must be integral and inside the `i64` range.
    pub(crate) fn to_i64(&self) -> Result<i64, String> {
        match self {
            Scalar::Integer(value) => Ok(*value),
            // i64::MAX as f64 rounds up to 2^63, hence the exclusive bound
            Scalar::Float(value)
                if value.fract() == 0.0 && *value >= i64::MIN as f64 && *value < i64::MAX as f64 =>
            {
                Ok(*value as i64)
            }
            Scalar::Float(value) => Err(format!("expected a 64-bit integer, got {}", value)),
            Scalar::Text(text) => text
                .trim()
                .parse()
                .map_err(|e| format!("expected a 64-bit integer, got {:?}: {}", text, e)),
        }
    }

    pub(crate) fn to_finite_f64(&self) -> Result<f64, String> {
        let value = match self {
            Scalar::Integer(value) => *value as f64,
            Scalar::Float(value) => *value,
            Scalar::Text(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|e| format!("expected a number, got {:?}: {}", text, e))?,
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err("coordinate must be finite".to_string())
        }
    }
}

fn flexible_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Scalar::deserialize(deserializer)?.to_i64().map_err(de::Error::custom)
}

fn flexible_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Scalar::deserialize(deserializer)?
        .to_finite_f64()
        .map_err(de::Error::custom)
}

fn flexible_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let id = match Scalar::deserialize(deserializer)? {
        Scalar::Integer(value) => value.to_string(),
        Scalar::Float(value) => value.to_string(),
        Scalar::Text(text) => text,
    };
    if id.is_empty() {
        Err(de::Error::custom("identifier cannot be empty"))
    } else {
        Ok(id)
    }
}

#[derive(Debug, Deserialize)]
struct AuthorityDto {
    #[serde(deserialize_with = "flexible_id")]
    id: String,
    #[serde(deserialize_with = "flexible_i64")]
    timestamp: i64,
    #[serde(rename = "spaceList", default)]
    space_list: Vec<SpaceRecordDto>,
}

#[derive(Debug, Deserialize)]
struct SpaceRecordDto {
    space: SpaceDto,
    #[serde(default)]
    restrictions: Vec<RestrictionDto>,
    #[serde(default)]
    delegations: Vec<DelegationDto>,
}

#[derive(Debug, Deserialize)]
struct SpaceDto {
    #[serde(deserialize_with = "flexible_id")]
    id: String,
    #[serde(default)]
    boundary: Vec<CoordinateDto>,
}

#[derive(Debug, Deserialize)]
struct CoordinateDto {
    #[serde(deserialize_with = "flexible_f64")]
    latitude: f64,
    #[serde(deserialize_with = "flexible_f64")]
    longitude: f64,
    #[serde(default, deserialize_with = "flexible_f64")]
    altitude: f64,
}

#[derive(Debug, Deserialize)]
struct RestrictionDto {
    permission: String,
    #[serde(rename = "appId")]
    app_id: String,
}

#[derive(Debug, Deserialize)]
struct DelegationDto {
    space: SpaceDto,
    #[serde(deserialize_with = "flexible_id")]
    delegator: String,
}

impl SpaceDto {
    fn into_domain(self) -> Space {
        let vertices = self
            .boundary
            .into_iter()
            .map(|c| Coordinate::new(c.latitude, c.longitude, c.altitude))
            .collect::<Vec<_>>();
        Space::new(self.id, Polygon::new(vertices))
    }
}

impl AuthorityDto {
    fn into_domain(self) -> Result<AuthorityUpdate, FeedError> {
        let mut records = Vec::with_capacity(self.space_list.len());
        for record in self.space_list {
            let mut domain = SpaceRecord::new(record.space.into_domain());
            for restriction in record.restrictions {
                let decoded = Restriction::from_wire(&self.id, &restriction.permission, &restriction.app_id)?;
                domain = domain.with_restriction(RestrictionEntry::new(self.id.clone(), decoded));
            }
            for delegation in record.delegations {
                domain = domain.with_delegation(delegation.space.into_domain(), delegation.delegator);
            }
            records.push(domain);
        }

        Ok(AuthorityUpdate {
            timestamp: self.timestamp,
            authority: Authority::new(self.id, records),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy_graph::PolicyGraphError;
    use serde_json::json;

    fn campus_update() -> Value {
        json!({
            "signature": STANDARD.encode(b"not-a-real-signature"),
            "algorithm": "Ed25519",
            "authorities": [{
                "id": "city",
                "timestamp": "1700000000",
                "spaceList": [{
                    "space": {
                        "id": "downtown",
                        "boundary": [
                            {"latitude": "0", "longitude": "0", "altitude": "0"},
                            {"latitude": "0", "longitude": "10", "altitude": "0"},
                            {"latitude": 10.0, "longitude": 10.0},
                            {"latitude": 10, "longitude": 0}
                        ]
                    },
                    "restrictions": [
                        {"permission": "CAMERA", "appId": "*"},
                        {"permission": "*", "appId": "com.example.chat"},
                        {"permission": "RECORD_AUDIO", "appId": "com.example.notes"}
                    ],
                    "delegations": [{
                        "space": {"id": "campus", "boundary": [
                            {"latitude": 1, "longitude": 1},
                            {"latitude": 1, "longitude": 2},
                            {"latitude": 2, "longitude": 2}
                        ]},
                        "delegator": "university"
                    }]
                }]
            }]
        })
    }

    #[test]
    fn test_decode_full_update() {
        let blob = serde_json::to_vec(&campus_update()).unwrap();
        let envelope = UpdateEnvelope::decode(&blob).unwrap();
        assert_eq!(envelope.signature.as_deref(), Some(&b"not-a-real-signature"[..]));
        assert_eq!(envelope.algorithm.as_deref(), Some("Ed25519"));

        let update = envelope.into_update().unwrap();
        assert_eq!(update.authorities.len(), 1);

        let city = &update.authorities[0];
        assert_eq!(city.timestamp, 1_700_000_000);
        assert_eq!(city.authority.id, "city");

        let record = &city.authority.records[0];
        assert_eq!(record.space.boundary.len(), 4);
        assert!(record.space.contains(&Coordinate::flat(5.0, 5.0)));

        let rendered: Vec<String> = record.restrictions.iter().map(|r| r.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "city-CAMERA-*",
                "city-*-com.example.chat",
                "city-RECORD_AUDIO-com.example.notes"
            ]
        );
        assert_eq!(record.delegations[0].delegate_authority_id, "university");
        assert_eq!(record.delegations[0].sub_space.id, "campus");
    }

    #[test]
    fn test_canonical_payload_sorts_keys() {
        let a = json!([{"timestamp": 1, "id": "x", "spaceList": []}]);
        let b: Value = serde_json::from_str(r#"[{"spaceList":[],"id":"x","timestamp":1}]"#).unwrap();
        let payload = canonical_payload(&a).unwrap();
        assert_eq!(payload, canonical_payload(&b).unwrap());
        assert_eq!(
            String::from_utf8(payload).unwrap(),
            r#"[{"id":"x","spaceList":[],"timestamp":1}]"#
        );
    }

    #[test]
    fn test_double_wildcard_rejects_update() {
        let mut update = campus_update();
        update["authorities"][0]["spaceList"][0]["restrictions"]
            .as_array_mut()
            .unwrap()
            .push(json!({"permission": "*", "appId": "*"}));

        let blob = serde_json::to_vec(&update).unwrap();
        let err = UpdateEnvelope::decode(&blob).unwrap().into_update().unwrap_err();
        assert!(matches!(
            err,
            FeedError::InvalidPolicy(PolicyGraphError::AmbiguousWildcard { .. })
        ));
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(matches!(
            UpdateEnvelope::decode(b"not json"),
            Err(FeedError::Malformed(_))
        ));
        assert!(matches!(
            UpdateEnvelope::decode(br#"{"signature": "AAAA"}"#),
            Err(FeedError::Malformed(_))
        ));
        assert!(matches!(
            UpdateEnvelope::decode(br#"{"signature": "%%%", "authorities": []}"#),
            Err(FeedError::Malformed(_))
        ));

        let bad_timestamp = json!({"authorities": [{"id": "a", "timestamp": "yesterday", "spaceList": []}]});
        let envelope = UpdateEnvelope::decode(&serde_json::to_vec(&bad_timestamp).unwrap()).unwrap();
        assert!(envelope.signature.is_none());
        assert!(matches!(envelope.into_update(), Err(FeedError::Malformed(_))));
    }

    #[test]
    fn test_timestamp_outside_i64_range_is_rejected() {
        for timestamp in [json!(1e300), json!(9.3e18), json!(9_300_000_000_000_000_000u64), json!(-1e19)] {
            let update = json!({"authorities": [{"id": "a", "timestamp": timestamp, "spaceList": []}]});
            let envelope = UpdateEnvelope::decode(&serde_json::to_vec(&update).unwrap()).unwrap();
            assert!(
                matches!(envelope.into_update(), Err(FeedError::Malformed(_))),
                "timestamp {} should be rejected",
                timestamp
            );
        }

        let update = json!({"authorities": [{"id": "a", "timestamp": 1.7e9, "spaceList": []}]});
        let envelope = UpdateEnvelope::decode(&serde_json::to_vec(&update).unwrap()).unwrap();
        assert_eq!(envelope.into_update().unwrap().authorities[0].timestamp, 1_700_000_000);
    }

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(Scalar::Text(" 42 ".to_string()).to_i64(), Ok(42));
        assert!(Scalar::Float(2.5).to_i64().is_err());
        assert!(Scalar::Float(i64::MAX as f64).to_i64().is_err());
        assert_eq!(Scalar::Float(-0.0).to_i64(), Ok(0));

        assert_eq!(Scalar::Text("-33.5".to_string()).to_finite_f64(), Ok(-33.5));
        assert!(Scalar::Text("NaN".to_string()).to_finite_f64().is_err());
        assert!(Scalar::Text("inf".to_string()).to_finite_f64().is_err());
        assert!(Scalar::Text("north".to_string()).to_finite_f64().is_err());
    }
}
