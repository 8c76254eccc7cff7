// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use rsa::pkcs1v15;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use sha2::{Sha256, Sha512};
use tracing::debug;

use crate::domain::capabilities::SignatureVerifier;

pub const ED25519: &str = "Ed25519";
pub const SHA256_WITH_RSA: &str = "SHA256withRSA";
pub const SHA512_WITH_RSA: &str = "SHA512withRSA";

/// Verifies policy update signatures with Ed25519 or PKCS#1 v1.5 RSA.
///
/// Ed25519 keys are base64-encoded raw 32-byte keys. RSA keys are SPKI,
/// either PEM or base64 DER.
#[derive(Debug, Default, Clone, Copy)]
pub struct CryptoSignatureVerifier;

impl CryptoSignatureVerifier {
    pub fn new() -> Self {
        Self
    }

    fn verify_ed25519(message: &[u8], signature: &[u8], public_key: &str) -> Result<(), String> {
        let key_bytes = STANDARD
            .decode(public_key.trim())
            .map_err(|e| format!("invalid base64 public key: {}", e))?;
        let key_bytes: [u8; 32] = key_bytes
            .try_into()
            .map_err(|_| "invalid public key length (must be 32 bytes)".to_string())?;
        let verifying_key =
            VerifyingKey::from_bytes(&key_bytes).map_err(|e| format!("invalid public key: {}", e))?;

        let sig_bytes: [u8; 64] = signature
            .try_into()
            .map_err(|_| "invalid signature length (must be 64 bytes)".to_string())?;
        let signature = Signature::from_bytes(&sig_bytes);

        verifying_key
            .verify(message, &signature)
            .map_err(|e| format!("signature verification failed: {}", e))
    }

    fn rsa_public_key(public_key: &str) -> Result<RsaPublicKey, String> {
        let trimmed = public_key.trim();
        if trimmed.starts_with("-----BEGIN") {
            RsaPublicKey::from_public_key_pem(trimmed).map_err(|e| format!("invalid PEM public key: {}", e))
        } else {
            let der = STANDARD
                .decode(trimmed)
                .map_err(|e| format!("invalid base64 public key: {}", e))?;
            RsaPublicKey::from_public_key_der(&der).map_err(|e| format!("invalid DER public key: {}", e))
        }
    }

    fn verify_rsa(message: &[u8], signature: &[u8], algorithm: &str, public_key: &str) -> Result<(), String> {
        let key = Self::rsa_public_key(public_key)?;
        let signature = pkcs1v15::Signature::try_from(signature)
            .map_err(|e| format!("invalid RSA signature: {}", e))?;
        let outcome = if algorithm == SHA256_WITH_RSA {
            pkcs1v15::VerifyingKey::<Sha256>::new(key).verify(message, &signature)
        } else {
            pkcs1v15::VerifyingKey::<Sha512>::new(key).verify(message, &signature)
        };
        outcome.map_err(|e| format!("signature verification failed: {}", e))
    }
}

impl SignatureVerifier for CryptoSignatureVerifier {
    fn verify(&self, message: &[u8], signature: &[u8], algorithm: &str, public_key: &str) -> bool {
        let result = match algorithm {
            ED25519 => Self::verify_ed25519(message, signature, public_key),
            SHA256_WITH_RSA | SHA512_WITH_RSA => Self::verify_rsa(message, signature, algorithm, public_key),
            other => Err(format!("unsupported algorithm '{}'", other)),
        };

        match result {
            Ok(()) => true,
            Err(reason) => {
                debug!(algorithm, reason = %reason, "Update signature rejected");
                false
            }
        }
    }
}
