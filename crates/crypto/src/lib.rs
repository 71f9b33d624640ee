use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Default lifetime of a signed access grant
pub const DEFAULT_GRANT_TTL_MINUTES: u64 = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GrantError {
    #[error("Signature expired")]
    Expired,
    #[error("Invalid signature")]
    InvalidSignature,
}

/// A self-contained, expiring capability for one resource.
/// Nothing about a grant is stored server-side; expiry is its only lifecycle bound.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedGrant {
    pub signature: String,
    pub expires: u64,
    pub principal_id: String,
}

/// Issues and checks HMAC-SHA256 grants over `resourceId:principalId:expiry`.
#[derive(Clone)]
pub struct SignatureService {
    secret: Vec<u8>,
}

impl SignatureService {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Issue a grant valid for `ttl_minutes` from now
    pub fn generate(&self, resource_id: &str, principal_id: &str, ttl_minutes: u64) -> SignedGrant {
        self.generate_at(resource_id, principal_id, ttl_minutes, now_ms())
    }

    pub fn generate_at(
        &self,
        resource_id: &str,
        principal_id: &str,
        ttl_minutes: u64,
        now_ms: u64,
    ) -> SignedGrant {
        let expires = now_ms.saturating_add(ttl_minutes.saturating_mul(60_000));
        let signature = hex::encode(self.mac(resource_id, principal_id, expires).finalize().into_bytes());
        SignedGrant {
            signature,
            expires,
            principal_id: principal_id.to_string(),
        }
    }

    /// Check a grant against the current clock
    pub fn verify(
        &self,
        resource_id: &str,
        principal_id: &str,
        expires: u64,
        signature: &str,
    ) -> Result<(), GrantError> {
        self.verify_at(resource_id, principal_id, expires, signature, now_ms())
    }

    /// Expiry is checked before the signature, so an expired grant reports
    /// `Expired` even when it was also tampered with.
    pub fn verify_at(
        &self,
        resource_id: &str,
        principal_id: &str,
        expires: u64,
        signature: &str,
        now_ms: u64,
    ) -> Result<(), GrantError> {
        if now_ms > expires {
            return Err(GrantError::Expired);
        }
        // Only the lowercase encoding is issued; any other spelling is a different link
        if signature.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(GrantError::InvalidSignature);
        }
        let provided = hex::decode(signature).map_err(|_| GrantError::InvalidSignature)?;
        // verify_slice compares in constant time
        self.mac(resource_id, principal_id, expires)
            .verify_slice(&provided)
            .map_err(|_| GrantError::InvalidSignature)
    }

    fn mac(&self, resource_id: &str, principal_id: &str, expires: u64) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key size");
        mac.update(grant_message(resource_id, principal_id, expires).as_bytes());
        mac
    }
}

/// Canonical signed message for a grant
pub fn grant_message(resource_id: &str, principal_id: &str, expires: u64) -> String {
    format!("{}:{}:{}", resource_id, principal_id, expires)
}

/// Generate a random bearer token (hex, 32 bytes of entropy)
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Tokens are stored and looked up by their SHA-256 digest only
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.trim().as_bytes()))
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
