//! Signed retrieval references.
//!
//! A reference grants unauthenticated read access to one file until it
//! expires. The signature is HMAC-SHA256 over `download:{domain}:{id}:{expires}`
//! encoded as URL-safe base64 without padding.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use time::OffsetDateTime;

type HmacSha256 = Hmac<Sha256>;

/// Why a reference was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("link expired")]
    Expired,
    #[error("invalid signature")]
    Invalid,
}

/// Signs and verifies retrieval references with a shared secret.
#[derive(Clone)]
pub struct LinkSigner {
    key: Vec<u8>,
    ttl: Duration,
}

impl LinkSigner {
    pub fn new(secret: impl AsRef<[u8]>, ttl: Duration) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
            ttl,
        }
    }

    fn mac(&self, domain_id: i64, file_id: i64, expires: i64) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(format!("download:{domain_id}:{file_id}:{expires}").as_bytes());
        mac
    }

    /// Signature for a reference expiring at unix time `expires`.
    pub fn sign(&self, domain_id: i64, file_id: i64, expires: i64) -> String {
        URL_SAFE_NO_PAD.encode(self.mac(domain_id, file_id, expires).finalize().into_bytes())
    }

    /// Check a presented reference. Comparison is constant time.
    pub fn verify(
        &self,
        domain_id: i64,
        file_id: i64,
        expires: i64,
        signature: &str,
        now: OffsetDateTime,
    ) -> Result<(), SignatureError> {
        let presented = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| SignatureError::Invalid)?;
        self.mac(domain_id, file_id, expires)
            .verify_slice(&presented)
            .map_err(|_| SignatureError::Invalid)?;
        if now.unix_timestamp() > expires {
            return Err(SignatureError::Expired);
        }
        Ok(())
    }

    /// Relative URL of a fresh reference for a file.
    pub fn shared_url(&self, domain_id: i64, file_id: i64, now: OffsetDateTime) -> String {
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let expires = now.unix_timestamp().saturating_add(ttl);
        let signature = self.sign(domain_id, file_id, expires);
        format!("/v1/shared/{domain_id}/{file_id}?expires={expires}&signature={signature}")
    }
}

impl std::fmt::Debug for LinkSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkSigner")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
