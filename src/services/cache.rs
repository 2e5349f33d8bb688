//! Response cache for idempotent reads.
//!
//! Entries are keyed by a SHA-256 fingerprint of the request shape. When an
//! `Authorization` header is present its credential is hashed into the key,
//! so personalized responses never leak across users. Only 2xx responses to
//! safe-read requests are stored; store failures downgrade to a pass-through
//! with `X-Cache: ERROR`.

use crate::models::settings::CacheSettings;
use crate::services::store::SharedStore;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// A captured upstream response, stored verbatim so a hit is byte-identical
/// to what the upstream originally returned.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(with = "body_encoding")]
    pub body: Vec<u8>,
}

mod body_encoding {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(CachedResponse),
    Miss,
    /// Store unreachable; the request proceeds uncached.
    Error,
}

pub struct ResponseCache {
    store: Arc<dyn SharedStore>,
    ttl_ms: u64,
    enabled: bool,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn SharedStore>, settings: &CacheSettings) -> Self {
        Self {
            store,
            ttl_ms: settings.ttl_ms,
            enabled: settings.enabled,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Deterministic cache key: SHA-256 over method, canonical path, sorted
    /// query, and (when present) a hash of the bearer credential.
    pub fn fingerprint(method: &str, path: &str, query: &str, credential: Option<&str>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(method.as_bytes());
        hasher.update(b"|");
        hasher.update(path.as_bytes());
        hasher.update(b"|");
        hasher.update(crate::utils::path::canonical_query(query).as_bytes());
        if let Some(credential) = credential {
            let credential_hash = Sha256::digest(credential.as_bytes());
            hasher.update(b"|");
            hasher.update(hex::encode(credential_hash).as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    pub async fn lookup(&self, fingerprint: &str) -> CacheLookup {
        let key = cache_key(fingerprint);
        match self.store.get(&key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<CachedResponse>(&bytes) {
                Ok(entry) => CacheLookup::Hit(entry),
                Err(e) => {
                    // Corrupt entries are evicted and treated as a miss.
                    warn!("evicting corrupt cache entry {}: {}", key, e);
                    let _ = self.store.delete(&key).await;
                    CacheLookup::Miss
                }
            },
            Ok(None) => CacheLookup::Miss,
            Err(e) => {
                warn!("cache lookup failed ({}), proceeding uncached", e);
                CacheLookup::Error
            }
        }
    }

    /// Stores a captured 2xx response. Returns false when the write failed;
    /// the response is still served.
    pub async fn store_response(&self, fingerprint: &str, response: &CachedResponse) -> bool {
        let key = cache_key(fingerprint);
        let bytes = match serde_json::to_vec(response) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("cache serialization failed for {}: {}", key, e);
                return false;
            }
        };

        match self.store.put(&key, &bytes, self.ttl_ms).await {
            Ok(()) => {
                debug!("cached {} ({} bytes)", key, bytes.len());
                true
            }
            Err(e) => {
                warn!("cache store failed ({}), response served uncached", e);
                false
            }
        }
    }
}

fn cache_key(fingerprint: &str) -> String {
    format!("cache:{}", fingerprint)
}
