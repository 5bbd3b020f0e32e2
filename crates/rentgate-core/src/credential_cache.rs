//! Compress-then-store credential cache over an injectable key/value backend.
//!
//! Values are serialized with `serde_json`, gzip-compressed and handed to a
//! [`CacheBackend`]. Reads reverse the chain and fail open: an absent key, a
//! backend fault, corrupt compressed bytes or a payload of the wrong shape all
//! read as a miss.
//!
//! With single-flight enabled, concurrent misses on the same key queue behind a
//! per-key async lock and re-check the cache once they hold it, so only the
//! first caller performs the upstream load.

use std::collections::HashMap;
use std::future::Future;
use std::io::{Read, Write};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::{OwnedMutexGuard, RwLock};

use crate::operation::{CredentialMaterial, SupplierEndpoint};

const KEY_PREFIX: &str = "rentgate:credential:";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to serialize cache value: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to compress cache value: {0}")]
    Compression(#[source] std::io::Error),

    #[error("cache ttl must be greater than zero")]
    ZeroTtl,

    #[error("cache backend failure: {0}")]
    Backend(String),
}

pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Expiring key/value storage the credential cache writes through.
pub trait CacheBackend: Send + Sync {
    fn store<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl: Duration) -> CacheFuture<'a, ()>;

    fn fetch<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<Vec<u8>>>;
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    bytes: Vec<u8>,
    expires_at: Instant,
}

/// In-process backend; expiry is checked on read and stale entries are purged lazily.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheBackend {
    entries: Arc<RwLock<HashMap<String, MemoryEntry>>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn purge_expired(&self) {
        let now = Instant::now();
        self.entries
            .write()
            .await
            .retain(|_, entry| entry.expires_at > now);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

impl CacheBackend for MemoryCacheBackend {
    fn store<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl: Duration) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            if ttl.is_zero() {
                return Err(CacheError::ZeroTtl);
            }
            let entry = MemoryEntry {
                bytes: value,
                expires_at: Instant::now() + ttl,
            };
            self.entries.write().await.insert(key.to_owned(), entry);
            Ok(())
        })
    }

    fn fetch<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            let expired = {
                let entries = self.entries.read().await;
                match entries.get(key) {
                    None => return Ok(None),
                    Some(entry) if Instant::now() < entry.expires_at => {
                        return Ok(Some(entry.bytes.clone()));
                    }
                    Some(_) => true,
                }
            };

            if expired {
                let mut entries = self.entries.write().await;
                if entries
                    .get(key)
                    .is_some_and(|entry| Instant::now() >= entry.expires_at)
                {
                    entries.remove(key);
                }
            }
            Ok(None)
        })
    }
}

/// A bearer token as held in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCredential {
    pub token: String,
    pub key: String,
    pub ttl: Duration,
}

/// Derives the cache key for one endpoint/credential pair.
///
/// The key is a pure function of both inputs, so two tenants or two
/// environments never share an entry.
pub fn credential_cache_key(endpoint: &SupplierEndpoint, material: &CredentialMaterial) -> String {
    let mut hasher = Sha256::new();
    hasher.update(endpoint.as_str().as_bytes());
    hasher.update([0_u8]);
    hasher.update(material.fingerprint().as_bytes());
    format!("{KEY_PREFIX}{}", hex::encode(hasher.finalize()))
}

#[derive(Debug, Default)]
struct FlightLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

struct FlightGuard {
    locks: Arc<FlightLocks>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self
            .locks
            .locks
            .lock()
            .expect("single-flight lock table is not poisoned");
        // Only the table still references the lock once nobody is queued on it.
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

impl FlightLocks {
    async fn acquire(self: &Arc<Self>, key: &str) -> FlightGuard {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .expect("single-flight lock table is not poisoned");
            Arc::clone(locks.entry(key.to_owned()).or_default())
        };
        let guard = lock.lock_owned().await;
        FlightGuard {
            locks: Arc::clone(self),
            key: key.to_owned(),
            guard: Some(guard),
        }
    }
}

/// Cache-aside front end over a [`CacheBackend`].
#[derive(Clone)]
pub struct CredentialCache {
    backend: Arc<dyn CacheBackend>,
    flights: Option<Arc<FlightLocks>>,
}

impl std::fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCache")
            .field("single_flight", &self.flights.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new(Arc::new(MemoryCacheBackend::new()))
    }
}

impl CredentialCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            flights: None,
        }
    }

    /// Collapses concurrent misses for one key into a single load.
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.flights = enabled.then(|| Arc::new(FlightLocks::default()));
        self
    }

    pub fn single_flight(&self) -> bool {
        self.flights.is_some()
    }

    pub async fn store<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let json = serde_json::to_vec(value)?;
        let compressed = compress(&json).map_err(CacheError::Compression)?;
        self.backend.store(key, compressed, ttl).await
    }

    /// Returns the cached value, or `None` on any failure along the read chain.
    pub async fn fetch<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.backend.fetch(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::debug!(%key, "credential cache miss");
                return None;
            }
            Err(error) => {
                tracing::warn!(%key, %error, "credential cache backend read failed; treating as miss");
                return None;
            }
        };

        let json = match decompress(&bytes) {
            Ok(json) => json,
            Err(error) => {
                tracing::warn!(%key, %error, "credential cache entry is not valid gzip; treating as miss");
                return None;
            }
        };

        match serde_json::from_slice(&json) {
            Ok(value) => {
                tracing::debug!(%key, "credential cache hit");
                Some(value)
            }
            Err(error) => {
                tracing::warn!(%key, %error, "credential cache entry failed to decode; treating as miss");
                None
            }
        }
    }

    /// Cache-aside read: on a miss, runs `load` and stores its value for the returned ttl.
    ///
    /// Store failures are logged and never fail the caller.
    pub async fn fetch_or_load<T, E, F, Fut>(&self, key: &str, load: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(T, Duration), E>>,
    {
        if let Some(value) = self.fetch(key).await {
            return Ok(value);
        }

        let _flight = match &self.flights {
            Some(flights) => {
                let guard = flights.acquire(key).await;
                if let Some(value) = self.fetch(key).await {
                    return Ok(value);
                }
                Some(guard)
            }
            None => None,
        };

        let (value, ttl) = load().await?;
        if ttl.is_zero() {
            tracing::debug!(%key, "loaded value has no lifetime; not caching");
        } else if let Err(error) = self.store(key, &value, ttl).await {
            tracing::warn!(%key, %error, "failed to store credential in cache");
        }
        Ok(value)
    }
}

fn compress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

fn decompress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
