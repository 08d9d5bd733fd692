//! Artifact Cache
//!
//! Three tiers keyed by request fingerprint:
//! - hot: small in-process LRU
//! - warm: larger in-process LRU fed by hot-tier evictions
//! - cold: compressed on-disk records, never evicted, survives restarts
//!
//! Reads fall through the tiers and promote what they find. Misses resolved
//! through [`ArtifactCache::get_or_compute`] run at most one computation per
//! fingerprint at a time; concurrent callers join the in-flight one.

pub mod disk;

pub use disk::{ColdStore, DiskUsage};

use crate::error::{BackendError, CacheError, StorageError};
use crate::fingerprint::Fingerprint;
use crate::validation::ValidationSummary;
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Generated text stored under its request fingerprint. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedArtifact {
    pub fingerprint: Fingerprint,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub validation: Option<ValidationSummary>,
}

impl CachedArtifact {
    pub fn new(
        fingerprint: Fingerprint,
        text: String,
        validation: Option<ValidationSummary>,
    ) -> Self {
        let size_bytes = text.len() as u64;
        Self {
            fingerprint,
            text,
            created_at: Utc::now(),
            size_bytes,
            validation,
        }
    }
}

/// Cache sizing, from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_hot_capacity")]
    pub hot_capacity: usize,
    #[serde(default = "default_warm_capacity")]
    pub warm_capacity: usize,
    /// gzip level for cold records (0-9)
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
}

fn default_hot_capacity() -> usize {
    2048
}

fn default_warm_capacity() -> usize {
    16384
}

fn default_compression_level() -> u32 {
    6
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hot_capacity: default_hot_capacity(),
            warm_capacity: default_warm_capacity(),
            compression_level: default_compression_level(),
        }
    }
}

/// Where a resolved artifact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Hot,
    Warm,
    Cold,
    /// This caller ran the computation.
    Computed,
    /// This caller waited on another caller's computation.
    Joined,
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub artifact: Arc<CachedArtifact>,
    pub origin: Origin,
    /// False when the cold-tier write failed; the artifact is still usable.
    pub durable: bool,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hot_hits: u64,
    pub warm_hits: u64,
    pub cold_hits: u64,
    pub misses: u64,
    pub computes: u64,
    pub joins: u64,
    pub disk_write_failures: u64,
    pub hot_len: usize,
    pub warm_len: usize,
}

#[derive(Default)]
struct Counters {
    hot_hits: AtomicU64,
    warm_hits: AtomicU64,
    cold_hits: AtomicU64,
    misses: AtomicU64,
    computes: AtomicU64,
    joins: AtomicU64,
    disk_write_failures: AtomicU64,
}

type Waiter = oneshot::Sender<Result<Resolved, CacheError>>;

/// Three-tier artifact cache with single-flight computation.
///
/// Lock order: in-flight registry, then hot tier, then warm tier.
pub struct ArtifactCache {
    hot: Mutex<LruCache<Fingerprint, Arc<CachedArtifact>>>,
    warm: Mutex<LruCache<Fingerprint, Arc<CachedArtifact>>>,
    cold: ColdStore,
    in_flight: Mutex<HashMap<Fingerprint, Vec<Waiter>>>,
    counters: Counters,
}

impl ArtifactCache {
    pub fn open<P: AsRef<Path>>(root: P, config: &CacheConfig) -> Result<Self, StorageError> {
        let cold = ColdStore::new(root, config.compression_level)?;
        Ok(Self::with_cold_store(cold, config))
    }

    pub fn with_cold_store(cold: ColdStore, config: &CacheConfig) -> Self {
        Self {
            hot: Mutex::new(LruCache::new(capacity(config.hot_capacity))),
            warm: Mutex::new(LruCache::new(capacity(config.warm_capacity))),
            cold,
            in_flight: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    pub fn cold_store(&self) -> &ColdStore {
        &self.cold
    }

    /// Look an artifact up in every tier, promoting on hit.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<CachedArtifact>> {
        self.lookup(fingerprint).map(|resolved| resolved.artifact)
    }

    /// Write through all three tiers.
    ///
    /// The in-memory tiers are always updated; a cold-tier failure is
    /// returned as [`CacheError::Storage`].
    pub fn put(&self, fingerprint: Fingerprint, artifact: CachedArtifact) -> Result<(), CacheError> {
        if artifact.fingerprint != fingerprint {
            return Err(StorageError::FingerprintMismatch {
                expected: fingerprint,
                actual: artifact.fingerprint,
            }
            .into());
        }
        self.put_arc(Arc::new(artifact))
    }

    /// Resolve `fingerprint`, running `compute` on a miss.
    ///
    /// At most one `compute` runs per fingerprint at any time: callers that
    /// arrive while a computation is in flight wait for its result instead.
    /// A failed computation caches nothing, clears the in-flight marker and is
    /// delivered to every waiter.
    pub async fn get_or_compute<F, Fut>(
        &self,
        fingerprint: Fingerprint,
        compute: F,
    ) -> Result<Resolved, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedArtifact, BackendError>>,
    {
        if let Some(hit) = self.lookup(&fingerprint) {
            return Ok(hit);
        }

        let waiter = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get_mut(&fingerprint) {
                Some(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                None => {
                    // A leader may have finished between the tier lookup and taking the lock.
                    if let Some(hit) = self.memory_lookup(&fingerprint) {
                        return Ok(hit);
                    }
                    in_flight.insert(fingerprint, Vec::new());
                    None
                }
            }
        };

        if let Some(rx) = waiter {
            self.counters.joins.fetch_add(1, Ordering::Relaxed);
            debug!(fingerprint = %fingerprint.short(), "Joining in-flight computation");
            return match rx.await {
                Ok(result) => result,
                Err(_) => Err(CacheError::Abandoned(fingerprint)),
            };
        }

        let guard = InFlightGuard {
            cache: self,
            fingerprint,
            armed: true,
        };
        self.counters.computes.fetch_add(1, Ordering::Relaxed);
        debug!(fingerprint = %fingerprint.short(), "Computing artifact");

        let result = match compute().await {
            Ok(artifact) if artifact.fingerprint != fingerprint => Err(CacheError::from(
                StorageError::FingerprintMismatch {
                    expected: fingerprint,
                    actual: artifact.fingerprint,
                },
            )),
            Ok(artifact) => {
                let artifact = Arc::new(artifact);
                let durable = match self.put_arc(artifact.clone()) {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(
                            fingerprint = %fingerprint.short(),
                            error = %err,
                            "Cold-tier write failed; continuing with in-memory artifact"
                        );
                        false
                    }
                };
                Ok(Resolved {
                    artifact,
                    origin: Origin::Computed,
                    durable,
                })
            }
            Err(err) => Err(CacheError::Compute(err)),
        };

        guard.finish(&result);
        result
    }

    /// Record count and bytes of the cold tier.
    pub fn disk_usage(&self) -> Result<DiskUsage, StorageError> {
        self.cold.usage()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hot_hits: self.counters.hot_hits.load(Ordering::Relaxed),
            warm_hits: self.counters.warm_hits.load(Ordering::Relaxed),
            cold_hits: self.counters.cold_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            computes: self.counters.computes.load(Ordering::Relaxed),
            joins: self.counters.joins.load(Ordering::Relaxed),
            disk_write_failures: self.counters.disk_write_failures.load(Ordering::Relaxed),
            hot_len: self.hot.lock().len(),
            warm_len: self.warm.lock().len(),
        }
    }

    fn lookup(&self, fingerprint: &Fingerprint) -> Option<Resolved> {
        if let Some(hit) = self.memory_lookup(fingerprint) {
            return Some(hit);
        }

        match self.cold.get(fingerprint) {
            Ok(Some(artifact)) => {
                self.counters.cold_hits.fetch_add(1, Ordering::Relaxed);
                let artifact = Arc::new(artifact);
                self.warm.lock().put(*fingerprint, artifact.clone());
                self.insert_hot(*fingerprint, artifact.clone());
                Some(Resolved {
                    artifact,
                    origin: Origin::Cold,
                    durable: true,
                })
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(err) => {
                warn!(
                    fingerprint = %fingerprint.short(),
                    error = %err,
                    "Unreadable cold-tier record, treating as a miss"
                );
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn memory_lookup(&self, fingerprint: &Fingerprint) -> Option<Resolved> {
        if let Some(artifact) = self.hot.lock().get(fingerprint).cloned() {
            self.counters.hot_hits.fetch_add(1, Ordering::Relaxed);
            return Some(Resolved {
                artifact,
                origin: Origin::Hot,
                durable: true,
            });
        }

        let warm_hit = self.warm.lock().get(fingerprint).cloned();
        warm_hit.map(|artifact| {
            self.counters.warm_hits.fetch_add(1, Ordering::Relaxed);
            self.insert_hot(*fingerprint, artifact.clone());
            Resolved {
                artifact,
                origin: Origin::Warm,
                durable: true,
            }
        })
    }

    /// Insert into the hot tier; whatever it evicts moves to the warm tier.
    fn insert_hot(&self, fingerprint: Fingerprint, artifact: Arc<CachedArtifact>) {
        let evicted = self.hot.lock().push(fingerprint, artifact);
        if let Some((evicted_key, evicted_value)) = evicted {
            if evicted_key != fingerprint {
                self.warm.lock().put(evicted_key, evicted_value);
            }
        }
    }

    fn put_arc(&self, artifact: Arc<CachedArtifact>) -> Result<(), CacheError> {
        let fingerprint = artifact.fingerprint;
        self.insert_hot(fingerprint, artifact.clone());
        self.warm.lock().put(fingerprint, artifact.clone());
        self.cold.store(&artifact).map_err(|err| {
            self.counters
                .disk_write_failures
                .fetch_add(1, Ordering::Relaxed);
            CacheError::from(err)
        })
    }
}

fn capacity(requested: usize) -> NonZeroUsize {
    NonZeroUsize::new(requested.max(1)).unwrap_or(NonZeroUsize::MIN)
}

/// Clears the in-flight marker for a fingerprint, even if the leader is dropped mid-computation.
struct InFlightGuard<'a> {
    cache: &'a ArtifactCache,
    fingerprint: Fingerprint,
    armed: bool,
}

impl InFlightGuard<'_> {
    fn finish(mut self, result: &Result<Resolved, CacheError>) {
        self.armed = false;
        let waiters = self
            .cache
            .in_flight
            .lock()
            .remove(&self.fingerprint)
            .unwrap_or_default();
        for waiter in waiters {
            let shared = result.clone().map(|resolved| Resolved {
                origin: Origin::Joined,
                ..resolved
            });
            let _ = waiter.send(shared);
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            // Dropping the senders wakes waiters with an abandoned computation.
            self.cache.in_flight.lock().remove(&self.fingerprint);
        }
    }
}
