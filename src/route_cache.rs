//! # Route Path Cache
//!
//! Memoizes walking paths so repeated lookups for the same route do not hit
//! the directions provider again.
//!
//! ## Keys
//!
//! - [`CacheKey::Route`] - a stable route identifier. Trusted as-is; callers
//!   invalidate it with [`RouteCache::remove`] when the waypoint set changes.
//! - [`CacheKey::Waypoints`] - an ordered coordinate list, fingerprinted by
//!   rounding every coordinate to 6 decimals. Lookups re-check the stored
//!   coordinates against the requested ones.
//!
//! ## Backends
//!
//! - **Memory**: a [`FifoCache`] bounded by `max_entries`, evicting the
//!   oldest-inserted entry first.
//! - **Persisted**: any [`KeyValueStore`]. Writes that fail are kept in an
//!   in-memory fallback instead. Every write triggers a maintenance pass
//!   that drops expired entries and trims stored plus fallback entries to
//!   `max_entries`.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::error::StorageError;
use crate::fifo_cache::FifoCache;
use crate::geo_utils::simplify_path;
use crate::storage::KeyValueStore;
use crate::Coordinate;

/// Prefix shared by every cache entry in persisted storage.
pub const KEY_PREFIX: &str = "route_";

/// Per-axis tolerance, in degrees, when comparing stored and requested waypoints.
pub const WAYPOINT_TOLERANCE_DEG: f64 = 1e-6;

/// Cache handle shared between the routing gateway and operational surfaces.
pub type SharedRouteCache = Arc<Mutex<RouteCache>>;

// ============================================================================
// Types
// ============================================================================

/// A computed walking path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPath {
    /// Walkable path geometry, denser than the waypoint list
    pub geometry: Vec<Coordinate>,
    /// Total distance in meters
    pub distance_meters: f64,
    /// Total walking time in seconds
    pub duration_seconds: f64,
    /// Unix timestamp in milliseconds when the entry was stored
    pub created_at: i64,
}

impl CachedPath {
    pub fn new(geometry: Vec<Coordinate>, distance_meters: f64, duration_seconds: f64) -> Self {
        Self {
            geometry,
            distance_meters,
            duration_seconds,
            created_at: 0,
        }
    }

    /// Geometry simplified for rendering (tolerance in degrees).
    pub fn simplified_geometry(&self, tolerance: f64) -> Vec<Coordinate> {
        simplify_path(&self.geometry, tolerance)
    }

    /// Compare everything except the timestamp.
    pub fn same_route(&self, other: &CachedPath) -> bool {
        self.geometry == other.geometry
            && self.distance_meters == other.distance_meters
            && self.duration_seconds == other.duration_seconds
    }
}

/// Identity under which a path is cached.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheKey {
    /// Stable route identifier
    Route(String),
    /// Exact ordered waypoint list
    Waypoints(Vec<Coordinate>),
}

impl CacheKey {
    pub fn route(id: impl Into<String>) -> Self {
        CacheKey::Route(id.into())
    }

    /// Storage key for this cache key, or `None` for an unroutable waypoint list.
    pub fn storage_key(&self) -> Option<String> {
        match self {
            CacheKey::Route(id) => Some(format!("{}id:{}", KEY_PREFIX, id)),
            CacheKey::Waypoints(coords) if coords.len() >= 2 => {
                Some(format!("{}wp:{}", KEY_PREFIX, fingerprint(coords)))
            }
            CacheKey::Waypoints(_) => None,
        }
    }
}

/// Fingerprint an ordered coordinate list (6 decimals, `|` separated).
pub fn fingerprint(coords: &[Coordinate]) -> String {
    coords
        .iter()
        .map(|c| format!("{:.6},{:.6}", c.latitude, c.longitude))
        .collect::<Vec<_>>()
        .join("|")
}

fn waypoints_match(a: &[Coordinate], b: &[Coordinate]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            (x.latitude - y.latitude).abs() < WAYPOINT_TOLERANCE_DEG
                && (x.longitude - y.longitude).abs() < WAYPOINT_TOLERANCE_DEG
        })
}

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry lifetime in milliseconds.
    /// Default: 30 minutes
    pub max_age_ms: u64,

    /// Maximum number of entries.
    /// Default: 100
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age_ms: 30 * 60 * 1000,
            max_entries: 100,
        }
    }
}

/// Cache statistics for the settings surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub oldest_entry_time: Option<i64>,
    pub newest_entry_time: Option<i64>,
}

/// What is actually stored per key.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    path: CachedPath,
    /// Waypoints the path was computed for (fingerprint keys only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    waypoints: Option<Vec<Coordinate>>,
}

enum Backend {
    Memory(FifoCache<String, StoredEntry>),
    Persisted {
        store: Box<dyn KeyValueStore>,
        fallback: FifoCache<String, StoredEntry>,
    },
}

// ============================================================================
// Route Cache
// ============================================================================

/// Path cache with expiration, bounded size and a pluggable backend.
pub struct RouteCache {
    config: CacheConfig,
    backend: Backend,
    clock: Arc<dyn Clock>,
}

impl RouteCache {
    /// Create an in-memory cache.
    pub fn new(config: CacheConfig) -> Self {
        let capacity = config.max_entries;
        Self {
            config,
            backend: Backend::Memory(FifoCache::new(capacity)),
            clock: Arc::new(SystemClock),
        }
    }

    /// Create a cache persisted in `store`.
    pub fn with_store(config: CacheConfig, store: Box<dyn KeyValueStore>) -> Self {
        let capacity = config.max_entries;
        Self {
            config,
            backend: Backend::Persisted {
                store,
                fallback: FifoCache::new(capacity),
            },
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Wrap the cache for sharing with a gateway.
    pub fn into_shared(self) -> SharedRouteCache {
        Arc::new(Mutex::new(self))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Current time according to the cache's clock.
    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    fn is_valid(&self, entry: &StoredEntry, now: i64) -> bool {
        now - entry.path.created_at < self.config.max_age_ms as i64
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Look up a path.
    ///
    /// Expired entries, corrupt entries, and fingerprint entries whose stored
    /// waypoints differ from the requested ones are deleted and reported as
    /// a miss.
    pub fn get(&mut self, key: &CacheKey) -> Option<CachedPath> {
        let storage_key = key.storage_key()?;
        let now = self.clock.now_millis();

        let entry = match self.read_entry(&storage_key) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                log::debug!("[RouteCache] Miss for {}", storage_key);
                return None;
            }
            Err(StorageError::Serialization(e)) => {
                log::warn!("[RouteCache] Dropping corrupt entry {}: {}", storage_key, e);
                self.delete(&storage_key);
                return None;
            }
            Err(e) => {
                log::warn!("[RouteCache] Failed to read {}: {}", storage_key, e);
                return None;
            }
        };

        if !self.is_valid(&entry, now) {
            log::debug!("[RouteCache] Expired entry {}", storage_key);
            self.delete(&storage_key);
            return None;
        }

        if let CacheKey::Waypoints(requested) = key {
            let matches = entry
                .waypoints
                .as_deref()
                .is_some_and(|stored| waypoints_match(requested, stored));
            if !matches {
                log::debug!("[RouteCache] Waypoint mismatch for {}", storage_key);
                self.delete(&storage_key);
                return None;
            }
        }

        log::debug!("[RouteCache] Hit for {}", storage_key);
        Some(entry.path)
    }

    fn read_entry(&self, storage_key: &str) -> Result<Option<StoredEntry>, StorageError> {
        match &self.backend {
            Backend::Memory(cache) => Ok(cache.get(&storage_key.to_string()).cloned()),
            Backend::Persisted { store, fallback } => match store.get(storage_key)? {
                Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
                None => Ok(fallback.get(&storage_key.to_string()).cloned()),
            },
        }
    }

    // ========================================================================
    // Storage
    // ========================================================================

    /// Store a path, replacing any previous entry for `key`.
    ///
    /// The entry is stamped with the current time; the input timestamp is
    /// ignored. Waypoint keys with fewer than 2 coordinates are not stored.
    /// Returns the path as stamped.
    pub fn set(&mut self, key: &CacheKey, path: CachedPath) -> CachedPath {
        let mut path = path;
        path.created_at = self.clock.now_millis();

        let Some(storage_key) = key.storage_key() else {
            return path;
        };

        let entry = StoredEntry {
            path: path.clone(),
            waypoints: match key {
                CacheKey::Waypoints(coords) => Some(coords.clone()),
                CacheKey::Route(_) => None,
            },
        };

        match &mut self.backend {
            Backend::Memory(cache) => {
                if let Some(evicted) = cache.insert(storage_key.clone(), entry) {
                    log::debug!("[RouteCache] Evicted oldest entry {}", evicted);
                }
            }
            Backend::Persisted { store, fallback } => {
                let written = serde_json::to_string(&entry)
                    .map_err(StorageError::from)
                    .and_then(|raw| store.set(&storage_key, &raw));

                match written {
                    Ok(()) => {
                        fallback.remove(&storage_key);
                    }
                    Err(e) => {
                        log::warn!(
                            "[RouteCache] Failed to persist {} ({}), keeping it in memory",
                            storage_key,
                            e
                        );
                        // The stored copy would shadow the fallback on reads
                        if let Err(e) = store.remove(&storage_key) {
                            log::warn!(
                                "[RouteCache] Failed to drop stale {}: {}",
                                storage_key,
                                e
                            );
                        }
                        fallback.insert(storage_key.clone(), entry);
                    }
                }
            }
        }
        log::debug!("[RouteCache] Stored {}", storage_key);

        if matches!(self.backend, Backend::Persisted { .. }) {
            self.cleanup();
        }
        path
    }

    /// Invalidate a single key.
    pub fn remove(&mut self, key: &CacheKey) {
        if let Some(storage_key) = key.storage_key() {
            self.delete(&storage_key);
        }
    }

    fn delete(&mut self, storage_key: &str) {
        match &mut self.backend {
            Backend::Memory(cache) => {
                cache.remove(&storage_key.to_string());
            }
            Backend::Persisted { store, fallback } => {
                fallback.remove(&storage_key.to_string());
                if let Err(e) = store.remove(storage_key) {
                    log::warn!("[RouteCache] Failed to delete {}: {}", storage_key, e);
                }
            }
        }
    }

    /// Remove every cache entry.
    pub fn clear(&mut self) {
        match &mut self.backend {
            Backend::Memory(cache) => cache.clear(),
            Backend::Persisted { store, fallback } => {
                fallback.clear();
                match store.keys() {
                    Ok(keys) => {
                        for key in keys.iter().filter(|k| k.starts_with(KEY_PREFIX)) {
                            if let Err(e) = store.remove(key) {
                                log::warn!("[RouteCache] Failed to delete {}: {}", key, e);
                            }
                        }
                    }
                    Err(e) => log::warn!("[RouteCache] Failed to clear cache: {}", e),
                }
            }
        }
        log::info!("[RouteCache] Cleared");
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Drop expired and corrupt persisted entries, then trim to capacity.
    ///
    /// Runs automatically after every persisted write. Stored and fallback
    /// entries count against the same capacity; the oldest-timestamp
    /// entries go first. Returns the number of entries removed.
    pub fn cleanup(&mut self) -> usize {
        let now = self.clock.now_millis();
        let max_age = self.config.max_age_ms as i64;
        let max_entries = self.config.max_entries;

        let Backend::Persisted { store, fallback } = &mut self.backend else {
            return 0;
        };

        let keys = match store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                log::warn!("[RouteCache] Cleanup skipped, cannot list keys: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        // (key, created_at, held in the memory fallback)
        let mut live: Vec<(String, i64, bool)> = Vec::new();

        for key in keys.into_iter().filter(|k| k.starts_with(KEY_PREFIX)) {
            let parsed = store
                .get(&key)
                .ok()
                .flatten()
                .and_then(|raw| serde_json::from_str::<StoredEntry>(&raw).ok());

            match parsed {
                Some(entry) if now - entry.path.created_at < max_age => {
                    live.push((key, entry.path.created_at, false));
                }
                _ => {
                    if store.remove(&key).is_ok() {
                        removed += 1;
                    }
                }
            }
        }

        let expired: Vec<String> = fallback
            .iter()
            .filter(|(_, entry)| now - entry.path.created_at >= max_age)
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            fallback.remove(&key);
            removed += 1;
        }
        live.extend(
            fallback
                .iter()
                .map(|(key, entry)| (key.clone(), entry.path.created_at, true)),
        );

        if live.len() > max_entries {
            live.sort_by_key(|(_, created_at, _)| *created_at);
            let excess = live.len() - max_entries;
            for (key, _, in_fallback) in live.drain(..excess) {
                if in_fallback {
                    fallback.remove(&key);
                    removed += 1;
                } else if store.remove(&key).is_ok() {
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            log::debug!("[RouteCache] Cleanup removed {} entries", removed);
        }
        removed
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Entry count and the oldest/newest creation timestamps.
    pub fn stats(&self) -> CacheStats {
        let timestamps: Vec<i64> = match &self.backend {
            Backend::Memory(cache) => cache.values().map(|e| e.path.created_at).collect(),
            Backend::Persisted { store, fallback } => {
                let keys = match store.keys() {
                    Ok(keys) => keys,
                    Err(e) => {
                        log::warn!("[RouteCache] Failed to get cache stats: {}", e);
                        Vec::new()
                    }
                };
                keys.iter()
                    .filter(|k| k.starts_with(KEY_PREFIX))
                    .filter_map(|k| store.get(k).ok().flatten())
                    .filter_map(|raw| serde_json::from_str::<StoredEntry>(&raw).ok())
                    .map(|e| e.path.created_at)
                    .chain(fallback.values().map(|e| e.path.created_at))
                    .collect()
            }
        };

        CacheStats {
            size: timestamps.len(),
            oldest_entry_time: timestamps.iter().copied().min(),
            newest_entry_time: timestamps.iter().copied().max(),
        }
    }

    /// Number of valid-or-not entries currently held.
    pub fn len(&self) -> usize {
        self.stats().size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
