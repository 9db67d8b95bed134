//! # Routing Gateway
//!
//! Memoizing front for an external walking-directions provider.
//!
//! [`RoutingGateway::compute_path`] answers from the [`RouteCache`] when it
//! can and only calls the provider on a miss. Failures are never cached and
//! never retried here; the caller decides how to degrade.
//!
//! Concurrent calls for the same key are not coalesced. The cache lock is
//! only held for the lookup and the store, never across the provider call.

use std::sync::{Arc, MutexGuard, PoisonError};

use futures::future::BoxFuture;

use crate::error::{OptionExt, Result, TourError};
use crate::route_cache::{CacheKey, CachedPath, RouteCache, SharedRouteCache};
use crate::Coordinate;

/// Minimum number of waypoints that form a path.
pub const MIN_WAYPOINTS: usize = 2;

/// One candidate path returned by a directions provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRoute {
    pub geometry: Vec<Coordinate>,
    pub distance_meters: f64,
    pub duration_seconds: f64,
}

/// External walking-directions service.
///
/// Receives the waypoints in visiting order and returns zero or more
/// candidate paths, best first.
pub trait DirectionsProvider: Send + Sync {
    fn walking_directions<'a>(
        &'a self,
        waypoints: &'a [Coordinate],
    ) -> BoxFuture<'a, Result<Vec<ProviderRoute>>>;
}

/// Straight polyline through the waypoints, used for display when routing fails.
pub fn straight_line_path(waypoints: &[Coordinate]) -> Vec<Coordinate> {
    waypoints.to_vec()
}

/// Check that `waypoints` can be routed: at least two, all in range.
pub fn validate_waypoints(waypoints: &[Coordinate]) -> Result<()> {
    waypoints
        .get(MIN_WAYPOINTS - 1)
        .ok_or_insufficient_waypoints(waypoints.len(), MIN_WAYPOINTS)?;

    match waypoints.iter().find(|c| !c.is_valid()) {
        Some(bad) => Err(TourError::InvalidCoordinates {
            message: format!("{}, {}", bad.latitude, bad.longitude),
        }),
        None => Ok(()),
    }
}

/// Cache-backed path computation.
#[derive(Clone)]
pub struct RoutingGateway {
    provider: Arc<dyn DirectionsProvider>,
    cache: SharedRouteCache,
}

impl RoutingGateway {
    pub fn new(provider: Arc<dyn DirectionsProvider>, cache: SharedRouteCache) -> Self {
        Self { provider, cache }
    }

    /// Shared cache handle for stats and clearing.
    pub fn cache(&self) -> SharedRouteCache {
        Arc::clone(&self.cache)
    }

    fn lock_cache(&self) -> MutexGuard<'_, RouteCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Compute (or recall) the walking path for `waypoints`, cached under `key`.
    ///
    /// Returns `None` for fewer than two waypoints without contacting the
    /// provider, and `None` when the provider fails or finds no route.
    pub async fn compute_path(
        &self,
        key: &CacheKey,
        waypoints: &[Coordinate],
    ) -> Option<CachedPath> {
        if let Err(e) = validate_waypoints(waypoints) {
            log::debug!("[RoutingGateway] Not routing: {}", e);
            return None;
        }

        let cached = self.lock_cache().get(key);
        if let Some(path) = cached {
            log::debug!("[RoutingGateway] Using cached path for {:?}", key);
            return Some(path);
        }

        match self.fetch(waypoints).await {
            Ok(route) => {
                let path = self.lock_cache().set(
                    key,
                    CachedPath::new(route.geometry, route.distance_meters, route.duration_seconds),
                );
                log::info!(
                    "[RoutingGateway] Routed {} waypoints: {:.0} m, {:.0} s",
                    waypoints.len(),
                    path.distance_meters,
                    path.duration_seconds
                );
                Some(path)
            }
            Err(e) => {
                log::warn!("[RoutingGateway] Routing failed for {:?}: {}", key, e);
                None
            }
        }
    }

    /// Compute a path keyed by the waypoint fingerprint.
    pub async fn compute_path_for_waypoints(&self, waypoints: &[Coordinate]) -> Option<CachedPath> {
        let key = CacheKey::Waypoints(waypoints.to_vec());
        self.compute_path(&key, waypoints).await
    }

    /// Drop the cached path for `key`.
    pub fn invalidate(&self, key: &CacheKey) {
        log::debug!("[RoutingGateway] Invalidating {:?}", key);
        self.lock_cache().remove(key);
    }

    async fn fetch(&self, waypoints: &[Coordinate]) -> Result<ProviderRoute> {
        let routes = self.provider.walking_directions(waypoints).await?;
        routes
            .into_iter()
            .next()
            .ok_or_provider("NoRoute", "provider returned no routes")
    }
}
