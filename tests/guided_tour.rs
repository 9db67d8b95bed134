//! Guided tour scenarios.
//!
//! Drives a `TourSession` end to end with a scripted in-process directions
//! provider and a manual clock, so routing calls and cache expiry are fully
//! deterministic.
//!
//! Run with: `cargo test --test guided_tour`

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use walking_tour::geo_utils::polyline_length;
use walking_tour::{
    CacheConfig, CacheKey, Coordinate, DirectionsProvider, DisplayPath, GeolocationError,
    ManualClock, NavigationConfig, NavigationEvent, PermissionStatus, Place, ProviderRoute,
    Route, RouteCache, RoutingGateway, TourError, TourSession,
};

const MINUTE: i64 = 60 * 1000;

/// Provider that routes in straight lines and records every request.
#[derive(Default)]
struct ScriptedProvider {
    calls: AtomicUsize,
    failing: AtomicBool,
    requests: Mutex<Vec<Vec<Coordinate>>>,
}

impl ScriptedProvider {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn last_request(&self) -> Option<Vec<Coordinate>> {
        self.requests.lock().unwrap().last().cloned()
    }
}

impl DirectionsProvider for ScriptedProvider {
    fn walking_directions<'a>(
        &'a self,
        waypoints: &'a [Coordinate],
    ) -> BoxFuture<'a, walking_tour::Result<Vec<ProviderRoute>>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(waypoints.to_vec());

            if self.failing.load(Ordering::SeqCst) {
                return Err(TourError::Http {
                    message: "simulated network error".to_string(),
                    status_code: None,
                });
            }

            let distance = polyline_length(waypoints);
            Ok(vec![ProviderRoute {
                geometry: waypoints.to_vec(),
                distance_meters: distance,
                // 1.4 m/s walking pace
                duration_seconds: distance / 1.4,
            }])
        })
    }
}

struct Harness {
    provider: Arc<ScriptedProvider>,
    clock: ManualClock,
    gateway: RoutingGateway,
}

impl Harness {
    fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let provider = Arc::new(ScriptedProvider::default());
        let clock = ManualClock::new(1_700_000_000_000);
        let cache = RouteCache::new(CacheConfig::default())
            .with_clock(Arc::new(clock.clone()))
            .into_shared();
        let gateway = RoutingGateway::new(provider.clone(), cache);

        Self {
            provider,
            clock,
            gateway,
        }
    }

    fn session(&self, route: Route) -> TourSession {
        TourSession::new(route, NavigationConfig::default(), self.gateway.clone())
    }

    fn cache_size(&self) -> usize {
        self.gateway.cache().lock().unwrap().stats().size
    }
}

fn place(id: &str, lat: f64, lng: f64) -> Place {
    Place::new(id, id.to_uppercase(), Coordinate::new(lat, lng))
}

fn two_stop_route() -> Route {
    Route::new(
        "castle-walk",
        "Castle Walk",
        vec![place("p1", 50.000, 12.000), place("p2", 50.001, 12.000)],
    )
}

fn four_stop_route() -> Route {
    Route::new(
        "riverside",
        "Riverside",
        vec![
            place("a", 50.000, 12.000),
            place("b", 50.001, 12.000),
            place("c", 50.002, 12.000),
            place("d", 50.003, 12.000),
        ],
    )
}

// ============================================================================
// Test: End-to-End Tour
// ============================================================================

#[tokio::test]
async fn test_two_stop_tour_by_proximity() {
    let harness = Harness::new();
    let mut session = harness.session(two_stop_route());

    let state = session.start().await;
    assert_eq!(harness.provider.calls(), 1);
    assert!(matches!(state.path, Some(DisplayPath::Routed(_))));

    // Standing on the first stop
    let state = session.update_location(Coordinate::new(50.000, 12.000)).await;
    assert_eq!(state.distance_to_target_m.unwrap(), 0.0);
    assert_eq!(state.nearby.unwrap().id, "p1");

    let state = session.visit("p1").await;
    assert_eq!(state.target.unwrap().id, "p2");

    // ~11 m short of the second stop
    let state = session.update_location(Coordinate::new(50.0009, 12.000)).await;
    assert!(state.distance_to_target_m.unwrap() < 12.0);
    assert_eq!(state.nearby.unwrap().id, "p2");
    assert!(!session.is_complete());

    let state = session.visit("p2").await;
    assert!(state.complete);
    assert!(state.target.is_none());
    assert!(session.is_complete());

    let summary = session.summary();
    assert_eq!(summary.visited, 2);
    assert_eq!(summary.skipped, 0);
    assert!(summary.walked_meters > 99.0);

    // A single remaining waypoint never reaches the provider
    assert_eq!(harness.provider.calls(), 1);
}

#[tokio::test]
async fn test_single_coordinate_makes_no_provider_call() {
    let harness = Harness::new();
    let path = harness
        .gateway
        .compute_path_for_waypoints(&[Coordinate::new(50.0, 12.0)])
        .await;

    assert!(path.is_none());
    assert_eq!(harness.provider.calls(), 0);
}

#[tokio::test]
async fn test_provider_failure_creates_no_cache_entry() {
    let harness = Harness::new();
    harness.provider.set_failing(true);

    let key = CacheKey::route("castle-walk");
    let waypoints = two_stop_route().waypoints();
    assert!(harness.gateway.compute_path(&key, &waypoints).await.is_none());
    assert_eq!(harness.provider.calls(), 1);
    assert_eq!(harness.cache_size(), 0);

    // The session degrades to a straight line and stays usable
    let mut session = harness.session(two_stop_route());
    let state = session.start().await;
    match state.path {
        Some(DisplayPath::StraightLine(points)) => assert_eq!(points, waypoints),
        other => panic!("expected straight-line fallback, got {:?}", other),
    }
    assert_eq!(harness.cache_size(), 0);

    // Routing recovers once the provider does and the walker moves
    harness.provider.set_failing(false);
    let state = session.update_location(Coordinate::new(50.0001, 12.0)).await;
    assert!(matches!(state.path, Some(DisplayPath::Routed(_))));
    assert_eq!(harness.cache_size(), 1);
}

// ============================================================================
// Test: Skip Semantics
// ============================================================================

#[tokio::test]
async fn test_skips_advance_monotonically_and_refresh_path() {
    let harness = Harness::new();
    let mut session = harness.session(four_stop_route());
    session.start().await;
    session.update_location(Coordinate::new(50.000, 12.000)).await;
    assert_eq!(harness.provider.calls(), 1);

    session.skip().await;
    session.skip().await;
    let state = session.skip().await;
    assert_eq!(state.target.unwrap().id, "d");
    for id in ["a", "b", "c"] {
        assert!(session.engine().progress().is_skipped(id));
    }
    assert!(state.path.is_none());

    // The route entry was invalidated, so the next fix goes back to the provider
    let state = session.update_location(Coordinate::new(50.0001, 12.000)).await;
    assert_eq!(harness.provider.calls(), 2);
    assert_eq!(harness.provider.last_request().unwrap().len(), 4);
    assert!(matches!(state.path, Some(DisplayPath::Routed(_))));

    let state = session.skip().await;
    assert!(state.complete);
    assert!(session.is_complete());
    assert_eq!(session.summary().skipped, 4);
}

// ============================================================================
// Test: Deviation
// ============================================================================

#[tokio::test]
async fn test_gps_jitter_near_path_does_not_reroute() {
    let harness = Harness::new();
    let mut session = harness.session(four_stop_route());
    session.start().await;

    for (lat, lng) in [
        (50.0010, 12.0000),
        (50.0011, 12.0001),
        (50.0010, 11.9999),
        (50.0012, 12.0002),
        (50.0011, 12.0000),
    ] {
        let state = session.update_location(Coordinate::new(lat, lng)).await;
        assert!(!state.deviated);
    }
    assert_eq!(harness.provider.calls(), 1);
}

#[tokio::test]
async fn test_leaving_path_reroutes_from_device() {
    let harness = Harness::new();
    let mut session = harness.session(four_stop_route());
    session.start().await;

    // ~140 m east of the corridor
    let device = Coordinate::new(50.0010, 12.0020);
    session.update_location(device).await;
    assert_eq!(harness.provider.calls(), 2);

    let request = harness.provider.last_request().unwrap();
    assert_eq!(request.len(), 5);
    assert_eq!(request[0], device);

    let state = session.state();
    assert!(!state.deviated);
    assert_eq!(state.path.unwrap().geometry()[0], device);
    // Route entry plus the fingerprinted detour
    assert_eq!(harness.cache_size(), 2);

    // The detour path starts at the device, so small moves stay quiet
    session.update_location(Coordinate::new(50.00102, 12.00201)).await;
    assert_eq!(harness.provider.calls(), 2);
}

// ============================================================================
// Test: Cache Across Sessions
// ============================================================================

#[tokio::test]
async fn test_route_cache_shared_across_sessions_until_expiry() {
    let harness = Harness::new();

    harness.session(four_stop_route()).start().await;
    harness.session(four_stop_route()).start().await;
    assert_eq!(harness.provider.calls(), 1);

    harness.clock.advance(29 * MINUTE);
    harness.session(four_stop_route()).start().await;
    assert_eq!(harness.provider.calls(), 1);

    harness.clock.advance(2 * MINUTE);
    harness.session(four_stop_route()).start().await;
    assert_eq!(harness.provider.calls(), 2);

    let stats = harness.gateway.cache().lock().unwrap().stats();
    assert_eq!(stats.size, 1);
    assert_eq!(stats.newest_entry_time, Some(1_700_000_000_000 + 31 * MINUTE));
}

#[tokio::test]
async fn test_visits_use_fingerprint_keys() {
    let harness = Harness::new();
    let mut session = harness.session(four_stop_route());
    session.start().await;
    session.update_location(Coordinate::new(50.000, 12.000)).await;
    session.visit("a").await;
    session.update_location(Coordinate::new(50.0002, 12.000)).await;

    assert_eq!(harness.provider.calls(), 2);
    let remaining = vec![
        Coordinate::new(50.001, 12.000),
        Coordinate::new(50.002, 12.000),
        Coordinate::new(50.003, 12.000),
    ];
    assert_eq!(harness.provider.last_request().unwrap(), remaining);

    // The full-route entry stays alongside the fingerprinted remainder
    let cache = harness.gateway.cache();
    let mut cache = cache.lock().unwrap();
    assert_eq!(cache.stats().size, 2);
    assert!(cache.get(&CacheKey::route("riverside")).is_some());
    assert!(cache.get(&CacheKey::Waypoints(remaining)).is_some());
}

// ============================================================================
// Test: Manual Navigation
// ============================================================================

#[tokio::test]
async fn test_denied_location_falls_back_to_manual_advance() {
    let harness = Harness::new();
    let mut session = harness.session(four_stop_route());
    session.start().await;

    let state = session
        .handle(NavigationEvent::LocationError(
            GeolocationError::PermissionDenied,
        ))
        .await;
    assert_eq!(state.permission, PermissionStatus::Denied);
    assert_eq!(state.nearby.unwrap().id, "a");

    let state = session.visit("a").await;
    assert_eq!(state.nearby.unwrap().id, "b");
    // Without location the new path is requested right away
    assert_eq!(harness.provider.calls(), 2);
    assert!(state.path.is_some());

    session.visit("b").await;
    session.skip().await;
    let state = session.visit("d").await;
    assert!(state.complete);
    assert!(session.is_complete());

    let summary = session.summary();
    assert_eq!(summary.visited, 3);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.walked_meters, 0.0);
}
