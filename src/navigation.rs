//! # Navigation Engine
//!
//! State machine driving a guided walking tour.
//!
//! [`NavigationEngine::advance`] consumes one [`NavigationEvent`] at a time and
//! returns the [`NavigationCommand`]s the host must carry out (invalidate a
//! cached path, compute a path, announce completion). The engine itself never
//! performs I/O, so it runs to completion on every event and can be driven
//! by tests without a runtime. [`TourSession`] is the async driver that
//! executes commands against a [`RoutingGateway`].
//!
//! ## Rules
//!
//! - The target is the first place, in route order, that is neither visited
//!   nor skipped. No target means the tour is complete.
//! - The nearby card shows the target once the device is within
//!   `proximity_threshold_m`, or unconditionally when location is denied or
//!   unavailable (manual advancement).
//! - Skipping resolves the target and every unresolved place before it.
//! - The path is recomputed when the device is farther than
//!   `deviation_threshold_m` from it **and** has moved more than the same
//!   distance since the path was requested. The second condition suppresses
//!   GPS jitter while standing still.
//! - Path results for requests issued before the last skip or visit are
//!   discarded. Other results apply in arrival order.

use serde::{Deserialize, Serialize};

use crate::gateway::{straight_line_path, RoutingGateway, MIN_WAYPOINTS};
use crate::geo_utils::{bearing_degrees, closest_point_on_path, distance_meters};
use crate::progress::{TourProgress, TourSummary, DEFAULT_MAX_TRAIL_POINTS};
use crate::route_cache::{CacheKey, CachedPath};
use crate::{Coordinate, Place, Route};

// ============================================================================
// Configuration
// ============================================================================

/// Navigation thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Distance at which the target's card is shown.
    /// Default: 50 m
    pub proximity_threshold_m: f64,

    /// Off-path distance, and minimum movement since the last request,
    /// that trigger re-routing.
    /// Default: 50 m
    pub deviation_threshold_m: f64,

    /// Maximum number of recorded trail points.
    /// Default: 500
    pub max_trail_points: usize,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            proximity_threshold_m: 50.0,
            deviation_threshold_m: 50.0,
            max_trail_points: DEFAULT_MAX_TRAIL_POINTS,
        }
    }
}

// ============================================================================
// Events and Commands
// ============================================================================

/// Geolocation permission as last reported by the location source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum PermissionStatus {
    #[default]
    Pending,
    Granted,
    Denied,
    Unavailable,
}

impl PermissionStatus {
    /// Location will not arrive; the walker advances manually.
    pub fn is_manual(&self) -> bool {
        matches!(self, PermissionStatus::Denied | PermissionStatus::Unavailable)
    }
}

/// One device location fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationSample {
    pub coordinate: Coordinate,
    /// Horizontal accuracy in meters
    pub accuracy: Option<f64>,
    /// Compass heading in degrees
    pub heading: Option<f64>,
}

impl LocationSample {
    pub fn at(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            accuracy: None,
            heading: None,
        }
    }
}

/// Failure reported by the location source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeolocationError {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
}

/// Input to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationEvent {
    LocationSample(LocationSample),
    LocationError(GeolocationError),
    /// Skip the current target (and any unresolved place before it)
    SkipRequested,
    /// The walker opened this place's story
    WaypointVisited(String),
    PathComputed { request_id: u64, path: CachedPath },
    PathFailed { request_id: u64 },
}

/// A path computation the host should run.
#[derive(Debug, Clone, PartialEq)]
pub struct PathRequest {
    pub request_id: u64,
    pub key: CacheKey,
    pub waypoints: Vec<Coordinate>,
    /// Device location when the request was issued
    pub anchor: Option<Coordinate>,
}

/// Side effect requested by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationCommand {
    InvalidateCachedPath(CacheKey),
    ComputePath(PathRequest),
    /// Every place is resolved. Emitted once per tour.
    TourComplete,
}

/// Path shown on the map.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayPath {
    Routed(CachedPath),
    /// Fallback through the waypoints when routing failed
    StraightLine(Vec<Coordinate>),
}

impl DisplayPath {
    pub fn geometry(&self) -> &[Coordinate] {
        match self {
            DisplayPath::Routed(path) => &path.geometry,
            DisplayPath::StraightLine(points) => points,
        }
    }

    pub fn is_routed(&self) -> bool {
        matches!(self, DisplayPath::Routed(_))
    }
}

/// Snapshot for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationState {
    pub device_location: Option<Coordinate>,
    pub target: Option<Place>,
    pub target_index: Option<usize>,
    pub distance_to_target_m: Option<f64>,
    pub bearing_to_target_deg: Option<f64>,
    /// Place whose card should be shown
    pub nearby: Option<Place>,
    /// A re-route after leaving the path is in flight
    pub deviated: bool,
    /// Any path request is in flight
    pub recalculating: bool,
    pub permission: PermissionStatus,
    pub complete: bool,
    pub path: Option<DisplayPath>,
}

// ============================================================================
// Engine
// ============================================================================

/// Per-tour navigation state machine.
pub struct NavigationEngine {
    route: Route,
    config: NavigationConfig,
    progress: TourProgress,
    permission: PermissionStatus,
    device: Option<Coordinate>,
    path: Option<DisplayPath>,
    /// Device location when the held path was requested
    anchor: Option<Coordinate>,
    pending: Option<u64>,
    next_request_id: u64,
    /// Results for requests below this id are stale
    stale_before: u64,
    deviated: bool,
    started: bool,
    complete_emitted: bool,
}

impl NavigationEngine {
    pub fn new(route: Route, config: NavigationConfig) -> Self {
        let progress = TourProgress::new(config.max_trail_points);
        Self {
            route,
            config,
            progress,
            permission: PermissionStatus::Pending,
            device: None,
            path: None,
            anchor: None,
            pending: None,
            next_request_id: 1,
            stale_before: 0,
            deviated: false,
            started: false,
            complete_emitted: false,
        }
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn config(&self) -> &NavigationConfig {
        &self.config
    }

    pub fn progress(&self) -> &TourProgress {
        &self.progress
    }

    pub fn summary(&self) -> TourSummary {
        self.progress.summary(&self.route)
    }

    /// Begin the tour and request the initial path.
    pub fn start(&mut self) -> Vec<NavigationCommand> {
        if self.started {
            return Vec::new();
        }
        self.started = true;
        self.progress.start(&self.route.id);
        log::info!(
            "[NavigationEngine] Starting tour '{}' with {} stops",
            self.route.id,
            self.route.places.len()
        );

        let mut commands = Vec::new();
        if !self.finish_if_complete(&mut commands) {
            self.request_path(false, &mut commands);
        }
        commands
    }

    /// Apply one event and return the commands it produces.
    pub fn advance(&mut self, event: NavigationEvent) -> Vec<NavigationCommand> {
        let mut commands = Vec::new();
        if !self.started {
            commands.extend(self.start());
        }

        match event {
            NavigationEvent::LocationSample(sample) => self.on_location(sample, &mut commands),
            NavigationEvent::LocationError(err) => self.on_location_error(err, &mut commands),
            NavigationEvent::SkipRequested => self.on_skip(&mut commands),
            NavigationEvent::WaypointVisited(place_id) => self.on_visit(&place_id, &mut commands),
            NavigationEvent::PathComputed { request_id, path } => {
                self.on_path_result(request_id, Some(path))
            }
            NavigationEvent::PathFailed { request_id } => self.on_path_result(request_id, None),
        }
        commands
    }

    // ========================================================================
    // Derived State
    // ========================================================================

    fn target_index(&self) -> Option<usize> {
        self.route
            .places
            .iter()
            .position(|p| !self.progress.is_resolved(&p.id))
    }

    pub fn target(&self) -> Option<&Place> {
        self.target_index().map(|i| &self.route.places[i])
    }

    pub fn is_complete(&self) -> bool {
        self.target_index().is_none()
    }

    /// Places still to walk past: everything not visited. Skipped places stay
    /// in because they still shape the walking corridor.
    pub fn route_waypoints(&self) -> Vec<Coordinate> {
        self.route
            .places
            .iter()
            .filter(|p| !self.progress.is_visited(&p.id))
            .map(|p| p.coordinate)
            .collect()
    }

    /// Cache key for the session's current waypoint set.
    ///
    /// The route id is used until something is visited; after that the
    /// remaining waypoints are fingerprinted so the full-route entry stays
    /// correct.
    pub fn session_key(&self) -> CacheKey {
        let any_visited = self
            .route
            .places
            .iter()
            .any(|p| self.progress.is_visited(&p.id));
        if any_visited {
            CacheKey::Waypoints(self.route_waypoints())
        } else {
            CacheKey::Route(self.route.id.clone())
        }
    }

    fn nearby(&self) -> Option<&Place> {
        let target = self.target()?;
        if self.permission.is_manual() {
            return Some(target);
        }
        let device = self.device?;
        (distance_meters(&device, &target.coordinate) <= self.config.proximity_threshold_m)
            .then_some(target)
    }

    pub fn path(&self) -> Option<&DisplayPath> {
        self.path.as_ref()
    }

    pub fn state(&self) -> NavigationState {
        let target_index = self.target_index();
        let target = target_index.map(|i| self.route.places[i].clone());
        let (distance, bearing) = match (self.device, &target) {
            (Some(device), Some(place)) => (
                Some(distance_meters(&device, &place.coordinate)),
                Some(bearing_degrees(&device, &place.coordinate)),
            ),
            _ => (None, None),
        };

        NavigationState {
            device_location: self.device,
            target,
            target_index,
            distance_to_target_m: distance,
            bearing_to_target_deg: bearing,
            nearby: self.nearby().cloned(),
            deviated: self.deviated,
            recalculating: self.pending.is_some(),
            permission: self.permission,
            complete: target_index.is_none(),
            path: self.path.clone(),
        }
    }

    /// Connector from an off-path place to the closest point of the path.
    ///
    /// `None` when there is no path or the place lies within the deviation
    /// threshold of it.
    pub fn off_path_connector(&self, place: &Place) -> Option<(Coordinate, Coordinate)> {
        let path = self.path.as_ref()?;
        let (closest, distance) = closest_point_on_path(&place.coordinate, path.geometry())?;
        (distance > self.config.deviation_threshold_m).then_some((place.coordinate, closest))
    }

    // ========================================================================
    // Event Handlers
    // ========================================================================

    fn on_location(&mut self, sample: LocationSample, commands: &mut Vec<NavigationCommand>) {
        let device = sample.coordinate;
        if !device.is_valid() {
            log::warn!(
                "[NavigationEngine] Ignoring invalid location {}, {}",
                device.latitude,
                device.longitude
            );
            return;
        }

        self.permission = PermissionStatus::Granted;
        self.device = Some(device);
        self.progress.record_position(device);

        if self.is_complete() || self.pending.is_some() {
            return;
        }

        let Some(path) = self.path.as_ref() else {
            self.request_path(false, commands);
            return;
        };

        let off_path = closest_point_on_path(&device, path.geometry())
            .map_or(true, |(_, d)| d > self.config.deviation_threshold_m);
        let moved = self.anchor.map_or(true, |anchor| {
            distance_meters(&anchor, &device) > self.config.deviation_threshold_m
        });
        let routed = path.is_routed();

        if off_path && moved {
            log::info!("[NavigationEngine] Off path, re-routing from current location");
            self.deviated = true;
            self.path = None;
            self.request_path(true, commands);
        } else if !routed && moved {
            log::debug!("[NavigationEngine] Retrying routing after fallback");
            self.request_path(false, commands);
        }
    }

    fn on_location_error(&mut self, err: GeolocationError, commands: &mut Vec<NavigationCommand>) {
        self.permission = match err {
            GeolocationError::PermissionDenied => PermissionStatus::Denied,
            GeolocationError::PositionUnavailable => PermissionStatus::Unavailable,
            GeolocationError::Timeout => match self.permission {
                PermissionStatus::Pending => PermissionStatus::Unavailable,
                other => other,
            },
        };
        log::warn!(
            "[NavigationEngine] Geolocation error {:?}, permission now {:?}",
            err,
            self.permission
        );

        if self.permission.is_manual() {
            self.device = None;
            if self.path.is_none() && self.pending.is_none() && !self.is_complete() {
                self.request_path(false, commands);
            }
        }
    }

    fn on_skip(&mut self, commands: &mut Vec<NavigationCommand>) {
        let Some(target_index) = self.target_index() else {
            return;
        };

        let key = self.session_key();
        for place in &self.route.places[..=target_index] {
            if !self.progress.is_resolved(&place.id) {
                self.progress.mark_skipped(&place.id);
            }
        }
        log::info!(
            "[NavigationEngine] Skipped through '{}'",
            self.route.places[target_index].id
        );

        commands.push(NavigationCommand::InvalidateCachedPath(key));
        self.waypoints_changed(commands);
    }

    fn on_visit(&mut self, place_id: &str, commands: &mut Vec<NavigationCommand>) {
        if self.route.place(place_id).is_none() {
            log::warn!("[NavigationEngine] Visit for unknown place '{}'", place_id);
            return;
        }
        if !self.progress.mark_visited(place_id) {
            return;
        }
        log::info!("[NavigationEngine] Visited '{}'", place_id);
        self.waypoints_changed(commands);
    }

    fn on_path_result(&mut self, request_id: u64, path: Option<CachedPath>) {
        if request_id < self.stale_before {
            log::debug!("[NavigationEngine] Discarding stale path result #{}", request_id);
            return;
        }
        if self.pending == Some(request_id) {
            self.pending = None;
        }
        self.deviated = false;

        self.path = Some(match path {
            Some(path) => DisplayPath::Routed(path),
            None => {
                log::warn!(
                    "[NavigationEngine] Routing failed for request #{}, showing straight line",
                    request_id
                );
                DisplayPath::StraightLine(self.fallback_waypoints())
            }
        });
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Skip or visit changed the waypoint set: drop the held path and
    /// anything in flight.
    fn waypoints_changed(&mut self, commands: &mut Vec<NavigationCommand>) {
        self.path = None;
        self.pending = None;
        self.deviated = false;
        self.stale_before = self.next_request_id;

        if self.finish_if_complete(commands) {
            return;
        }
        // With live location the next sample recomputes
        if self.permission != PermissionStatus::Granted {
            self.request_path(false, commands);
        }
    }

    fn finish_if_complete(&mut self, commands: &mut Vec<NavigationCommand>) -> bool {
        if !self.is_complete() {
            return false;
        }
        if !self.complete_emitted {
            self.complete_emitted = true;
            log::info!("[NavigationEngine] Tour '{}' complete", self.route.id);
            commands.push(NavigationCommand::TourComplete);
        }
        true
    }

    fn fallback_waypoints(&self) -> Vec<Coordinate> {
        let mut points: Vec<Coordinate> = self.device.into_iter().collect();
        points.extend(self.route_waypoints());
        straight_line_path(&points)
    }

    /// Issue a path request, or settle for a straight line when there is
    /// nothing to route.
    fn request_path(&mut self, from_device: bool, commands: &mut Vec<NavigationCommand>) {
        let remaining = self.route_waypoints();
        let (key, waypoints) = match (from_device, self.device) {
            (true, Some(device)) => {
                let mut points = vec![device];
                points.extend(remaining);
                (CacheKey::Waypoints(points.clone()), points)
            }
            _ => (self.session_key(), remaining),
        };

        self.anchor = self.device;
        if waypoints.len() < MIN_WAYPOINTS {
            self.deviated = false;
            self.path = Some(DisplayPath::StraightLine(self.fallback_waypoints()));
            return;
        }

        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.pending = Some(request_id);
        log::debug!(
            "[NavigationEngine] Requesting path #{} through {} waypoints",
            request_id,
            waypoints.len()
        );
        commands.push(NavigationCommand::ComputePath(PathRequest {
            request_id,
            key,
            waypoints,
            anchor: self.anchor,
        }));
    }
}

// ============================================================================
// Session Driver
// ============================================================================

/// Runs a [`NavigationEngine`] against a [`RoutingGateway`].
///
/// Path requests are awaited in place and their results fed straight back
/// into the engine.
pub struct TourSession {
    engine: NavigationEngine,
    gateway: RoutingGateway,
    completed: bool,
}

impl TourSession {
    pub fn new(route: Route, config: NavigationConfig, gateway: RoutingGateway) -> Self {
        Self {
            engine: NavigationEngine::new(route, config),
            gateway,
            completed: false,
        }
    }

    pub fn engine(&self) -> &NavigationEngine {
        &self.engine
    }

    pub fn gateway(&self) -> &RoutingGateway {
        &self.gateway
    }

    pub fn state(&self) -> NavigationState {
        self.engine.state()
    }

    /// Whether the tour-complete signal has been received.
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn summary(&self) -> TourSummary {
        self.engine.summary()
    }

    pub async fn start(&mut self) -> NavigationState {
        let commands = self.engine.start();
        self.execute(commands).await;
        self.engine.state()
    }

    /// Feed one event and carry out everything it triggers.
    pub async fn handle(&mut self, event: NavigationEvent) -> NavigationState {
        let commands = self.engine.advance(event);
        self.execute(commands).await;
        self.engine.state()
    }

    pub async fn update_location(&mut self, coordinate: Coordinate) -> NavigationState {
        self.handle(NavigationEvent::LocationSample(LocationSample::at(coordinate)))
            .await
    }

    pub async fn skip(&mut self) -> NavigationState {
        self.handle(NavigationEvent::SkipRequested).await
    }

    pub async fn visit(&mut self, place_id: &str) -> NavigationState {
        self.handle(NavigationEvent::WaypointVisited(place_id.to_string()))
            .await
    }

    async fn execute(&mut self, commands: Vec<NavigationCommand>) {
        let mut queue = std::collections::VecDeque::from(commands);

        while let Some(command) = queue.pop_front() {
            match command {
                NavigationCommand::InvalidateCachedPath(key) => self.gateway.invalidate(&key),
                NavigationCommand::ComputePath(request) => {
                    let event = match self
                        .gateway
                        .compute_path(&request.key, &request.waypoints)
                        .await
                    {
                        Some(path) => NavigationEvent::PathComputed {
                            request_id: request.request_id,
                            path,
                        },
                        None => NavigationEvent::PathFailed {
                            request_id: request.request_id,
                        },
                    };
                    queue.extend(self.engine.advance(event));
                }
                NavigationCommand::TourComplete => {
                    log::info!("[TourSession] Tour complete: {:?}", self.engine.summary());
                    self.completed = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(id: &str, lat: f64) -> Place {
        Place::new(id, id.to_uppercase(), Coordinate::new(lat, 12.0))
    }

    fn four_stop_route() -> Route {
        Route::new(
            "riverside",
            "Riverside",
            vec![
                place("a", 50.000),
                place("b", 50.001),
                place("c", 50.002),
                place("d", 50.003),
            ],
        )
    }

    fn engine() -> NavigationEngine {
        NavigationEngine::new(four_stop_route(), NavigationConfig::default())
    }

    fn sample(lat: f64, lng: f64) -> NavigationEvent {
        NavigationEvent::LocationSample(LocationSample::at(Coordinate::new(lat, lng)))
    }

    fn path_requests(commands: &[NavigationCommand]) -> Vec<PathRequest> {
        commands
            .iter()
            .filter_map(|c| match c {
                NavigationCommand::ComputePath(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    fn routed(points: &[Coordinate]) -> CachedPath {
        CachedPath::new(points.to_vec(), 333.0, 240.0)
    }

    /// Start the engine and answer the initial request with the straight waypoint path.
    fn started_with_path(engine: &mut NavigationEngine) -> PathRequest {
        let request = path_requests(&engine.start()).remove(0);
        engine.advance(NavigationEvent::PathComputed {
            request_id: request.request_id,
            path: routed(&request.waypoints),
        });
        request
    }

    #[test]
    fn test_start_requests_route_keyed_path() {
        let mut engine = engine();
        let requests = path_requests(&engine.start());
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].key, CacheKey::route("riverside"));
        assert_eq!(requests[0].waypoints.len(), 4);
        assert_eq!(requests[0].anchor, None);
        assert!(engine.state().recalculating);

        assert!(engine.start().is_empty());
    }

    #[test]
    fn test_target_and_proximity() {
        let mut engine = engine();
        started_with_path(&mut engine);

        engine.advance(sample(49.999, 12.0));
        let state = engine.state();
        assert_eq!(state.target.as_ref().unwrap().id, "a");
        assert!(state.nearby.is_none());
        assert!((state.distance_to_target_m.unwrap() - 111.2).abs() < 1.0);
        assert!(state.bearing_to_target_deg.unwrap() < 1.0);

        engine.advance(sample(49.9997, 12.0));
        assert_eq!(engine.state().nearby.unwrap().id, "a");
    }

    #[test]
    fn test_skip_is_bulk_and_monotonic() {
        let mut engine = engine();
        started_with_path(&mut engine);
        engine.advance(NavigationEvent::SkipRequested);
        engine.advance(NavigationEvent::SkipRequested);
        assert_eq!(engine.state().target.unwrap().id, "c");

        // Visiting an earlier place does not move the target backwards
        engine.advance(NavigationEvent::WaypointVisited("a".to_string()));
        let commands = engine.advance(NavigationEvent::SkipRequested);

        let progress = engine.progress();
        assert!(progress.is_skipped("b"));
        assert!(progress.is_skipped("c"));
        assert_eq!(engine.state().target.unwrap().id, "d");
        assert!(commands
            .iter()
            .any(|c| matches!(c, NavigationCommand::InvalidateCachedPath(_))));
    }

    #[test]
    fn test_skip_while_target_is_c_skips_a_b_c() {
        let route = four_stop_route();
        let mut engine = NavigationEngine::new(route, NavigationConfig::default());
        engine.start();
        engine.progress.mark_skipped("a");
        engine.progress.mark_skipped("b");
        assert_eq!(engine.target().unwrap().id, "c");

        engine.advance(NavigationEvent::SkipRequested);
        for id in ["a", "b", "c"] {
            assert!(engine.progress().is_skipped(id));
        }
        assert_eq!(engine.target().unwrap().id, "d");
    }

    #[test]
    fn test_skip_invalidates_route_key_and_recomputes_on_next_sample() {
        let mut engine = engine();
        started_with_path(&mut engine);
        engine.advance(sample(50.0, 12.0));

        let commands = engine.advance(NavigationEvent::SkipRequested);
        assert_eq!(
            commands,
            vec![NavigationCommand::InvalidateCachedPath(CacheKey::route(
                "riverside"
            ))]
        );
        assert!(engine.path().is_none());

        let requests = path_requests(&engine.advance(sample(50.0, 12.0)));
        assert_eq!(requests.len(), 1);
        // Skipped places still shape the corridor
        assert_eq!(requests[0].waypoints.len(), 4);
        assert_eq!(requests[0].key, CacheKey::route("riverside"));
    }

    #[test]
    fn test_visit_switches_to_fingerprint_key() {
        let mut engine = engine();
        started_with_path(&mut engine);
        engine.advance(sample(50.0, 12.0));
        engine.advance(NavigationEvent::WaypointVisited("a".to_string()));

        let requests = path_requests(&engine.advance(sample(50.0, 12.0)));
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].waypoints.len(), 3);
        assert_eq!(
            requests[0].key,
            CacheKey::Waypoints(requests[0].waypoints.clone())
        );
    }

    #[test]
    fn test_jitter_does_not_recompute() {
        let mut engine = engine();
        started_with_path(&mut engine);

        // ~22 m from the nearest path point, wobbling by a few meters
        for offset in [0.0, 0.00005, -0.00004, 0.00003, 0.0001] {
            let commands = engine.advance(sample(50.0012, 12.0 + offset));
            assert!(path_requests(&commands).is_empty());
        }
        assert!(!engine.state().deviated);
    }

    #[test]
    fn test_deviation_requires_movement() {
        let mut engine = engine();
        started_with_path(&mut engine);

        // ~140 m east of the path; anchor is unset so this counts as moved
        let requests = path_requests(&engine.advance(sample(50.0015, 12.002)));
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.waypoints.len(), 5);
        assert_eq!(request.waypoints[0], Coordinate::new(50.0015, 12.002));
        assert_eq!(request.anchor, Some(Coordinate::new(50.0015, 12.002)));
        assert!(engine.state().deviated);

        // Result passes far from the device; standing still must not re-trigger
        engine.advance(NavigationEvent::PathComputed {
            request_id: request.request_id,
            path: routed(&request.waypoints[1..]),
        });
        assert!(!engine.state().deviated);
        let commands = engine.advance(sample(50.00152, 12.00201));
        assert!(path_requests(&commands).is_empty());

        // Walking further off path does
        let commands = engine.advance(sample(50.0015, 12.004));
        assert_eq!(path_requests(&commands).len(), 1);
    }

    #[test]
    fn test_stale_result_after_skip_is_discarded() {
        let mut engine = engine();
        let request = path_requests(&engine.start()).remove(0);
        engine.advance(sample(50.0, 12.0));
        engine.advance(NavigationEvent::SkipRequested);

        engine.advance(NavigationEvent::PathComputed {
            request_id: request.request_id,
            path: routed(&request.waypoints),
        });
        assert!(engine.path().is_none());
    }

    #[test]
    fn test_results_apply_in_arrival_order() {
        let mut engine = engine();
        let first = started_with_path(&mut engine);
        let deviation = path_requests(&engine.advance(sample(50.0015, 12.002))).remove(0);

        let late = routed(&[Coordinate::new(1.0, 1.0), Coordinate::new(1.0, 1.001)]);
        engine.advance(NavigationEvent::PathComputed {
            request_id: deviation.request_id,
            path: routed(&deviation.waypoints),
        });
        engine.advance(NavigationEvent::PathComputed {
            request_id: first.request_id,
            path: late.clone(),
        });
        assert_eq!(engine.path(), Some(&DisplayPath::Routed(late)));
    }

    #[test]
    fn test_failure_falls_back_to_straight_line() {
        let mut engine = engine();
        let request = path_requests(&engine.start()).remove(0);
        engine.advance(NavigationEvent::PathFailed {
            request_id: request.request_id,
        });

        match engine.path() {
            Some(DisplayPath::StraightLine(points)) => assert_eq!(points.len(), 4),
            other => panic!("expected straight line, got {:?}", other),
        }

        // First fix retries routing (no anchor yet)
        let commands = engine.advance(sample(50.0015, 12.0));
        assert_eq!(path_requests(&commands).len(), 1);
    }

    #[test]
    fn test_failure_retry_is_debounced_by_movement() {
        let mut engine = engine();
        engine.start();
        // One request in flight at a time
        engine.advance(sample(50.0015, 12.0));
        assert!(path_requests(&engine.advance(sample(50.0015, 12.0))).is_empty());

        engine.advance(NavigationEvent::PathFailed { request_id: 1 });
        let retry = path_requests(&engine.advance(sample(50.0015, 12.0))).remove(0);
        assert_eq!(retry.anchor, Some(Coordinate::new(50.0015, 12.0)));

        // The retry fails too; standing still does not hammer the provider
        engine.advance(NavigationEvent::PathFailed {
            request_id: retry.request_id,
        });
        assert!(path_requests(&engine.advance(sample(50.00151, 12.0))).is_empty());

        // Walking on along the fallback line retries
        assert_eq!(path_requests(&engine.advance(sample(50.0021, 12.0))).len(), 1);
    }

    #[test]
    fn test_denied_location_shows_target_card() {
        let mut engine = engine();
        started_with_path(&mut engine);
        engine.advance(NavigationEvent::LocationError(
            GeolocationError::PermissionDenied,
        ));

        let state = engine.state();
        assert_eq!(state.permission, PermissionStatus::Denied);
        assert_eq!(state.nearby.unwrap().id, "a");
        assert!(state.device_location.is_none());

        // Manual mode recomputes right away after a visit
        let commands = engine.advance(NavigationEvent::WaypointVisited("a".to_string()));
        assert_eq!(path_requests(&commands).len(), 1);
        assert_eq!(engine.state().nearby.unwrap().id, "b");
    }

    #[test]
    fn test_timeout_keeps_granted_status() {
        let mut engine = engine();
        engine.advance(sample(50.0, 12.0));
        engine.advance(NavigationEvent::LocationError(GeolocationError::Timeout));
        assert_eq!(engine.state().permission, PermissionStatus::Granted);
        assert!(engine.state().device_location.is_some());

        let mut fresh = self::engine();
        fresh.advance(NavigationEvent::LocationError(GeolocationError::Timeout));
        assert_eq!(fresh.state().permission, PermissionStatus::Unavailable);
    }

    #[test]
    fn test_completion_emitted_once() {
        let mut engine = engine();
        started_with_path(&mut engine);
        engine.advance(NavigationEvent::SkipRequested);
        engine.advance(NavigationEvent::SkipRequested);
        engine.advance(NavigationEvent::SkipRequested);
        let commands = engine.advance(NavigationEvent::SkipRequested);
        assert!(commands.contains(&NavigationCommand::TourComplete));
        assert!(engine.state().complete);

        assert!(engine.advance(NavigationEvent::SkipRequested).is_empty());
        assert!(engine
            .advance(NavigationEvent::WaypointVisited("d".to_string()))
            .is_empty());
        assert!(engine.advance(sample(50.003, 12.0)).is_empty());
    }

    #[test]
    fn test_empty_route_completes_on_start() {
        let mut engine = NavigationEngine::new(
            Route::new("empty", "Empty", Vec::new()),
            NavigationConfig::default(),
        );
        assert_eq!(engine.start(), vec![NavigationCommand::TourComplete]);
    }

    #[test]
    fn test_off_path_connector() {
        let mut engine = engine();
        started_with_path(&mut engine);

        let on_path = place("b", 50.001);
        assert!(engine.off_path_connector(&on_path).is_none());

        let museum = Place::new("museum", "Museum", Coordinate::new(50.001, 12.003));
        let (from, to) = engine.off_path_connector(&museum).unwrap();
        assert_eq!(from, museum.coordinate);
        assert_eq!(to, Coordinate::new(50.001, 12.0));
    }

    #[test]
    fn test_unknown_visit_ignored() {
        let mut engine = engine();
        started_with_path(&mut engine);
        assert!(engine
            .advance(NavigationEvent::WaypointVisited("nowhere".to_string()))
            .is_empty());
        assert!(engine.path().is_some());
    }
}
