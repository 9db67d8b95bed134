//! # Walking Tour
//!
//! Route path caching and waypoint-proximity navigation for guided walking tours.
//!
//! This library provides:
//! - A route path cache with expiration, FIFO eviction and pluggable storage
//! - A routing gateway that memoizes walking directions from an external provider
//! - A navigation state machine that tracks the walker against the route
//!
//! ## Features
//!
//! - **`persistence`** - SQLite-backed key-value storage for the route cache
//! - **`http`** - OSRM-compatible walking directions provider
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use walking_tour::{Coordinate, NavigationConfig, NavigationEngine, Place, Route};
//!
//! let places = vec![
//!     Place::new("castle", "Castle", Coordinate::new(50.000, 12.000)),
//!     Place::new("market", "Market Square", Coordinate::new(50.001, 12.000)),
//! ];
//! let route = Route::new("old-town", "Old Town", places);
//!
//! let mut engine = NavigationEngine::new(route, NavigationConfig::default());
//! let commands = engine.start();
//! assert_eq!(commands.len(), 1);
//! assert_eq!(engine.state().target.unwrap().id, "castle");
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, StorageError, TourError};

// Geographic utilities (distance, bearing, closest point on path)
pub mod geo_utils;

// Time sources for cache timestamps
pub mod clock;
pub use clock::{Clock, ManualClock, SystemClock};

// FIFO cache for bounded in-memory storage
pub mod fifo_cache;

// Key-value storage backends
pub mod storage;
pub use storage::{KeyValueStore, MemoryStore};

// SQLite-backed key-value storage
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::SqliteStore;

// Route path cache
pub mod route_cache;
pub use route_cache::{CacheConfig, CacheKey, CacheStats, CachedPath, RouteCache, SharedRouteCache};

// Routing gateway and directions provider seam
pub mod gateway;
pub use gateway::{straight_line_path, DirectionsProvider, ProviderRoute, RoutingGateway};

// HTTP directions provider
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::OsrmProvider;

// Tour progress store (visited/skipped sets, trail)
pub mod progress;
pub use progress::{TourProgress, TourSummary};

// Navigation state machine and async session driver
pub mod navigation;
pub use navigation::{
    DisplayPath, GeolocationError, LocationSample, NavigationCommand, NavigationConfig,
    NavigationEngine, NavigationEvent, NavigationState, PathRequest, PermissionStatus,
    TourSession,
};

// Route catalogue helpers (colors, filtering, features)
pub mod catalog;
pub use catalog::{assign_colors, filter_routes, unique_features, RouteColor, RouteFilter};

// Aggregated configuration
pub mod config;
pub use config::{OsrmConfig, TourConfig};

// ============================================================================
// Core Types
// ============================================================================

/// A latitude/longitude pair in degrees.
///
/// # Example
/// ```
/// use walking_tour::Coordinate;
/// let point = Coordinate::new(50.9874, 12.9605);
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Create a new coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the coordinate is within the valid latitude/longitude range.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// A point of interest on a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub coordinate: Coordinate,
    /// Category tag (e.g. "museum", "church")
    #[serde(default)]
    pub category: String,
    /// Estimated time spent on site
    #[serde(default)]
    pub estimated_visit_minutes: u32,
}

impl Place {
    pub fn new(id: impl Into<String>, name: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            coordinate,
            category: String::new(),
            estimated_visit_minutes: 0,
        }
    }

    pub fn with_visit_minutes(mut self, minutes: u32) -> Self {
        self.estimated_visit_minutes = minutes;
        self
    }
}

/// A tag describing a route (e.g. "wheelchair accessible").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Feature {
    pub key: String,
    pub name: String,
}

impl Feature {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
        }
    }
}

/// An ordered sequence of places to walk.
///
/// Place order defines visitation order and the straight-line fallback path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Unique identifier
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Waypoints in visitation order
    pub places: Vec<Place>,
    #[serde(default)]
    pub color: RouteColor,
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl Route {
    pub fn new(id: impl Into<String>, name: impl Into<String>, places: Vec<Place>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            places,
            color: RouteColor::default(),
            features: Vec::new(),
        }
    }

    pub fn with_features(mut self, features: Vec<Feature>) -> Self {
        self.features = features;
        self
    }

    /// A route needs at least two places to have a path.
    pub fn is_routable(&self) -> bool {
        self.places.len() >= 2
    }

    /// Coordinates of all places in route order.
    pub fn waypoints(&self) -> Vec<Coordinate> {
        self.places.iter().map(|p| p.coordinate).collect()
    }

    /// Sum of the estimated on-site durations of all places.
    pub fn estimated_visit_minutes(&self) -> u32 {
        self.places.iter().map(|p| p.estimated_visit_minutes).sum()
    }

    pub fn has_feature(&self, key: &str) -> bool {
        self.features.iter().any(|f| f.key == key)
    }

    pub fn place(&self, id: &str) -> Option<&Place> {
        self.places.iter().find(|p| p.id == id)
    }
}
