//! Route catalogue helpers for the route selection screen.
//!
//! Display colors, filtering by duration/stop count/features, and the
//! feature list offered as filter options.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{Feature, Route};

/// Display color assigned to a route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteColor {
    #[default]
    Green,
    Orange,
    Blue,
    Red,
    Purple,
    Teal,
    Yellow,
    Pink,
}

impl RouteColor {
    /// Palette in assignment order.
    pub const PALETTE: [RouteColor; 8] = [
        RouteColor::Green,
        RouteColor::Orange,
        RouteColor::Blue,
        RouteColor::Red,
        RouteColor::Purple,
        RouteColor::Teal,
        RouteColor::Yellow,
        RouteColor::Pink,
    ];

    /// Palette color for the route at `index`, cycling.
    pub fn for_index(index: usize) -> Self {
        Self::PALETTE[index % Self::PALETTE.len()]
    }

    /// CSS hex value used when drawing the route.
    pub fn hex(&self) -> &'static str {
        match self {
            RouteColor::Green => "#22c55e",
            RouteColor::Orange => "#f97316",
            RouteColor::Blue => "#3b82f6",
            RouteColor::Red => "#ef4444",
            RouteColor::Purple => "#a855f7",
            RouteColor::Teal => "#14b8a6",
            RouteColor::Yellow => "#eab308",
            RouteColor::Pink => "#ec4899",
        }
    }
}

/// Assign palette colors to routes by position.
pub fn assign_colors(routes: &mut [Route]) {
    for (index, route) in routes.iter_mut().enumerate() {
        route.color = RouteColor::for_index(index);
    }
}

/// Route selection filter. `None` fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteFilter {
    /// Maximum total on-site duration in minutes
    pub max_duration_minutes: Option<u32>,
    pub min_stops: Option<usize>,
    pub max_stops: Option<usize>,
    /// Feature keys that must all be present
    pub features: Vec<String>,
}

impl RouteFilter {
    pub fn matches(&self, route: &Route) -> bool {
        if let Some(max) = self.max_duration_minutes {
            if route.estimated_visit_minutes() > max {
                return false;
            }
        }

        let stops = route.places.len();
        if self.min_stops.is_some_and(|min| stops < min) {
            return false;
        }
        if self.max_stops.is_some_and(|max| stops > max) {
            return false;
        }

        self.features.iter().all(|key| route.has_feature(key))
    }
}

/// Routes matching `filter`, in input order.
pub fn filter_routes<'a>(routes: &'a [Route], filter: &RouteFilter) -> Vec<&'a Route> {
    routes.iter().filter(|r| filter.matches(r)).collect()
}

/// Every distinct feature across `routes`, in first-seen order.
pub fn unique_features(routes: &[Route]) -> Vec<Feature> {
    let mut seen = HashSet::new();
    routes
        .iter()
        .flat_map(|r| r.features.iter())
        .filter(|f| seen.insert(f.key.clone()))
        .cloned()
        .collect()
}
