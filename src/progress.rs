//! Tour progress store.
//!
//! One [`TourProgress`] per active guided tour: which places were visited,
//! which were skipped, and the trail of device positions walked so far.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::geo_utils::polyline_length;
use crate::{Coordinate, Route};

/// Default bound on recorded trail points.
pub const DEFAULT_MAX_TRAIL_POINTS: usize = 500;

/// Visited/skipped sets and walked trail for one tour session.
#[derive(Debug, Clone)]
pub struct TourProgress {
    route_id: Option<String>,
    visited: HashSet<String>,
    skipped: HashSet<String>,
    trail: VecDeque<Coordinate>,
    max_trail_points: usize,
}

/// Completion summary for a finished (or abandoned) tour.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TourSummary {
    pub route_id: String,
    pub visited: usize,
    pub skipped: usize,
    pub total_stops: usize,
    /// Length of the recorded trail
    pub walked_meters: f64,
}

impl Default for TourProgress {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRAIL_POINTS)
    }
}

impl TourProgress {
    pub fn new(max_trail_points: usize) -> Self {
        Self {
            route_id: None,
            visited: HashSet::new(),
            skipped: HashSet::new(),
            trail: VecDeque::new(),
            max_trail_points: max_trail_points.max(1),
        }
    }

    /// Begin a tour of `route_id`, discarding any previous progress.
    pub fn start(&mut self, route_id: &str) {
        self.clear();
        self.route_id = Some(route_id.to_string());
    }

    /// End the tour and forget everything.
    pub fn clear(&mut self) {
        self.route_id = None;
        self.visited.clear();
        self.skipped.clear();
        self.trail.clear();
    }

    pub fn route_id(&self) -> Option<&str> {
        self.route_id.as_deref()
    }

    /// Mark a place visited. Returns false if it already was.
    pub fn mark_visited(&mut self, place_id: &str) -> bool {
        self.visited.insert(place_id.to_string())
    }

    /// Mark a place skipped. Returns false if it already was.
    pub fn mark_skipped(&mut self, place_id: &str) -> bool {
        self.skipped.insert(place_id.to_string())
    }

    pub fn is_visited(&self, place_id: &str) -> bool {
        self.visited.contains(place_id)
    }

    pub fn is_skipped(&self, place_id: &str) -> bool {
        self.skipped.contains(place_id)
    }

    /// Visited or skipped.
    pub fn is_resolved(&self, place_id: &str) -> bool {
        self.is_visited(place_id) || self.is_skipped(place_id)
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Append a device position, dropping the oldest beyond the bound.
    pub fn record_position(&mut self, position: Coordinate) {
        if self.trail.len() >= self.max_trail_points {
            self.trail.pop_front();
        }
        self.trail.push_back(position);
    }

    /// Recorded positions, oldest first.
    pub fn trail(&self) -> Vec<Coordinate> {
        self.trail.iter().copied().collect()
    }

    /// Summary of progress along `route`.
    pub fn summary(&self, route: &Route) -> TourSummary {
        let count = |set: &HashSet<String>| {
            route.places.iter().filter(|p| set.contains(&p.id)).count()
        };
        TourSummary {
            route_id: route.id.clone(),
            visited: count(&self.visited),
            skipped: count(&self.skipped),
            total_stops: route.places.len(),
            walked_meters: polyline_length(&self.trail()),
        }
    }
}
