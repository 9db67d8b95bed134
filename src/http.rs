//! HTTP walking-directions provider for OSRM-compatible routers.
//!
//! This module provides:
//! - Request URL construction for the `route` service
//! - Polyline (precision 5) geometry decoding
//! - Optional minimum spacing between request dispatches
//!
//! There are no automatic retries; a failed request is reported to the
//! routing gateway, which falls back to straight-line display.

use std::time::Duration;

use futures::future::BoxFuture;
use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::OsrmConfig;
use crate::error::{Result, TourError};
use crate::gateway::{DirectionsProvider, ProviderRoute};
use crate::Coordinate;

/// Polyline precision used by OSRM's `geometries=polyline`.
const POLYLINE_PRECISION: u32 = 5;

/// OSRM route service response
#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: String,
    distance: f64,
    duration: f64,
}

/// Decode an OSRM route response body into candidate paths.
pub fn parse_osrm_response(body: &str) -> Result<Vec<ProviderRoute>> {
    let response: OsrmResponse = serde_json::from_str(body).map_err(|e| TourError::Decode {
        message: format!("invalid OSRM response: {}", e),
    })?;

    if response.code != "Ok" {
        return Err(TourError::Provider {
            message: response
                .message
                .unwrap_or_else(|| "routing request rejected".to_string()),
            code: response.code,
        });
    }

    response
        .routes
        .into_iter()
        .map(|route| {
            Ok(ProviderRoute {
                geometry: decode_geometry(&route.geometry)?,
                distance_meters: route.distance,
                duration_seconds: route.duration,
            })
        })
        .collect()
}

fn decode_geometry(encoded: &str) -> Result<Vec<Coordinate>> {
    let line = polyline::decode_polyline(encoded, POLYLINE_PRECISION).map_err(|e| {
        TourError::Decode {
            message: format!("invalid polyline: {}", e),
        }
    })?;
    // (x, y) = (lng, lat)
    Ok(line.coords().map(|c| Coordinate::new(c.y, c.x)).collect())
}

/// Walking directions from an OSRM-compatible HTTP router.
pub struct OsrmProvider {
    client: Client,
    config: OsrmConfig,
    last_dispatch: Mutex<Option<Instant>>,
}

impl OsrmProvider {
    /// Create a provider with the given settings.
    pub fn new(config: OsrmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TourError::Http {
                message: format!("Failed to create HTTP client: {}", e),
                status_code: None,
            })?;

        info!(
            "[OsrmProvider] Using {} with profile '{}'",
            config.base_url, config.profile
        );

        Ok(Self {
            client,
            config,
            last_dispatch: Mutex::new(None),
        })
    }

    /// Route service URL for `waypoints` (without query parameters).
    pub fn route_url(&self, waypoints: &[Coordinate]) -> String {
        let coords = waypoints
            .iter()
            .map(|c| format!("{},{}", c.longitude, c.latitude))
            .collect::<Vec<_>>()
            .join(";");
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.profile,
            coords
        )
    }

    /// Wait until the configured interval since the previous dispatch has passed.
    async fn wait_for_slot(&self) {
        let interval = Duration::from_millis(self.config.min_request_interval_ms);
        let mut last = self.last_dispatch.lock().await;

        if let Some(previous) = *last {
            let ready_at = previous + interval;
            let now = Instant::now();
            if ready_at > now {
                debug!("[OsrmProvider] Spacing requests: waiting {:?}", ready_at - now);
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn fetch(&self, waypoints: &[Coordinate]) -> Result<Vec<ProviderRoute>> {
        self.wait_for_slot().await;

        let url = self.route_url(waypoints);
        debug!("[OsrmProvider] GET {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("overview", "full"),
                ("geometries", "polyline"),
                ("steps", "false"),
            ])
            .send()
            .await
            .map_err(|e| TourError::Http {
                message: format!("Request error: {}", e),
                status_code: e.status().map(|s| s.as_u16()),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| TourError::Http {
            message: format!("Failed to read body: {}", e),
            status_code: Some(status.as_u16()),
        })?;

        if !status.is_success() {
            // OSRM reports routing errors (e.g. NoRoute) with a 400 and a JSON body
            return match parse_osrm_response(&body) {
                Err(err @ TourError::Provider { .. }) => Err(err),
                _ => Err(TourError::Http {
                    message: format!("HTTP {}", status),
                    status_code: Some(status.as_u16()),
                }),
            };
        }

        let routes = parse_osrm_response(&body)?;
        if routes.is_empty() {
            warn!("[OsrmProvider] No routes for {} waypoints", waypoints.len());
        }
        Ok(routes)
    }
}

impl DirectionsProvider for OsrmProvider {
    fn walking_directions<'a>(
        &'a self,
        waypoints: &'a [Coordinate],
    ) -> BoxFuture<'a, Result<Vec<ProviderRoute>>> {
        Box::pin(self.fetch(waypoints))
    }
}
