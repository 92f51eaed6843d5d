// SPDX-License-Identifier: MIT

//! Geolocation source seam (device boundary).
//!
//! The publisher samples positions through [`GeolocationSource`]. Two
//! implementations ship: positions reported by the driver's device over
//! HTTP, and the desktop-testing random-walk simulator.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Options for one sample acquisition.
#[derive(Debug, Clone, Copy)]
pub struct GeoOptions {
    /// Request best available accuracy
    pub high_accuracy: bool,
    /// Bounded wait for a fix
    pub timeout: Duration,
    /// Reject cached fixes; only accept one taken at/after this request
    pub force_fresh: bool,
}

/// A raw position fix (no timestamp; the publisher stamps samples).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

/// Errors from sample acquisition. All of them are transient from the
/// publisher's point of view: the cycle is skipped and the timer keeps
/// running.
#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("Timed out waiting for a position fix")]
    Timeout,

    #[error("Position source unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait GeolocationSource: Send + Sync {
    async fn current_position(&self, options: &GeoOptions) -> Result<Position, GeoError>;
}

// ─── Device-reported positions ───────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Fix {
    position: Position,
    /// Epoch millis when the device report arrived
    reported_at: i64,
}

/// Fan-in for positions reported by driver devices.
///
/// Each driver uid gets a watch channel holding the latest fix; a
/// [`DriverPositionSource`] waits on that channel with freshness rules.
#[derive(Default)]
pub struct ReportedPositions {
    channels: DashMap<String, watch::Sender<Option<Fix>>>,
}

impl ReportedPositions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a device report for this driver.
    pub fn report(&self, driver_uid: &str, lat: f64, lng: f64) {
        let fix = Fix {
            position: Position { lat, lng },
            reported_at: chrono::Utc::now().timestamp_millis(),
        };
        let sender = self
            .channels
            .entry(driver_uid.to_string())
            .or_insert_with(|| watch::channel(None).0);
        let _ = sender.send(Some(fix));
    }

    fn watch(&self, driver_uid: &str) -> watch::Receiver<Option<Fix>> {
        self.channels
            .entry(driver_uid.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }

    /// A per-driver source view over this fan-in.
    pub fn source_for(self: &Arc<Self>, driver_uid: &str) -> DriverPositionSource {
        DriverPositionSource {
            positions: self.clone(),
            driver_uid: driver_uid.to_string(),
        }
    }
}

/// Geolocation source backed by one driver's device reports.
pub struct DriverPositionSource {
    positions: Arc<ReportedPositions>,
    driver_uid: String,
}

#[async_trait]
impl GeolocationSource for DriverPositionSource {
    async fn current_position(&self, options: &GeoOptions) -> Result<Position, GeoError> {
        let requested_at = chrono::Utc::now().timestamp_millis();
        let mut rx = self.positions.watch(&self.driver_uid);

        let wait = async {
            loop {
                let current: Option<Fix> = *rx.borrow_and_update();
                let usable = current
                    .filter(|fix| !options.force_fresh || fix.reported_at >= requested_at);
                if let Some(fix) = usable {
                    return Ok(fix.position);
                }
                if rx.changed().await.is_err() {
                    return Err(GeoError::Unavailable(
                        "position channel closed".to_string(),
                    ));
                }
            }
        };

        tokio::time::timeout(options.timeout, wait)
            .await
            .map_err(|_| GeoError::Timeout)?
    }
}

// ─── Random-walk simulator ───────────────────────────────────────

/// Default fallback center: the campus (same as the original's desktop
/// testing path).
pub const DEFAULT_CENTER: Position = Position {
    lat: 30.6837,
    lng: 76.7308,
};

/// Simulated geolocation for development without a device: each sample is a
/// small random step from the previous one.
pub struct SimulatedGeolocation {
    center: Mutex<Position>,
}

impl SimulatedGeolocation {
    /// `center` seeds the walk; pass the last known bus location when there
    /// is one.
    pub fn new(center: Option<Position>) -> Self {
        Self {
            center: Mutex::new(center.unwrap_or(DEFAULT_CENTER)),
        }
    }
}

#[async_trait]
impl GeolocationSource for SimulatedGeolocation {
    async fn current_position(&self, _options: &GeoOptions) -> Result<Position, GeoError> {
        let mut center = self
            .center
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        center.lat += (rand::random::<f64>() - 0.5) * 0.001;
        center.lng += (rand::random::<f64>() - 0.5) * 0.001;
        Ok(*center)
    }
}
