// SPDX-License-Identifier: MIT

//! Driver-side location publisher.
//!
//! One state machine per driver session: `Idle` until a trip starts, then
//! `Publishing` with a wall-clock-periodic timer. Every tick runs an
//! independent sample-and-write cycle; a failed cycle is reported as a
//! transient status and never stops the timer. The session registry
//! guarantees at most one live timer per driver, and `release` drops the
//! timer on logout or teardown without touching the store.

use crate::error::{AppError, Result};
use crate::models::Location;
use crate::services::geolocation::{GeoOptions, GeolocationSource};
use crate::store::{BusFilter, DirectoryStore};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Observable publisher status for one driver session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PublishStatus {
    /// True while the repeating timer is armed
    pub active: bool,
    /// Bus being published to
    pub bus_id: Option<String>,
    /// Last location confirmed written to the store
    pub last_published: Option<Location>,
    /// Most recent transient failure (cleared by the next success)
    pub transient_error: Option<String>,
}

impl PublishStatus {
    fn idle() -> Self {
        Self {
            active: false,
            bus_id: None,
            last_published: None,
            transient_error: None,
        }
    }
}

struct TripSession {
    bus_id: String,
    task: tokio::task::JoinHandle<()>,
    status_rx: watch::Receiver<PublishStatus>,
    /// Set before aborting so an already-sampled cycle skips its write.
    cancelled: Arc<AtomicBool>,
}

/// Session registry and timer owner for all drivers on this instance.
pub struct TripPublisher {
    store: Arc<dyn DirectoryStore>,
    interval: Duration,
    geolocation_timeout: Duration,
    sessions: DashMap<String, TripSession>,
}

impl TripPublisher {
    pub fn new(
        store: Arc<dyn DirectoryStore>,
        interval: Duration,
        geolocation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            interval,
            geolocation_timeout,
            sessions: DashMap::new(),
        }
    }

    /// Start a trip for this driver.
    ///
    /// No-op if already publishing. Requires a bus assigned to the driver
    /// (first result wins when the directory holds more than one). The first
    /// sample-and-publish fires immediately, then on every interval tick.
    pub async fn start_trip(
        &self,
        driver_uid: &str,
        geolocation: Arc<dyn GeolocationSource>,
    ) -> Result<PublishStatus> {
        if let Some(session) = self.sessions.get(driver_uid) {
            return Ok(session.status_rx.borrow().clone());
        }

        let bus = self
            .store
            .query_buses(&BusFilter::Driver(driver_uid.to_string()))
            .await?
            .into_iter()
            .next()
            .ok_or(AppError::NoBusAssigned)?;

        let initial = PublishStatus {
            active: true,
            bus_id: Some(bus.id.clone()),
            last_published: None,
            transient_error: None,
        };
        let (status_tx, status_rx) = watch::channel(initial.clone());
        let cancelled = Arc::new(AtomicBool::new(false));

        // Guard against a racing start: only the thread that wins the vacant
        // entry arms a timer.
        match self.sessions.entry(driver_uid.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                Ok(existing.get().status_rx.borrow().clone())
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let task = tokio::spawn(run_publish_loop(PublishLoop {
                    store: self.store.clone(),
                    geolocation,
                    bus_id: bus.id.clone(),
                    driver_uid: driver_uid.to_string(),
                    interval: self.interval,
                    geolocation_timeout: self.geolocation_timeout,
                    status_tx,
                    cancelled: cancelled.clone(),
                }));
                vacant.insert(TripSession {
                    bus_id: bus.id,
                    task,
                    status_rx,
                    cancelled,
                });
                tracing::info!(driver_uid, "Trip started");
                Ok(initial)
            }
        }
    }

    /// Stop the trip: disarm the timer and clear the trip-active flag. The
    /// last published location is left on the bus record. No-op when idle.
    pub async fn stop_trip(&self, driver_uid: &str) -> Result<PublishStatus> {
        let Some((_, session)) = self.sessions.remove(driver_uid) else {
            return Ok(PublishStatus::idle());
        };

        session.cancelled.store(true, Ordering::SeqCst);
        session.task.abort();
        self.store.set_trip_active(&session.bus_id, false).await?;
        tracing::info!(driver_uid, bus_id = %session.bus_id, "Trip stopped");
        Ok(PublishStatus::idle())
    }

    /// Release the session without writing to the store (logout/teardown).
    /// The trip-active flag stays as last written; no further writes occur.
    pub fn release(&self, driver_uid: &str) {
        if let Some((_, session)) = self.sessions.remove(driver_uid) {
            session.cancelled.store(true, Ordering::SeqCst);
            session.task.abort();
            tracing::info!(driver_uid, "Publisher session released");
        }
    }

    /// Current status for this driver (idle if no session).
    pub fn status(&self, driver_uid: &str) -> PublishStatus {
        self.sessions
            .get(driver_uid)
            .map(|session| session.status_rx.borrow().clone())
            .unwrap_or_else(PublishStatus::idle)
    }

    pub fn is_publishing(&self, driver_uid: &str) -> bool {
        self.sessions.contains_key(driver_uid)
    }

    /// Number of live sessions (one timer each).
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

struct PublishLoop {
    store: Arc<dyn DirectoryStore>,
    geolocation: Arc<dyn GeolocationSource>,
    bus_id: String,
    driver_uid: String,
    interval: Duration,
    geolocation_timeout: Duration,
    status_tx: watch::Sender<PublishStatus>,
    cancelled: Arc<AtomicBool>,
}

async fn run_publish_loop(ctx: PublishLoop) {
    let ctx = Arc::new(ctx);
    let mut ticker = tokio::time::interval(ctx.interval);
    // Ticks are periodic relative to wall clock, not to cycle completion.
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        // First tick completes immediately: the start action publishes once
        // before the regular cadence begins.
        ticker.tick().await;
        if ctx.cancelled.load(Ordering::SeqCst) {
            return;
        }
        // Each cycle is detached so slow I/O never delays the next tick;
        // overlapping writes are last write wins.
        let cycle = ctx.clone();
        tokio::spawn(async move {
            publish_once(&cycle).await;
        });
    }
}

/// One sample-and-write cycle. Failures are transient: they update the
/// status line and leave the timer and prior confirmed state untouched.
async fn publish_once(ctx: &PublishLoop) {
    let options = GeoOptions {
        high_accuracy: true,
        timeout: ctx.geolocation_timeout,
        force_fresh: true,
    };

    // The outer timeout bounds sources that do not enforce their own.
    let sampled = tokio::time::timeout(
        ctx.geolocation_timeout,
        ctx.geolocation.current_position(&options),
    )
    .await
    .unwrap_or(Err(crate::services::geolocation::GeoError::Timeout));

    let position = match sampled {
        Ok(position) => position,
        Err(e) => {
            tracing::warn!(
                driver_uid = %ctx.driver_uid,
                error = %e,
                "Geolocation sample failed, skipping cycle"
            );
            ctx.status_tx.send_modify(|status| {
                status.transient_error = Some(format!("Could not get location: {}", e));
            });
            return;
        }
    };

    let location = Location::now(position.lat, position.lng);

    // Local state is pending until the write resolves; only a confirmed
    // write advances last_published.
    if ctx.cancelled.load(Ordering::SeqCst) {
        return;
    }
    match ctx.store.publish_location(&ctx.bus_id, &location).await {
        Ok(()) => {
            tracing::debug!(
                driver_uid = %ctx.driver_uid,
                bus_id = %ctx.bus_id,
                lat = location.lat,
                lng = location.lng,
                "Location published"
            );
            ctx.status_tx.send_modify(|status| {
                status.last_published = Some(location);
                status.transient_error = None;
            });
        }
        Err(e) => {
            tracing::warn!(
                driver_uid = %ctx.driver_uid,
                bus_id = %ctx.bus_id,
                error = %e,
                "Failed to send location, next tick retries"
            );
            ctx.status_tx.send_modify(|status| {
                status.transient_error = Some("Failed to send location".to_string());
            });
        }
    }
}
