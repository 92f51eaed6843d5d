// SPDX-License-Identifier: MIT

//! Driver endpoints: trip control and device position reports.

use crate::error::{AppError, Result};
use crate::models::Role;
use crate::routes::require_role;
use crate::services::{
    BusStatusEvent, GeolocationSource, Position, PublishStatus, SimulatedGeolocation,
};
use crate::store::BusFilter;
use crate::AppState;
use axum::http::StatusCode;
use axum::{
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/driver/bus", get(bus_status))
        .route("/api/driver/trip", get(trip_status))
        .route("/api/driver/trip/start", post(start_trip))
        .route("/api/driver/trip/stop", post(stop_trip))
        .route("/api/driver/position", post(report_position))
}

/// Point-in-time status of the bus assigned to this driver.
async fn bus_status(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<crate::middleware::auth::AuthUser>,
) -> Result<Json<BusStatusEvent>> {
    require_role(&auth, Role::Driver)?;
    let status = match state
        .store
        .query_buses(&BusFilter::Driver(auth.uid.clone()))
        .await?
        .into_iter()
        .next()
    {
        Some(bus) => BusStatusEvent::Tracking { bus },
        None => BusStatusEvent::NoBusAssigned,
    };
    Ok(Json(status))
}

async fn trip_status(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<crate::middleware::auth::AuthUser>,
) -> Result<Json<PublishStatus>> {
    require_role(&auth, Role::Driver)?;
    Ok(Json(state.publisher.status(&auth.uid)))
}

/// Start publishing. No-op if a trip is already running.
async fn start_trip(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<crate::middleware::auth::AuthUser>,
) -> Result<Json<PublishStatus>> {
    require_role(&auth, Role::Driver)?;

    let geolocation: Arc<dyn GeolocationSource> = if state.config.simulate_geolocation {
        // Seed the walk from the bus's last known location when there is one.
        let seed = state
            .store
            .query_buses(&BusFilter::Driver(auth.uid.clone()))
            .await?
            .into_iter()
            .next()
            .and_then(|bus| bus.location)
            .map(|location| Position {
                lat: location.lat,
                lng: location.lng,
            });
        Arc::new(SimulatedGeolocation::new(seed))
    } else {
        Arc::new(state.reported_positions.source_for(&auth.uid))
    };

    let status = state.publisher.start_trip(&auth.uid, geolocation).await?;
    Ok(Json(status))
}

/// Stop publishing and mark the trip inactive. No-op when idle.
async fn stop_trip(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<crate::middleware::auth::AuthUser>,
) -> Result<Json<PublishStatus>> {
    require_role(&auth, Role::Driver)?;
    Ok(Json(state.publisher.stop_trip(&auth.uid).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct PositionReport {
    #[validate(range(min = -90.0, max = 90.0, message = "Latitude out of range"))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0, message = "Longitude out of range"))]
    pub lng: f64,
}

/// Accept a raw position fix from the driver's device. The publisher picks
/// up fresh fixes on its own cadence.
async fn report_position(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<crate::middleware::auth::AuthUser>,
    Json(report): Json<PositionReport>,
) -> Result<StatusCode> {
    require_role(&auth, Role::Driver)?;
    report
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    state.reported_positions.report(&auth.uid, report.lat, report.lng);
    Ok(StatusCode::NO_CONTENT)
}
