// SPDX-License-Identifier: MIT

//! Student endpoints: the one bus on the student's route.

use crate::error::Result;
use crate::models::{MapMarker, Role};
use crate::routes::require_role;
use crate::services::BusStatusEvent;
use crate::store::BusFilter;
use crate::AppState;
use axum::{extract::State, routing::get, Extension, Json, Router};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/student/bus", get(bus_status))
        .route("/api/student/map", get(map_marker))
}

async fn current_status(
    state: &AppState,
    uid: &str,
) -> Result<BusStatusEvent> {
    let user = state.sessions.current_user(uid).await?;
    let Some(route) = user.route_number else {
        return Ok(BusStatusEvent::NoRouteAssigned);
    };
    let status = match state
        .store
        .query_buses(&BusFilter::Route(route))
        .await?
        .into_iter()
        .next()
    {
        Some(bus) => BusStatusEvent::Tracking { bus },
        None => BusStatusEvent::NoBusForRoute,
    };
    Ok(status)
}

/// Point-in-time status of the bus on the student's route.
async fn bus_status(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<crate::middleware::auth::AuthUser>,
) -> Result<Json<BusStatusEvent>> {
    require_role(&auth, Role::Student)?;
    Ok(Json(current_status(&state, &auth.uid).await?))
}

/// Map marker for the tracked bus. `null` while no trip is active or no
/// location has been published yet.
async fn map_marker(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<crate::middleware::auth::AuthUser>,
) -> Result<Json<Option<MapMarker>>> {
    require_role(&auth, Role::Student)?;
    let marker = match current_status(&state, &auth.uid).await? {
        BusStatusEvent::Tracking { bus } if bus.is_trip_active => {
            bus.location.as_ref().map(|location| location.marker())
        }
        _ => None,
    };
    Ok(Json(marker))
}
