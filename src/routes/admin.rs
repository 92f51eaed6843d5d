// SPDX-License-Identifier: MIT

//! Admin endpoints: fleet CRUD and assignment changes.

use crate::error::{AppError, Result};
use crate::models::{Bus, Role, Route, User};
use crate::routes::require_role;
use crate::services::Assignment;
use crate::store::{new_document_id, BusFilter};
use crate::AppState;
use axum::http::StatusCode;
use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/admin/routes", post(create_route).get(list_routes))
        .route("/api/admin/routes/{id}", delete(delete_route))
        .route("/api/admin/buses", post(create_bus).get(list_buses))
        .route("/api/admin/buses/{id}", delete(delete_bus))
        .route("/api/admin/buses/{id}/assignment", put(assign_bus))
        .route("/api/admin/drivers", get(list_drivers))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRouteRequest {
    #[validate(length(min = 1, message = "Route number is required"))]
    pub route_number: String,
}

async fn create_route(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<crate::middleware::auth::AuthUser>,
    Json(request): Json<CreateRouteRequest>,
) -> Result<(StatusCode, Json<Route>)> {
    require_role(&auth, Role::Admin)?;
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let route = Route {
        id: new_document_id(),
        route_number: request.route_number.trim().to_string(),
    };
    state.store.create_route(&route).await?;
    tracing::info!(route_id = %route.id, route = %route.route_number, "Route created");
    Ok((StatusCode::CREATED, Json(route)))
}

async fn list_routes(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<crate::middleware::auth::AuthUser>,
) -> Result<Json<Vec<Route>>> {
    require_role(&auth, Role::Admin)?;
    Ok(Json(state.store.list_routes().await?))
}

/// Delete a route record. Buses referencing the route number keep it; route
/// deletion does not cascade.
async fn delete_route(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<crate::middleware::auth::AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    require_role(&auth, Role::Admin)?;
    state.store.delete_route(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBusRequest {
    #[validate(length(min = 1, message = "Bus number is required"))]
    pub bus_number: String,
}

async fn create_bus(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<crate::middleware::auth::AuthUser>,
    Json(request): Json<CreateBusRequest>,
) -> Result<(StatusCode, Json<Bus>)> {
    require_role(&auth, Role::Admin)?;
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let bus = Bus::new(new_document_id(), request.bus_number.trim().to_string());
    state.store.create_bus(&bus).await?;
    tracing::info!(bus_id = %bus.id, bus = %bus.bus_number, "Bus created");
    Ok((StatusCode::CREATED, Json(bus)))
}

async fn list_buses(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<crate::middleware::auth::AuthUser>,
) -> Result<Json<Vec<Bus>>> {
    require_role(&auth, Role::Admin)?;
    Ok(Json(state.store.query_buses(&BusFilter::All).await?))
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<crate::middleware::auth::AuthUser>,
) -> Result<Json<Vec<User>>> {
    require_role(&auth, Role::Admin)?;
    Ok(Json(state.store.list_drivers().await?))
}

async fn delete_bus(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<crate::middleware::auth::AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    require_role(&auth, Role::Admin)?;
    state.store.delete_bus(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// One field change on a bus: `{"field": "route" | "driver", "value": ...}`.
/// An empty or missing value clears the field.
#[derive(Debug, Deserialize)]
pub struct AssignmentRequest {
    pub field: String,
    #[serde(default)]
    pub value: Option<String>,
}

async fn assign_bus(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<crate::middleware::auth::AuthUser>,
    Path(id): Path<String>,
    Json(request): Json<AssignmentRequest>,
) -> Result<Json<Bus>> {
    require_role(&auth, Role::Admin)?;

    // Clients send "" for "unassigned"; normalize to a cleared field.
    let value = request
        .value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let assignment = match request.field.as_str() {
        "route" => Assignment::Route(value),
        "driver" => Assignment::Driver(value),
        other => {
            return Err(AppError::BadRequest(format!(
                "Unknown assignment field: {}",
                other
            )))
        }
    };

    state.assignments.assign(&id, assignment).await?;
    let bus = state
        .store
        .get_bus(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Bus {} not found", id)))?;
    Ok(Json(bus))
}
