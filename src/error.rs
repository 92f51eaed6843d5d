// SPDX-License-Identifier: MIT

//! Application error types with consistent API responses.
//!
//! Every failure is caught at the operation boundary and converted to a
//! user-visible message; nothing propagates as an uncaught fault. The worst
//! case is a forced logout (`ProfileMissing`).

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // ─── Identity errors (non-fatal, form stays editable) ────────
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email is already in use")]
    EmailInUse,

    #[error("Admin accounts cannot be created from the sign-up page")]
    SignupDisabled,

    // ─── Session errors ──────────────────────────────────────────
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("This operation requires a {0} account")]
    Forbidden(&'static str),

    /// Authenticated identity with no matching User record. Fatal to the
    /// session: the response clears the session cookie (forced logout).
    #[error("No profile found for this account")]
    ProfileMissing,

    // ─── Request/resource errors ─────────────────────────────────
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    // ─── Live data errors ────────────────────────────────────────
    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Could not get location: {0}")]
    Geolocation(String),

    #[error("No bus is assigned to this driver")]
    NoBusAssigned,

    #[error("Failed to update assignment: {0}")]
    Assignment(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "invalid_credentials", None)
            }
            AppError::EmailInUse => (StatusCode::CONFLICT, "email_in_use", None),
            AppError::SignupDisabled => (
                StatusCode::FORBIDDEN,
                "signup_disabled",
                Some(self.to_string()),
            ),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::Forbidden(_) => {
                (StatusCode::FORBIDDEN, "forbidden", Some(self.to_string()))
            }
            AppError::ProfileMissing => {
                tracing::error!("Authenticated identity has no profile record, forcing logout");
                (StatusCode::UNAUTHORIZED, "profile_missing", None)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Subscription(msg) => {
                tracing::error!(error = %msg, "Subscription error");
                (StatusCode::SERVICE_UNAVAILABLE, "subscription_error", None)
            }
            AppError::Geolocation(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "geolocation_error",
                Some(msg.clone()),
            ),
            AppError::NoBusAssigned => (
                StatusCode::CONFLICT,
                "no_bus_assigned",
                Some(self.to_string()),
            ),
            AppError::Assignment(msg) => {
                tracing::error!(error = %msg, "Assignment transaction failed");
                (StatusCode::CONFLICT, "assignment_failed", None)
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let forced_logout = matches!(self, AppError::ProfileMissing);

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        let mut response = (status, Json(body)).into_response();
        if forced_logout {
            // Deterministically release the session on directory
            // inconsistency: the cookie is removed with the error.
            response.headers_mut().insert(
                header::SET_COOKIE,
                HeaderValue::from_static(
                    "ubus_token=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax",
                ),
            );
        }
        response
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
