// SPDX-License-Identifier: MIT

//! Signup, login and logout.

use crate::error::Result;
use crate::middleware::auth::{Claims, TOKEN_COOKIE};
use crate::services::{AuthenticatedSession, LoginRequest, SignupRequest};
use crate::AppState;
use axum::{extract::State, http::header, routing::post, Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Serialize;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

fn session_cookie(token: &str) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, token.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(30))
        .build()
}

fn removal_cookie() -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::ZERO)
        .build()
}

async fn signup(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<SignupRequest>,
) -> Result<(CookieJar, Json<AuthenticatedSession>)> {
    let session = state.sessions.signup(request).await?;
    let jar = jar.add(session_cookie(&session.token));
    Ok((jar, Json(session)))
}

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthenticatedSession>)> {
    let session = state.sessions.login(request).await?;
    let jar = jar.add(session_cookie(&session.token));
    Ok((jar, Json(session)))
}

/// Clear the session cookie. If the token still validates, the driver's
/// publisher session is released (dropped without store writes) so no timer
/// outlives the login.
async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: axum::http::HeaderMap,
) -> (CookieJar, Json<MessageResponse>) {
    let token = jar
        .get(TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(|t| t.to_string())
        });

    if let Some(token) = token {
        let key = DecodingKey::from_secret(&state.config.jwt_signing_key);
        if let Ok(data) = decode::<Claims>(&token, &key, &Validation::new(Algorithm::HS256)) {
            state.publisher.release(&data.claims.sub);
        }
    }

    let jar = jar.add(removal_cookie());
    (jar, Json(MessageResponse { message: "Logged out" }))
}
