// SPDX-License-Identifier: MIT

//! Live view stream over server-sent events.
//!
//! One endpoint serves all roles; the view opened depends on the caller's
//! profile. Closing the connection drops the stream, which cancels the
//! underlying store subscriptions.

use crate::error::Result;
use crate::services::{views, LiveView};
use crate::AppState;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{extract::State, routing::get, Extension, Router};
use futures_util::{Stream, StreamExt};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/live", get(live))
}

async fn live(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<crate::middleware::auth::AuthUser>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    let user = state.sessions.current_user(&auth.uid).await?;
    let view = LiveView::for_user(&user);
    tracing::debug!(uid = %user.uid, ?view, "Live view opened");

    let stream = views::open(state.store.clone(), view)
        .await?
        .into_stream()
        .map(|event| Event::default().json_data(&event));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
