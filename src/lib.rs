// SPDX-License-Identifier: MIT

//! UBus: live campus bus tracking
//!
//! This crate provides the backend for a campus bus tracker: students watch
//! the bus on their route, drivers publish their location while a trip is
//! running, and admins manage the fleet and assignments.

pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

use config::Config;
use services::{AssignmentCoordinator, ReportedPositions, SessionManager, TripPublisher};
use std::sync::Arc;
use store::DirectoryStore;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn DirectoryStore>,
    pub sessions: SessionManager,
    pub publisher: TripPublisher,
    pub assignments: AssignmentCoordinator,
    pub reported_positions: Arc<ReportedPositions>,
}

impl AppState {
    /// Wire up the services around a store backend.
    pub fn new(config: Config, store: Arc<dyn DirectoryStore>) -> Self {
        let sessions = SessionManager::new(store.clone(), config.jwt_signing_key.clone());
        let publisher = TripPublisher::new(
            store.clone(),
            config.publish_interval,
            config.geolocation_timeout,
        );
        let assignments = AssignmentCoordinator::new(store.clone());
        Self {
            config,
            store,
            sessions,
            publisher,
            assignments,
            reported_positions: Arc::new(ReportedPositions::new()),
        }
    }
}
