// SPDX-License-Identifier: MIT

pub mod assignment;
pub mod geolocation;
pub mod publisher;
pub mod session;
pub mod views;

pub use assignment::{Assignment, AssignmentCoordinator};
pub use geolocation::{
    DriverPositionSource, GeoOptions, GeolocationSource, Position, ReportedPositions,
    SimulatedGeolocation,
};
pub use publisher::{PublishStatus, TripPublisher};
pub use session::{AuthenticatedSession, LoginRequest, SessionManager, SignupRequest};
pub use views::{BusStatusEvent, LiveView, ViewEvent, ViewStream};
