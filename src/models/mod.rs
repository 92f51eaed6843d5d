// SPDX-License-Identifier: MIT

//! Data models for the application.

pub mod bus;
pub mod route;
pub mod user;

pub use bus::{Bus, Location, MapMarker};
pub use route::Route;
pub use user::{Credential, Role, User};
