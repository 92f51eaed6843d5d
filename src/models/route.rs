//! Route model.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A bus route, identified to riders by its route number.
///
/// Deleting a route does not cascade to buses that reference it; buses keep
/// the stale route number until reassigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Route {
    /// Document id
    pub id: String,
    /// Rider-facing route number, e.g. "R10"
    pub route_number: String,
}
