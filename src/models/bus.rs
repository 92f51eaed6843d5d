// SPDX-License-Identifier: MIT

//! Bus and live-location models.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A bus record — the single mutable aggregate holding live trip state.
///
/// Written by the admin (`route_number`, `driver_id`) and by the driver's
/// publisher (`location`, `is_trip_active`); field updates are last write
/// wins. `location` is only meaningful while `is_trip_active` is set; a stale
/// location may remain after a trip stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Bus {
    /// Document id
    pub id: String,
    /// License plate / fleet number
    pub bus_number: String,
    /// Assigned route, by route number (null until assigned)
    pub route_number: Option<String>,
    /// Uid of the assigned driver; at most one bus holds a given uid
    pub driver_id: Option<String>,
    /// Whether the driver is currently publishing location
    pub is_trip_active: bool,
    /// Last published position
    pub location: Option<Location>,
}

impl Bus {
    /// A freshly created bus: nothing assigned, trip inactive.
    pub fn new(id: String, bus_number: String) -> Self {
        Self {
            id,
            bus_number,
            route_number: None,
            driver_id: None,
            is_trip_active: false,
            location: None,
        }
    }
}

/// A single position sample. Always replaced as a whole unit, never merged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    /// Epoch milliseconds at sample time
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub timestamp: i64,
}

impl Location {
    /// A sample taken now.
    pub fn now(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Map marker payload: the point plus a formatted-timestamp label.
    pub fn marker(&self) -> MapMarker {
        let label = chrono::DateTime::from_timestamp_millis(self.timestamp)
            .map(|dt| format!("Last update: {}", dt.format("%H:%M:%S UTC")))
            .unwrap_or_else(|| "Last update: unknown".to_string());
        MapMarker {
            lat: self.lat,
            lng: self.lng,
            label,
        }
    }
}

/// Input shape for the map presentation layer: one point, recentered on
/// every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MapMarker {
    pub lat: f64,
    pub lng: f64,
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_bus_has_nothing_assigned() {
        let bus = Bus::new("b1".to_string(), "PB 01 9999".to_string());
        assert_eq!(bus.route_number, None);
        assert_eq!(bus.driver_id, None);
        assert!(!bus.is_trip_active);
        assert!(bus.location.is_none());
    }

    #[test]
    fn null_assignments_serialize_explicitly() {
        // The store relies on explicit nulls to clear assignment fields.
        let bus = Bus::new("b1".to_string(), "PB 01 9999".to_string());
        let json = serde_json::to_value(&bus).unwrap();
        assert!(json["route_number"].is_null());
        assert!(json["driver_id"].is_null());
        assert!(json["location"].is_null());
    }

    #[test]
    fn marker_labels_the_timestamp() {
        let loc = Location {
            lat: 30.6837,
            lng: 76.7308,
            timestamp: 1_700_000_000_000,
        };
        let marker = loc.marker();
        assert_eq!(marker.lat, loc.lat);
        assert_eq!(marker.lng, loc.lng);
        assert!(marker.label.starts_with("Last update: "));
        assert!(marker.label.contains("UTC"));
    }

    #[test]
    fn location_roundtrips_through_json() {
        let loc = Location::now(30.0, 76.0);
        let back: Location = serde_json::from_str(&serde_json::to_string(&loc).unwrap()).unwrap();
        assert_eq!(back, loc);
    }
}
