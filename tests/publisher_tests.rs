// SPDX-License-Identifier: MIT

//! Trip publisher state machine tests.
//!
//! These run against the in-memory store with a short publish interval so
//! several timer cycles fit in a few hundred milliseconds.

use std::sync::Arc;
use std::time::Duration;
use ubus_tracker::error::AppError;
use ubus_tracker::services::{
    GeolocationSource, ReportedPositions, SimulatedGeolocation, TripPublisher,
};
use ubus_tracker::store::{DirectoryStore, MemoryDirectory};

mod common;

const INTERVAL: Duration = Duration::from_millis(50);
const GEO_TIMEOUT: Duration = Duration::from_millis(100);

fn publisher(store: &Arc<MemoryDirectory>) -> TripPublisher {
    TripPublisher::new(store.clone(), INTERVAL, GEO_TIMEOUT)
}

fn simulator() -> Arc<dyn GeolocationSource> {
    Arc::new(SimulatedGeolocation::new(None))
}

#[tokio::test]
async fn start_requires_an_assigned_bus() {
    let store = Arc::new(MemoryDirectory::new());
    let publisher = publisher(&store);

    let err = publisher.start_trip("d1", simulator()).await.unwrap_err();
    assert!(matches!(err, AppError::NoBusAssigned));
    assert!(!publisher.is_publishing("d1"));
}

#[tokio::test]
async fn start_publishes_immediately_then_periodically() {
    let store = Arc::new(MemoryDirectory::new());
    common::seed_driver_with_bus(&store, "d1", "b1").await;
    let publisher = publisher(&store);

    let status = publisher.start_trip("d1", simulator()).await.unwrap();
    assert!(status.active);
    assert_eq!(status.bus_id.as_deref(), Some("b1"));

    // First publish lands well before one full interval.
    tokio::time::sleep(INTERVAL / 2).await;
    let bus = store.get_bus("b1").await.unwrap().unwrap();
    assert!(bus.is_trip_active);
    assert!(bus.location.is_some());

    // Several intervals later more cycles have run.
    let writes_after_first = store.bus_write_count();
    tokio::time::sleep(INTERVAL * 4).await;
    assert!(store.bus_write_count() > writes_after_first);

    let status = publisher.status("d1");
    assert!(status.last_published.is_some());
    assert!(status.transient_error.is_none());
}

#[tokio::test]
async fn start_is_idempotent_while_publishing() {
    let store = Arc::new(MemoryDirectory::new());
    common::seed_driver_with_bus(&store, "d1", "b1").await;
    let publisher = publisher(&store);

    publisher.start_trip("d1", simulator()).await.unwrap();
    publisher.start_trip("d1", simulator()).await.unwrap();
    assert_eq!(publisher.session_count(), 1);
}

#[tokio::test]
async fn stop_clears_trip_active_but_keeps_location() {
    let store = Arc::new(MemoryDirectory::new());
    common::seed_driver_with_bus(&store, "d1", "b1").await;
    let publisher = publisher(&store);

    publisher.start_trip("d1", simulator()).await.unwrap();
    tokio::time::sleep(INTERVAL).await;

    let status = publisher.stop_trip("d1").await.unwrap();
    assert!(!status.active);
    assert!(!publisher.is_publishing("d1"));

    let bus = store.get_bus("b1").await.unwrap().unwrap();
    assert!(!bus.is_trip_active);
    assert!(bus.location.is_some(), "last location stays on the record");

    // Stopping again is a no-op.
    publisher.stop_trip("d1").await.unwrap();
}

#[tokio::test]
async fn geolocation_timeouts_do_not_stop_the_timer() {
    let store = Arc::new(MemoryDirectory::new());
    common::seed_driver_with_bus(&store, "d1", "b1").await;
    let publisher = publisher(&store);

    // No device reports yet: every cycle times out.
    let positions = Arc::new(ReportedPositions::new());
    let source: Arc<dyn GeolocationSource> = Arc::new(positions.source_for("d1"));
    publisher.start_trip("d1", source).await.unwrap();

    tokio::time::sleep(GEO_TIMEOUT + INTERVAL * 2).await;
    let status = publisher.status("d1");
    assert!(status.active, "timer keeps running through failures");
    assert!(status.transient_error.is_some());
    assert!(status.last_published.is_none());

    // Device comes back: the next cycle succeeds without a restart.
    let reporter = positions.clone();
    let feed = tokio::spawn(async move {
        for _ in 0..50 {
            reporter.report("d1", 30.6837, 76.7308);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });

    tokio::time::sleep(INTERVAL * 4).await;
    let status = publisher.status("d1");
    assert!(status.last_published.is_some(), "publishing resumed");
    assert!(status.transient_error.is_none());
    feed.abort();
}

#[tokio::test]
async fn write_failures_are_transient() {
    let store = Arc::new(MemoryDirectory::new());
    common::seed_driver_with_bus(&store, "d1", "b1").await;
    let publisher = publisher(&store);

    store.set_fail_bus_writes(true);
    publisher.start_trip("d1", simulator()).await.unwrap();
    tokio::time::sleep(INTERVAL * 3).await;

    let status = publisher.status("d1");
    assert!(status.active);
    assert!(status.transient_error.is_some());
    assert!(status.last_published.is_none(), "no write was confirmed");

    store.set_fail_bus_writes(false);
    tokio::time::sleep(INTERVAL * 3).await;
    let status = publisher.status("d1");
    assert!(status.last_published.is_some());
    assert!(status.transient_error.is_none());
}

#[tokio::test]
async fn release_stops_all_writes_without_touching_the_record() {
    let store = Arc::new(MemoryDirectory::new());
    common::seed_driver_with_bus(&store, "d1", "b1").await;
    let publisher = publisher(&store);

    publisher.start_trip("d1", simulator()).await.unwrap();
    tokio::time::sleep(INTERVAL * 2).await;

    publisher.release("d1");
    assert!(!publisher.is_publishing("d1"));

    // Let any in-flight cycle drain, then confirm writes have stopped.
    tokio::time::sleep(INTERVAL).await;
    let writes = store.bus_write_count();
    tokio::time::sleep(INTERVAL * 4).await;
    assert_eq!(store.bus_write_count(), writes, "no writes after release");

    // Trip-active was not rewritten on the way out.
    let bus = store.get_bus("b1").await.unwrap().unwrap();
    assert!(bus.is_trip_active, "release leaves the flag as last written");
}
