// SPDX-License-Identifier: MIT

//! Firestore backend integration tests.
//!
//! These only run against the emulator (`FIRESTORE_EMULATOR_HOST`); without
//! it every test is skipped.

use std::time::Duration;
use ubus_tracker::models::{Location, Role};
use ubus_tracker::store::{BusFilter, DirectoryStore, FirestoreDirectory};

mod common;

async fn test_store() -> FirestoreDirectory {
    FirestoreDirectory::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, ubus_tracker::store::new_document_id())
}

#[tokio::test]
async fn route_crud() {
    require_emulator!();
    let store = test_store().await;

    let route = common::test_route(&unique("r"), "R10");
    store.create_route(&route).await.unwrap();

    let routes = store.list_routes().await.unwrap();
    assert!(routes.iter().any(|r| r.id == route.id));

    store.delete_route(&route.id).await.unwrap();
    let routes = store.list_routes().await.unwrap();
    assert!(!routes.iter().any(|r| r.id == route.id));
}

#[tokio::test]
async fn publish_location_is_a_partial_update() {
    require_emulator!();
    let store = test_store().await;

    let bus_id = unique("b");
    let mut bus = common::test_bus(&bus_id, "42", Some("R10"), Some("d1"));
    bus.route_number = Some(unique("route"));
    store.create_bus(&bus).await.unwrap();

    let location = Location::now(30.6837, 76.7308);
    store.publish_location(&bus_id, &location).await.unwrap();

    let stored = store.get_bus(&bus_id).await.unwrap().unwrap();
    assert!(stored.is_trip_active);
    assert_eq!(stored.location, Some(location));
    // Untouched fields survive the partial update.
    assert_eq!(stored.route_number, bus.route_number);
    assert_eq!(stored.driver_id.as_deref(), Some("d1"));

    store.delete_bus(&bus_id).await.unwrap();
}

#[tokio::test]
async fn driver_query_and_exclusive_assignment() {
    require_emulator!();
    let store = test_store().await;

    let driver_uid = unique("d");
    let b1 = common::test_bus(&unique("b"), "1", None, Some(&driver_uid));
    let b2 = common::test_bus(&unique("b"), "2", None, None);
    store.create_bus(&b1).await.unwrap();
    store.create_bus(&b2).await.unwrap();

    let matching = store
        .query_buses(&BusFilter::Driver(driver_uid.clone()))
        .await
        .unwrap();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].id, b1.id);

    store
        .assign_driver_exclusive(&b2.id, &driver_uid)
        .await
        .unwrap();

    let old = store.get_bus(&b1.id).await.unwrap().unwrap();
    let new = store.get_bus(&b2.id).await.unwrap().unwrap();
    assert_eq!(old.driver_id, None);
    assert_eq!(new.driver_id.as_deref(), Some(&driver_uid[..]));

    store.delete_bus(&b1.id).await.unwrap();
    store.delete_bus(&b2.id).await.unwrap();
}

#[tokio::test]
async fn bus_subscription_delivers_snapshots() {
    require_emulator!();
    let store = test_store().await;

    let route = unique("route");
    let mut sub = store
        .subscribe_buses(BusFilter::Route(route.clone()))
        .await
        .unwrap();

    // Initial snapshot for a fresh route is empty.
    let first = tokio::time::timeout(Duration::from_secs(10), sub.next_snapshot())
        .await
        .expect("timed out waiting for initial snapshot")
        .unwrap();
    assert!(first.is_empty());

    let bus = common::test_bus(&unique("b"), "42", Some(&route), None);
    store.create_bus(&bus).await.unwrap();

    let snap = tokio::time::timeout(Duration::from_secs(10), sub.next_snapshot())
        .await
        .expect("timed out waiting for change snapshot")
        .unwrap();
    assert_eq!(snap.len(), 1);
    assert_eq!(snap[0].id, bus.id);

    sub.cancel();
    store.delete_bus(&bus.id).await.unwrap();
}

#[tokio::test]
async fn user_and_credential_lookup() {
    require_emulator!();
    let store = test_store().await;

    let uid = unique("u");
    let user = common::test_user(&uid, Role::Driver, None);
    store.create_user(&user).await.unwrap();

    let stored = store.get_user(&uid).await.unwrap().unwrap();
    assert_eq!(stored.role, Role::Driver);

    let drivers = store.list_drivers().await.unwrap();
    assert!(drivers.iter().any(|d| d.uid == uid));

    assert!(store
        .get_credential("nobody@campus.test")
        .await
        .unwrap()
        .is_none());
}
