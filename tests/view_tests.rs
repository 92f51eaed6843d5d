// SPDX-License-Identifier: MIT

//! Live view reduction tests over the in-memory store.

use std::sync::Arc;
use std::time::Duration;
use ubus_tracker::models::{Location, Role};
use ubus_tracker::services::{views, BusStatusEvent, LiveView, ViewEvent};
use ubus_tracker::store::{DirectoryStore, MemoryDirectory};

mod common;

async fn next(view: &mut ubus_tracker::services::ViewStream) -> ViewEvent {
    tokio::time::timeout(Duration::from_secs(1), view.next_event())
        .await
        .expect("timed out waiting for a view event")
        .expect("view ended unexpectedly")
}

#[tokio::test]
async fn student_without_route_sees_no_route_assigned() {
    let store: Arc<MemoryDirectory> = Arc::new(MemoryDirectory::new());
    let mut view = views::open(
        store.clone(),
        LiveView::Student { route_number: None },
    )
    .await
    .unwrap();

    assert_eq!(
        next(&mut view).await,
        ViewEvent::BusStatus(BusStatusEvent::NoRouteAssigned)
    );
}

#[tokio::test]
async fn student_sees_no_bus_until_one_is_assigned_to_the_route() {
    let store: Arc<MemoryDirectory> = Arc::new(MemoryDirectory::new());
    store
        .create_bus(&common::test_bus("b1", "42", Some("R99"), None))
        .await
        .unwrap();

    let mut view = views::open(
        store.clone(),
        LiveView::Student {
            route_number: Some("R10".to_string()),
        },
    )
    .await
    .unwrap();

    // Another route's bus does not count.
    assert_eq!(
        next(&mut view).await,
        ViewEvent::BusStatus(BusStatusEvent::NoBusForRoute)
    );

    store
        .create_bus(&common::test_bus("b2", "7", Some("R10"), None))
        .await
        .unwrap();

    match next(&mut view).await {
        ViewEvent::BusStatus(BusStatusEvent::Tracking { bus }) => assert_eq!(bus.id, "b2"),
        other => panic!("expected tracking event, got {:?}", other),
    }
}

#[tokio::test]
async fn published_location_round_trips_to_the_student_view() {
    let store: Arc<MemoryDirectory> = Arc::new(MemoryDirectory::new());
    common::seed_driver_with_bus(&store, "d1", "b1").await;

    let mut view = views::open(
        store.clone(),
        LiveView::Student {
            route_number: Some("R10".to_string()),
        },
    )
    .await
    .unwrap();

    // Initial snapshot: bus exists, no trip yet.
    match next(&mut view).await {
        ViewEvent::BusStatus(BusStatusEvent::Tracking { bus }) => {
            assert!(!bus.is_trip_active);
            assert!(bus.location.is_none());
        }
        other => panic!("expected tracking event, got {:?}", other),
    }

    let published = Location::now(30.6837, 76.7308);
    store.publish_location("b1", &published).await.unwrap();

    match next(&mut view).await {
        ViewEvent::BusStatus(BusStatusEvent::Tracking { bus }) => {
            assert!(bus.is_trip_active);
            assert_eq!(bus.location, Some(published), "seen exactly as written");
        }
        other => panic!("expected tracking event, got {:?}", other),
    }
}

#[tokio::test]
async fn first_bus_by_document_id_wins() {
    let store: Arc<MemoryDirectory> = Arc::new(MemoryDirectory::new());
    store
        .create_bus(&common::test_bus("zz", "2", Some("R10"), None))
        .await
        .unwrap();
    store
        .create_bus(&common::test_bus("aa", "1", Some("R10"), None))
        .await
        .unwrap();

    let mut view = views::open(
        store.clone(),
        LiveView::Student {
            route_number: Some("R10".to_string()),
        },
    )
    .await
    .unwrap();

    match next(&mut view).await {
        ViewEvent::BusStatus(BusStatusEvent::Tracking { bus }) => assert_eq!(bus.id, "aa"),
        other => panic!("expected tracking event, got {:?}", other),
    }
}

#[tokio::test]
async fn driver_view_tracks_their_own_bus() {
    let store: Arc<MemoryDirectory> = Arc::new(MemoryDirectory::new());
    let mut view = views::open(
        store.clone(),
        LiveView::Driver {
            uid: "d1".to_string(),
        },
    )
    .await
    .unwrap();

    assert_eq!(
        next(&mut view).await,
        ViewEvent::BusStatus(BusStatusEvent::NoBusAssigned)
    );

    common::seed_driver_with_bus(&store, "d1", "b1").await;
    match next(&mut view).await {
        ViewEvent::BusStatus(BusStatusEvent::Tracking { bus }) => {
            assert_eq!(bus.driver_id.as_deref(), Some("d1"));
        }
        other => panic!("expected tracking event, got {:?}", other),
    }
}

#[tokio::test]
async fn admin_view_streams_all_three_collections() {
    let store: Arc<MemoryDirectory> = Arc::new(MemoryDirectory::new());
    store
        .create_route(&common::test_route("r1", "R10"))
        .await
        .unwrap();
    store
        .create_user(&common::test_user("d1", Role::Driver, None))
        .await
        .unwrap();
    store
        .create_bus(&common::test_bus("b1", "42", None, None))
        .await
        .unwrap();

    let mut view = views::open(store.clone(), LiveView::Admin).await.unwrap();

    // Initial snapshots for all three collections arrive in some order.
    let (mut saw_buses, mut saw_routes, mut saw_drivers) = (false, false, false);
    for _ in 0..3 {
        match next(&mut view).await {
            ViewEvent::Buses { buses } => {
                assert_eq!(buses.len(), 1);
                saw_buses = true;
            }
            ViewEvent::Routes { routes } => {
                assert_eq!(routes.len(), 1);
                saw_routes = true;
            }
            ViewEvent::Drivers { drivers } => {
                assert_eq!(drivers.len(), 1);
                saw_drivers = true;
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
    assert!(saw_buses && saw_routes && saw_drivers);

    // Students never show up in the drivers feed.
    store
        .create_user(&common::test_user("s1", Role::Student, Some("R10")))
        .await
        .unwrap();
    store
        .create_user(&common::test_user("d2", Role::Driver, None))
        .await
        .unwrap();

    match next(&mut view).await {
        ViewEvent::Drivers { drivers } => {
            let uids: Vec<&str> = drivers.iter().map(|d| d.uid.as_str()).collect();
            assert_eq!(uids, vec!["d1", "d2"]);
        }
        other => panic!("expected drivers event, got {:?}", other),
    }
}

#[tokio::test]
async fn dropping_the_view_releases_its_subscriptions() {
    let store: Arc<MemoryDirectory> = Arc::new(MemoryDirectory::new());
    let mut view = views::open(store.clone(), LiveView::Admin).await.unwrap();
    let _ = next(&mut view).await;

    drop(view);
    // Writes after the drop succeed with no consumer attached.
    store
        .create_bus(&common::test_bus("b1", "42", None, None))
        .await
        .unwrap();
}
