// SPDX-License-Identifier: MIT

use std::sync::Arc;
use ubus_tracker::config::Config;
use ubus_tracker::middleware::auth::create_jwt;
use ubus_tracker::models::{Bus, Role, Route, User};
use ubus_tracker::routes::create_router;
use ubus_tracker::store::{DirectoryStore, MemoryDirectory};
use ubus_tracker::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test app over the in-memory store.
/// Returns the router, the shared state, and the raw store for seeding.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>, Arc<MemoryDirectory>) {
    let config = Config::test_default();
    let store = Arc::new(MemoryDirectory::new());
    let state = Arc::new(AppState::new(config, store.clone()));
    (create_router(state.clone()), state, store)
}

/// Create a session token the way the auth routes do.
#[allow(dead_code)]
pub fn create_test_jwt(uid: &str, role: Role, signing_key: &[u8]) -> String {
    create_jwt(uid, role, signing_key).expect("Failed to create JWT")
}

#[allow(dead_code)]
pub fn test_user(uid: &str, role: Role, route_number: Option<&str>) -> User {
    User {
        uid: uid.to_string(),
        email: format!("{}@campus.test", uid),
        role,
        name: uid.to_string(),
        college_id: format!("CID-{}", uid),
        route_number: route_number.map(str::to_string),
    }
}

#[allow(dead_code)]
pub fn test_bus(id: &str, number: &str, route: Option<&str>, driver: Option<&str>) -> Bus {
    let mut bus = Bus::new(id.to_string(), number.to_string());
    bus.route_number = route.map(str::to_string);
    bus.driver_id = driver.map(str::to_string);
    bus
}

#[allow(dead_code)]
pub fn test_route(id: &str, number: &str) -> Route {
    Route {
        id: id.to_string(),
        route_number: number.to_string(),
    }
}

/// Seed a user and a bus assigned to them.
#[allow(dead_code)]
pub async fn seed_driver_with_bus(store: &Arc<MemoryDirectory>, uid: &str, bus_id: &str) {
    store
        .create_user(&test_user(uid, Role::Driver, None))
        .await
        .expect("seed user");
    store
        .create_bus(&test_bus(bus_id, "42", Some("R10"), Some(uid)))
        .await
        .expect("seed bus");
}
