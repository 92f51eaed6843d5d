// SPDX-License-Identifier: MIT

//! Directory store layer.
//!
//! The store holds four record collections (users, credentials, routes,
//! buses) and offers typed CRUD, equality-filtered queries, live
//! subscriptions, and one multi-document transaction (exclusive driver
//! assignment). Two backends implement the seam: Firestore for production
//! and an in-process store for tests and local development.

pub mod firestore;
pub mod memory;
pub mod snapshot;

pub use firestore::FirestoreDirectory;
pub use memory::MemoryDirectory;

use crate::error::Result;
use crate::models::{Bus, Credential, Location, Route, User};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const CREDENTIALS: &str = "credentials";
    pub const ROUTES: &str = "routes";
    pub const BUSES: &str = "buses";
}

/// Generate a fresh document id (128 random bits, hex).
pub fn new_document_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

/// Equality filter over the buses collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusFilter {
    All,
    /// `route_number == value`
    Route(String),
    /// `driver_id == value`
    Driver(String),
}

impl BusFilter {
    /// Point-in-time match against a bus record.
    pub fn matches(&self, bus: &Bus) -> bool {
        match self {
            BusFilter::All => true,
            BusFilter::Route(route) => bus.route_number.as_deref() == Some(route.as_str()),
            BusFilter::Driver(uid) => bus.driver_id.as_deref() == Some(uid.as_str()),
        }
    }
}

/// The directory store contract the rest of the app is written against.
///
/// Ordering: a subscription delivers snapshots in the order the backend
/// observed writes for that filtered query; there is no ordering guarantee
/// across different subscriptions or collections.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    // ─── Users & credentials ─────────────────────────────────────
    async fn create_user(&self, user: &User) -> Result<()>;
    async fn get_user(&self, uid: &str) -> Result<Option<User>>;
    async fn list_drivers(&self) -> Result<Vec<User>>;
    async fn create_credential(&self, credential: &Credential) -> Result<()>;
    async fn get_credential(&self, email: &str) -> Result<Option<Credential>>;

    // ─── Routes ──────────────────────────────────────────────────
    async fn create_route(&self, route: &Route) -> Result<()>;
    async fn delete_route(&self, route_id: &str) -> Result<()>;
    async fn list_routes(&self) -> Result<Vec<Route>>;

    // ─── Buses ───────────────────────────────────────────────────
    async fn create_bus(&self, bus: &Bus) -> Result<()>;
    async fn delete_bus(&self, bus_id: &str) -> Result<()>;
    async fn get_bus(&self, bus_id: &str) -> Result<Option<Bus>>;
    /// Matching buses ordered by document id ("first result wins" policy is
    /// applied by callers).
    async fn query_buses(&self, filter: &BusFilter) -> Result<Vec<Bus>>;

    /// Publish one position sample: writes `location` and
    /// `is_trip_active = true` together as a partial update.
    async fn publish_location(&self, bus_id: &str, location: &Location) -> Result<()>;
    /// Toggle the trip-active flag; `location` is left untouched.
    async fn set_trip_active(&self, bus_id: &str, active: bool) -> Result<()>;
    /// Assign or clear the bus's route. Last write wins.
    async fn set_bus_route(&self, bus_id: &str, route_number: Option<&str>) -> Result<()>;
    /// Unassign the bus's driver. Direct single-record update.
    async fn clear_bus_driver(&self, bus_id: &str) -> Result<()>;
    /// Assign `driver_uid` to `bus_id` and clear it from every other bus, as
    /// one all-or-nothing transaction. Partial application is never
    /// observable.
    async fn assign_driver_exclusive(&self, bus_id: &str, driver_uid: &str) -> Result<()>;

    // ─── Live subscriptions ──────────────────────────────────────
    async fn subscribe_buses(&self, filter: BusFilter) -> Result<Subscription<Bus>>;
    async fn subscribe_routes(&self) -> Result<Subscription<Route>>;
    /// Users with role `driver`.
    async fn subscribe_drivers(&self) -> Result<Subscription<User>>;
}

/// An owned live-subscription handle.
///
/// Delivers the full current snapshot first, then a new snapshot on every
/// change to the matching set. The underlying listener is released when the
/// handle is cancelled or dropped — including on error paths, so a view that
/// unwinds cannot leak a live connection.
pub struct Subscription<T> {
    rx: mpsc::Receiver<Vec<T>>,
    _guard: SubscriptionGuard,
}

impl<T> Subscription<T> {
    pub fn new(rx: mpsc::Receiver<Vec<T>>, cancel: oneshot::Sender<()>) -> Self {
        Self {
            rx,
            _guard: SubscriptionGuard {
                cancel: Some(cancel),
            },
        }
    }

    /// Next snapshot, or `None` once the subscription has ended.
    pub async fn next_snapshot(&mut self) -> Option<Vec<T>> {
        self.rx.recv().await
    }

    /// Explicitly cancel. Equivalent to dropping the handle.
    pub fn cancel(self) {}

    /// Consume into a stream of snapshots; the listener is released when the
    /// stream is dropped.
    pub fn into_stream(self) -> impl futures_util::Stream<Item = Vec<T>> + Send
    where
        T: Send + 'static,
    {
        futures_util::stream::unfold(self, |mut sub| async move {
            sub.next_snapshot().await.map(|snap| (snap, sub))
        })
    }
}

struct SubscriptionGuard {
    cancel: Option<oneshot::Sender<()>>,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_ids_are_unique_hex() {
        let a = new_document_id();
        let b = new_document_id();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn bus_filter_matches() {
        let mut bus = Bus::new("b1".to_string(), "42".to_string());
        bus.route_number = Some("R10".to_string());
        bus.driver_id = Some("driver-1".to_string());

        assert!(BusFilter::All.matches(&bus));
        assert!(BusFilter::Route("R10".to_string()).matches(&bus));
        assert!(!BusFilter::Route("R11".to_string()).matches(&bus));
        assert!(BusFilter::Driver("driver-1".to_string()).matches(&bus));
        assert!(!BusFilter::Driver("driver-2".to_string()).matches(&bus));

        bus.route_number = None;
        assert!(!BusFilter::Route("R10".to_string()).matches(&bus));
    }
}
