// SPDX-License-Identifier: MIT

//! In-process directory store.
//!
//! Backs tests and `STORE_BACKEND=memory` local development. All data is
//! volatile. Change fan-out runs over a per-collection broadcast channel;
//! each subscription recomputes its filtered snapshot and suppresses
//! duplicates, so subscribers only see snapshots whose matching set actually
//! changed.

use crate::error::{AppError, Result};
use crate::models::{Bus, Credential, Location, Role, Route, User};
use crate::store::{BusFilter, DirectoryStore, Subscription};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc, oneshot};

#[derive(Default)]
struct Inner {
    users: BTreeMap<String, User>,
    credentials: BTreeMap<String, Credential>,
    routes: BTreeMap<String, Route>,
    buses: BTreeMap<String, Bus>,
}

pub struct MemoryDirectory {
    inner: Arc<Mutex<Inner>>,
    buses_changed: broadcast::Sender<()>,
    routes_changed: broadcast::Sender<()>,
    users_changed: broadcast::Sender<()>,
    /// Fault injection: when set, bus mutations fail with a database error.
    fail_bus_writes: AtomicBool,
    bus_writes: AtomicU64,
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDirectory {
    pub fn new() -> Self {
        let (buses_changed, _) = broadcast::channel(64);
        let (routes_changed, _) = broadcast::channel(64);
        let (users_changed, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            buses_changed,
            routes_changed,
            users_changed,
            fail_bus_writes: AtomicBool::new(false),
            bus_writes: AtomicU64::new(0),
        }
    }

    /// Make subsequent bus writes fail (connectivity-loss simulation).
    pub fn set_fail_bus_writes(&self, fail: bool) {
        self.fail_bus_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of bus mutations applied so far.
    pub fn bus_write_count(&self) -> u64 {
        self.bus_writes.load(Ordering::SeqCst)
    }

    fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
        inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_bus_write(&self) -> Result<()> {
        if self.fail_bus_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database("injected write failure".to_string()));
        }
        Ok(())
    }

    /// Mutate a bus under the lock and notify subscribers.
    fn mutate_bus<F>(&self, bus_id: &str, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Bus),
    {
        self.check_bus_write()?;
        {
            let mut inner = Self::lock(&self.inner);
            let bus = inner
                .buses
                .get_mut(bus_id)
                .ok_or_else(|| AppError::NotFound(format!("Bus {}", bus_id)))?;
            mutate(bus);
        }
        self.bus_writes.fetch_add(1, Ordering::SeqCst);
        let _ = self.buses_changed.send(());
        Ok(())
    }

    /// Spawn a pump that emits the computed snapshot now and after every
    /// change notification, until cancelled or the receiver goes away.
    fn subscribe_with<T, F>(
        &self,
        changed: &broadcast::Sender<()>,
        compute: F,
    ) -> Subscription<T>
    where
        T: Clone + PartialEq + Send + 'static,
        F: Fn(&Inner) -> Vec<T> + Send + 'static,
    {
        let mut change_rx = changed.subscribe();
        let inner = self.inner.clone();
        let (tx, rx) = mpsc::channel::<Vec<T>>(16);
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let mut last: Option<Vec<T>> = None;
            loop {
                let snap = {
                    let guard = Self::lock(&inner);
                    compute(&guard)
                };
                if last.as_ref() != Some(&snap) {
                    if tx.send(snap.clone()).await.is_err() {
                        break;
                    }
                    last = Some(snap);
                }
                tokio::select! {
                    _ = &mut cancel_rx => break,
                    _ = tx.closed() => break,
                    notified = change_rx.recv() => match notified {
                        Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        Subscription::new(rx, cancel_tx)
    }
}

#[async_trait]
impl DirectoryStore for MemoryDirectory {
    async fn create_user(&self, user: &User) -> Result<()> {
        Self::lock(&self.inner)
            .users
            .insert(user.uid.clone(), user.clone());
        let _ = self.users_changed.send(());
        Ok(())
    }

    async fn get_user(&self, uid: &str) -> Result<Option<User>> {
        Ok(Self::lock(&self.inner).users.get(uid).cloned())
    }

    async fn list_drivers(&self) -> Result<Vec<User>> {
        Ok(Self::lock(&self.inner)
            .users
            .values()
            .filter(|u| u.role == Role::Driver)
            .cloned()
            .collect())
    }

    async fn create_credential(&self, credential: &Credential) -> Result<()> {
        Self::lock(&self.inner)
            .credentials
            .insert(credential.email.clone(), credential.clone());
        Ok(())
    }

    async fn get_credential(&self, email: &str) -> Result<Option<Credential>> {
        Ok(Self::lock(&self.inner).credentials.get(email).cloned())
    }

    async fn create_route(&self, route: &Route) -> Result<()> {
        Self::lock(&self.inner)
            .routes
            .insert(route.id.clone(), route.clone());
        let _ = self.routes_changed.send(());
        Ok(())
    }

    async fn delete_route(&self, route_id: &str) -> Result<()> {
        // No cascade: buses referencing the route keep the stale number.
        Self::lock(&self.inner).routes.remove(route_id);
        let _ = self.routes_changed.send(());
        Ok(())
    }

    async fn list_routes(&self) -> Result<Vec<Route>> {
        Ok(Self::lock(&self.inner).routes.values().cloned().collect())
    }

    async fn create_bus(&self, bus: &Bus) -> Result<()> {
        self.check_bus_write()?;
        Self::lock(&self.inner)
            .buses
            .insert(bus.id.clone(), bus.clone());
        self.bus_writes.fetch_add(1, Ordering::SeqCst);
        let _ = self.buses_changed.send(());
        Ok(())
    }

    async fn delete_bus(&self, bus_id: &str) -> Result<()> {
        self.check_bus_write()?;
        Self::lock(&self.inner).buses.remove(bus_id);
        self.bus_writes.fetch_add(1, Ordering::SeqCst);
        let _ = self.buses_changed.send(());
        Ok(())
    }

    async fn get_bus(&self, bus_id: &str) -> Result<Option<Bus>> {
        Ok(Self::lock(&self.inner).buses.get(bus_id).cloned())
    }

    async fn query_buses(&self, filter: &BusFilter) -> Result<Vec<Bus>> {
        Ok(Self::lock(&self.inner)
            .buses
            .values()
            .filter(|bus| filter.matches(bus))
            .cloned()
            .collect())
    }

    async fn publish_location(&self, bus_id: &str, location: &Location) -> Result<()> {
        let location = *location;
        self.mutate_bus(bus_id, |bus| {
            bus.location = Some(location);
            bus.is_trip_active = true;
        })
    }

    async fn set_trip_active(&self, bus_id: &str, active: bool) -> Result<()> {
        self.mutate_bus(bus_id, |bus| {
            bus.is_trip_active = active;
        })
    }

    async fn set_bus_route(&self, bus_id: &str, route_number: Option<&str>) -> Result<()> {
        let route_number = route_number.map(str::to_string);
        self.mutate_bus(bus_id, |bus| {
            bus.route_number = route_number;
        })
    }

    async fn clear_bus_driver(&self, bus_id: &str) -> Result<()> {
        self.mutate_bus(bus_id, |bus| {
            bus.driver_id = None;
        })
    }

    async fn assign_driver_exclusive(&self, bus_id: &str, driver_uid: &str) -> Result<()> {
        self.check_bus_write()?;
        {
            // One critical section: either every clear and the set land, or
            // (on a missing target) nothing does.
            let mut inner = Self::lock(&self.inner);
            if !inner.buses.contains_key(bus_id) {
                return Err(AppError::NotFound(format!("Bus {}", bus_id)));
            }
            for (id, bus) in inner.buses.iter_mut() {
                if id != bus_id && bus.driver_id.as_deref() == Some(driver_uid) {
                    bus.driver_id = None;
                }
            }
            if let Some(bus) = inner.buses.get_mut(bus_id) {
                bus.driver_id = Some(driver_uid.to_string());
            }
        }
        self.bus_writes.fetch_add(1, Ordering::SeqCst);
        let _ = self.buses_changed.send(());
        Ok(())
    }

    async fn subscribe_buses(&self, filter: BusFilter) -> Result<Subscription<Bus>> {
        Ok(self.subscribe_with(&self.buses_changed, move |inner| {
            inner
                .buses
                .values()
                .filter(|bus| filter.matches(bus))
                .cloned()
                .collect()
        }))
    }

    async fn subscribe_routes(&self) -> Result<Subscription<Route>> {
        Ok(self.subscribe_with(&self.routes_changed, |inner| {
            inner.routes.values().cloned().collect()
        }))
    }

    async fn subscribe_drivers(&self) -> Result<Subscription<User>> {
        Ok(self.subscribe_with(&self.users_changed, |inner| {
            inner
                .users
                .values()
                .filter(|u| u.role == Role::Driver)
                .cloned()
                .collect()
        }))
    }
}
