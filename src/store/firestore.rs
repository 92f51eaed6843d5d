// SPDX-License-Identifier: MIT

//! Firestore-backed directory store.
//!
//! Typed operations over the `users`, `credentials`, `routes` and `buses`
//! collections. Live subscriptions use Firestore listeners reduced to
//! whole-snapshot deliveries; the exclusive driver assignment uses a
//! Firestore transaction so partial application is never observable.

use crate::error::{AppError, Result};
use crate::models::{Bus, Credential, Location, Role, Route, User};
use crate::store::snapshot::SnapshotMap;
use crate::store::{collections, BusFilter, DirectoryStore, Subscription};
use async_trait::async_trait;
use firestore::{
    paths, FirestoreListenEvent, FirestoreListenerTarget, FirestoreTempFilesListenStateStorage,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

/// Firestore directory store client.
pub struct FirestoreDirectory {
    client: firestore::FirestoreDb,
    next_target: AtomicU32,
}

impl FirestoreDirectory {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self> {
        // If the emulator environment variable is set, use unauthenticated
        // connection to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client,
            next_target: AtomicU32::new(1),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client,
            next_target: AtomicU32::new(1),
        })
    }

    /// Upsert a full document.
    async fn upsert<T: Serialize + DeserializeOwned + Sync + Send>(
        &self,
        collection: &str,
        document_id: &str,
        object: &T,
    ) -> Result<()> {
        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(collection)
            .document_id(document_id)
            .object(object)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn get_by_id<T: DeserializeOwned + Send>(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<Option<T>> {
        self.client
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(document_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn delete_by_id(&self, collection: &str, document_id: &str) -> Result<()> {
        self.client
            .fluent()
            .delete()
            .from(collection)
            .document_id(document_id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Point-in-time query with an optional single equality filter.
    /// Results come back in default (document id) order.
    async fn query_collection<T: DeserializeOwned + Send>(
        &self,
        collection: &str,
        filter: Option<(&'static str, String)>,
    ) -> Result<Vec<T>> {
        let query = self
            .client
            .fluent()
            .select()
            .from(collection)
            .filter(move |q| {
                filter
                    .as_ref()
                    .and_then(|(field, value)| q.field(*field).eq(value.clone()))
            });
        query
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Open a listener for a collection slice and pump whole snapshots into
    /// a [`Subscription`]. The listener is shut down when the subscription
    /// handle is cancelled or dropped.
    async fn subscribe_collection<T>(
        &self,
        collection: &'static str,
        filter: Option<(&'static str, String)>,
        id_of: fn(&T) -> &str,
    ) -> Result<Subscription<T>>
    where
        T: DeserializeOwned + Serialize + Clone + PartialEq + Send + Sync + 'static,
    {
        let db = self.client.clone();
        let target_id = self.next_target.fetch_add(1, Ordering::Relaxed);

        let mut listener = db
            .create_listener(FirestoreTempFilesListenStateStorage::new())
            .await
            .map_err(|e| AppError::Subscription(e.to_string()))?;

        // Seed with the current matching set so the first delivery is a full
        // snapshot even if the listener resumes from a stored token.
        let initial: Vec<T> = self.query_collection(collection, filter.clone()).await?;

        let listen_filter = filter.clone();
        db.fluent()
            .select()
            .from(collection)
            .filter(move |q| {
                listen_filter
                    .as_ref()
                    .and_then(|(field, value)| q.field(*field).eq(value.clone()))
            })
            .listen()
            .add_target(FirestoreListenerTarget::new(target_id), &mut listener)
            .map_err(|e| AppError::Subscription(e.to_string()))?;

        let (tx, rx) = mpsc::channel::<Vec<T>>(16);
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

        let state = Arc::new(Mutex::new(ListenState {
            docs: SnapshotMap::seed(
                initial
                    .iter()
                    .map(|doc| (id_of(doc).to_string(), doc.clone())),
            ),
            last_sent: None,
        }));

        // First delivery: the full current snapshot.
        let first = snapshot_if_changed(&state);
        if let Some(snap) = first {
            let _ = tx.send(snap).await;
        }

        let event_state = state.clone();
        let event_tx = tx.clone();
        listener
            .start(move |event| {
                let state = event_state.clone();
                let tx = event_tx.clone();
                async move {
                    match event {
                        FirestoreListenEvent::DocumentChange(ref change) => {
                            if let Some(doc) = &change.document {
                                match firestore::FirestoreDb::deserialize_doc_to::<T>(doc) {
                                    Ok(obj) => {
                                        let id = document_id_from_path(&doc.name);
                                        apply(&state, |docs| docs.upsert(id, obj));
                                    }
                                    Err(e) => {
                                        tracing::warn!(
                                            collection,
                                            error = %e,
                                            "Failed to deserialize change document"
                                        );
                                    }
                                }
                            }
                        }
                        FirestoreListenEvent::DocumentDelete(ref deleted) => {
                            let id = document_id_from_path(&deleted.document);
                            apply(&state, |docs| {
                                docs.remove(&id);
                            });
                        }
                        FirestoreListenEvent::DocumentRemove(ref removed) => {
                            let id = document_id_from_path(&removed.document);
                            apply(&state, |docs| {
                                docs.remove(&id);
                            });
                        }
                        _ => {}
                    }

                    if let Some(snap) = snapshot_if_changed(&state) {
                        let _ = tx.send(snap).await;
                    }
                    Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
                }
            })
            .await
            .map_err(|e| AppError::Subscription(e.to_string()))?;

        // The shutdown task owns the listener; cancelling the subscription
        // (or dropping it) releases the live connection.
        tokio::spawn(async move {
            let _ = cancel_rx.await;
            if let Err(e) = listener.shutdown().await {
                tracing::warn!(collection, error = %e, "Listener shutdown failed");
            }
        });

        Ok(Subscription::new(rx, cancel_tx))
    }
}

struct ListenState<T> {
    docs: SnapshotMap<T>,
    last_sent: Option<Vec<T>>,
}

fn apply<T: Clone>(state: &Arc<Mutex<ListenState<T>>>, f: impl FnOnce(&mut SnapshotMap<T>)) {
    let mut guard = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut guard.docs);
}

/// Snapshot to deliver, or `None` when it equals the last one sent.
/// Duplicate suppression covers the listener's initial re-delivery of
/// documents already captured by the seed query.
fn snapshot_if_changed<T: Clone + PartialEq>(
    state: &Arc<Mutex<ListenState<T>>>,
) -> Option<Vec<T>> {
    let mut guard = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let snap = guard.docs.snapshot();
    if guard.last_sent.as_ref() == Some(&snap) {
        None
    } else {
        guard.last_sent = Some(snap.clone());
        Some(snap)
    }
}

/// Extract the document id from a full Firestore resource name.
fn document_id_from_path(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// Partial-update payloads. Only the listed fields are written; the rest of
/// the bus document is left untouched.
#[derive(Serialize, Deserialize)]
struct LocationPatch {
    location: Location,
    is_trip_active: bool,
}

#[derive(Serialize, Deserialize)]
struct TripActivePatch {
    is_trip_active: bool,
}

#[derive(Serialize, Deserialize)]
struct RoutePatch {
    route_number: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct DriverPatch {
    driver_id: Option<String>,
}

#[async_trait]
impl DirectoryStore for FirestoreDirectory {
    async fn create_user(&self, user: &User) -> Result<()> {
        self.upsert(collections::USERS, &user.uid, user).await
    }

    async fn get_user(&self, uid: &str) -> Result<Option<User>> {
        self.get_by_id(collections::USERS, uid).await
    }

    async fn list_drivers(&self) -> Result<Vec<User>> {
        self.query_collection(
            collections::USERS,
            Some(("role", Role::Driver.as_str().to_string())),
        )
        .await
    }

    async fn create_credential(&self, credential: &Credential) -> Result<()> {
        let doc_id = urlencoding::encode(&credential.email).into_owned();
        self.upsert(collections::CREDENTIALS, &doc_id, credential)
            .await
    }

    async fn get_credential(&self, email: &str) -> Result<Option<Credential>> {
        let doc_id = urlencoding::encode(email).into_owned();
        self.get_by_id(collections::CREDENTIALS, &doc_id).await
    }

    async fn create_route(&self, route: &Route) -> Result<()> {
        self.upsert(collections::ROUTES, &route.id, route).await
    }

    async fn delete_route(&self, route_id: &str) -> Result<()> {
        // No cascade: buses referencing the route keep the stale number.
        self.delete_by_id(collections::ROUTES, route_id).await
    }

    async fn list_routes(&self) -> Result<Vec<Route>> {
        self.query_collection(collections::ROUTES, None).await
    }

    async fn create_bus(&self, bus: &Bus) -> Result<()> {
        self.upsert(collections::BUSES, &bus.id, bus).await
    }

    async fn delete_bus(&self, bus_id: &str) -> Result<()> {
        self.delete_by_id(collections::BUSES, bus_id).await
    }

    async fn get_bus(&self, bus_id: &str) -> Result<Option<Bus>> {
        self.get_by_id(collections::BUSES, bus_id).await
    }

    async fn query_buses(&self, filter: &BusFilter) -> Result<Vec<Bus>> {
        self.query_collection(collections::BUSES, bus_filter_field(filter))
            .await
    }

    async fn publish_location(&self, bus_id: &str, location: &Location) -> Result<()> {
        let _: () = self
            .client
            .fluent()
            .update()
            .fields(paths!(Bus::{location, is_trip_active}))
            .in_col(collections::BUSES)
            .document_id(bus_id)
            .object(&LocationPatch {
                location: *location,
                is_trip_active: true,
            })
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn set_trip_active(&self, bus_id: &str, active: bool) -> Result<()> {
        let _: () = self
            .client
            .fluent()
            .update()
            .fields(paths!(Bus::{is_trip_active}))
            .in_col(collections::BUSES)
            .document_id(bus_id)
            .object(&TripActivePatch {
                is_trip_active: active,
            })
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn set_bus_route(&self, bus_id: &str, route_number: Option<&str>) -> Result<()> {
        let _: () = self
            .client
            .fluent()
            .update()
            .fields(paths!(Bus::{route_number}))
            .in_col(collections::BUSES)
            .document_id(bus_id)
            .object(&RoutePatch {
                route_number: route_number.map(String::from),
            })
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn clear_bus_driver(&self, bus_id: &str) -> Result<()> {
        let _: () = self
            .client
            .fluent()
            .update()
            .fields(paths!(Bus::{driver_id}))
            .in_col(collections::BUSES)
            .document_id(bus_id)
            .object(&DriverPatch { driver_id: None })
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn assign_driver_exclusive(&self, bus_id: &str, driver_uid: &str) -> Result<()> {
        // Find every bus currently holding this driver, then clear and set
        // in one transaction. Commit failure leaves no partial writes.
        let holding: Vec<Bus> = self
            .query_collection(
                collections::BUSES,
                Some(("driver_id", driver_uid.to_string())),
            )
            .await?;

        let mut transaction = self
            .client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        for bus in holding.iter().filter(|b| b.id != bus_id) {
            self.client
                .fluent()
                .update()
                .fields(paths!(Bus::{driver_id}))
                .in_col(collections::BUSES)
                .document_id(&bus.id)
                .object(&DriverPatch { driver_id: None })
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    AppError::Database(format!("Failed to add clear to transaction: {}", e))
                })?;
        }

        self.client
            .fluent()
            .update()
            .fields(paths!(Bus::{driver_id}))
            .in_col(collections::BUSES)
            .document_id(bus_id)
            .object(&DriverPatch {
                driver_id: Some(driver_uid.to_string()),
            })
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add assignment to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        tracing::info!(
            bus_id,
            driver_uid,
            cleared = holding.iter().filter(|b| b.id != bus_id).count(),
            "Driver reassigned atomically"
        );

        Ok(())
    }

    async fn subscribe_buses(&self, filter: BusFilter) -> Result<Subscription<Bus>> {
        self.subscribe_collection(collections::BUSES, bus_filter_field(&filter), |bus: &Bus| &bus.id)
            .await
    }

    async fn subscribe_routes(&self) -> Result<Subscription<Route>> {
        self.subscribe_collection(collections::ROUTES, None, |route: &Route| &route.id)
            .await
    }

    async fn subscribe_drivers(&self) -> Result<Subscription<User>> {
        self.subscribe_collection(
            collections::USERS,
            Some(("role", Role::Driver.as_str().to_string())),
            |user: &User| &user.uid,
        )
        .await
    }
}

fn bus_filter_field(filter: &BusFilter) -> Option<(&'static str, String)> {
    match filter {
        BusFilter::All => None,
        BusFilter::Route(route) => Some(("route_number", route.clone())),
        BusFilter::Driver(uid) => Some(("driver_id", uid.clone())),
    }
}
