// SPDX-License-Identifier: MIT

//! Role-scoped live views over the directory.
//!
//! A view opens the subscriptions its role needs and reduces every snapshot
//! to a client-facing event. Dropping the stream tears the subscriptions
//! down; nothing leaks past the consumer.

use crate::error::Result;
use crate::models::{Bus, Role, Route, User};
use crate::store::{BusFilter, DirectoryStore, Subscription};
use futures_util::Stream;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// What a session is allowed to watch, derived from its profile.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveView {
    Student { route_number: Option<String> },
    Driver { uid: String },
    Admin,
}

impl LiveView {
    pub fn for_user(user: &User) -> Self {
        match user.role {
            Role::Student => LiveView::Student {
                route_number: user.route_number.clone(),
            },
            Role::Driver => LiveView::Driver {
                uid: user.uid.clone(),
            },
            Role::Admin => LiveView::Admin,
        }
    }
}

/// Reduced status of the one bus a student or driver watches.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum BusStatusEvent {
    /// Student profile has no route chosen
    NoRouteAssigned,
    /// Route exists but no bus is assigned to it
    NoBusForRoute,
    /// Driver has no bus assigned
    NoBusAssigned,
    /// Watching this bus (first by document id when several match)
    Tracking { bus: Bus },
}

/// One event on a live stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum ViewEvent {
    BusStatus(BusStatusEvent),
    Buses { buses: Vec<Bus> },
    Routes { routes: Vec<Route> },
    Drivers { drivers: Vec<User> },
}

/// Consumer end of a live view. Dropping it cancels every underlying
/// subscription.
pub struct ViewStream {
    rx: mpsc::Receiver<ViewEvent>,
}

impl ViewStream {
    /// Next event, or `None` once the view has shut down.
    pub async fn next_event(&mut self) -> Option<ViewEvent> {
        self.rx.recv().await
    }

    pub fn into_stream(self) -> impl Stream<Item = ViewEvent> {
        futures_util::stream::unfold(self, |mut view| async move {
            view.next_event().await.map(|event| (event, view))
        })
    }
}

/// Open the live view for a role. Every stream starts with the current
/// state and then follows changes.
pub async fn open(store: Arc<dyn DirectoryStore>, view: LiveView) -> Result<ViewStream> {
    let (tx, rx) = mpsc::channel(16);

    match view {
        LiveView::Student { route_number: None } => {
            // Static: nothing to watch until the profile gains a route.
            tokio::spawn(async move {
                if tx
                    .send(ViewEvent::BusStatus(BusStatusEvent::NoRouteAssigned))
                    .await
                    .is_err()
                {
                    return;
                }
                tx.closed().await;
            });
        }
        LiveView::Student {
            route_number: Some(route),
        } => {
            let sub = store.subscribe_buses(BusFilter::Route(route)).await?;
            spawn_bus_status_forwarder(sub, tx, BusStatusEvent::NoBusForRoute);
        }
        LiveView::Driver { uid } => {
            let sub = store.subscribe_buses(BusFilter::Driver(uid)).await?;
            spawn_bus_status_forwarder(sub, tx, BusStatusEvent::NoBusAssigned);
        }
        LiveView::Admin => {
            let buses = store.subscribe_buses(BusFilter::All).await?;
            let routes = store.subscribe_routes().await?;
            let drivers = store.subscribe_drivers().await?;
            spawn_forwarder(buses, tx.clone(), |buses| ViewEvent::Buses { buses });
            spawn_forwarder(routes, tx.clone(), |routes| ViewEvent::Routes { routes });
            spawn_forwarder(drivers, tx, |drivers| ViewEvent::Drivers { drivers });
        }
    }

    Ok(ViewStream { rx })
}

/// Forward bus snapshots as reduced status events. `empty` names what an
/// empty matching set means for this role.
fn spawn_bus_status_forwarder(
    sub: Subscription<Bus>,
    tx: mpsc::Sender<ViewEvent>,
    empty: BusStatusEvent,
) {
    spawn_forwarder(sub, tx, move |buses: Vec<Bus>| {
        let status = match buses.into_iter().next() {
            Some(bus) => BusStatusEvent::Tracking { bus },
            None => empty.clone(),
        };
        ViewEvent::BusStatus(status)
    });
}

fn spawn_forwarder<T, F>(mut sub: Subscription<T>, tx: mpsc::Sender<ViewEvent>, map: F)
where
    T: Send + 'static,
    F: Fn(Vec<T>) -> ViewEvent + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                snapshot = sub.next_snapshot() => {
                    let Some(items) = snapshot else { break };
                    if tx.send(map(items)).await.is_err() {
                        break;
                    }
                }
                _ = tx.closed() => break,
            }
        }
    });
}
