// SPDX-License-Identifier: MIT

//! Bus assignment changes (route and driver).
//!
//! Route assignment is a plain field update. Driver assignment enforces
//! exclusivity: one driver drives at most one bus, so assigning a driver
//! atomically clears that driver from any other bus in the same commit.

use crate::error::{AppError, Result};
use crate::models::Role;
use crate::store::DirectoryStore;
use std::sync::Arc;

/// One assignment change for a bus. `None` clears the field.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    Route(Option<String>),
    Driver(Option<String>),
}

#[derive(Clone)]
pub struct AssignmentCoordinator {
    store: Arc<dyn DirectoryStore>,
}

impl AssignmentCoordinator {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }

    pub async fn assign(&self, bus_id: &str, assignment: Assignment) -> Result<()> {
        self.store
            .get_bus(bus_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bus {} not found", bus_id)))?;

        match assignment {
            Assignment::Route(route_number) => {
                self.store
                    .set_bus_route(bus_id, route_number.as_deref())
                    .await?;
                tracing::info!(bus_id, route = ?route_number, "Bus route updated");
            }
            Assignment::Driver(None) => {
                self.store.clear_bus_driver(bus_id).await?;
                tracing::info!(bus_id, "Bus driver cleared");
            }
            Assignment::Driver(Some(driver_uid)) => {
                let user = self
                    .store
                    .get_user(&driver_uid)
                    .await?
                    .ok_or_else(|| AppError::BadRequest("No such driver".to_string()))?;
                if user.role != Role::Driver {
                    return Err(AppError::BadRequest(format!(
                        "{} is not a driver account",
                        user.email
                    )));
                }
                self.store
                    .assign_driver_exclusive(bus_id, &driver_uid)
                    .await
                    .map_err(|e| match e {
                        AppError::NotFound(msg) => AppError::NotFound(msg),
                        other => AppError::Assignment(other.to_string()),
                    })?;
                tracing::info!(bus_id, driver_uid, "Bus driver assigned");
            }
        }
        Ok(())
    }
}
