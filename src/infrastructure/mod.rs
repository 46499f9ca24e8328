//! Adapters for the domain ports: storage backends, the simulated door
//! actuator, clocks and the static admin allow-list.

pub mod actuator;
pub mod auth;
pub mod clock;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;

use crate::error::{LockerError, Result};
use std::fmt::Display;

/// Optimistic concurrency check shared by the stores. `expected == 0` means
/// the record is new and must not exist yet.
pub(crate) fn expect_revision(
    entity: &str,
    id: impl Display,
    expected: u64,
    current: Option<u64>,
) -> Result<()> {
    match current {
        None if expected == 0 => Ok(()),
        Some(revision) if revision == expected => Ok(()),
        None => Err(LockerError::Conflict(format!(
            "{entity} {id} no longer exists"
        ))),
        Some(revision) => Err(LockerError::Conflict(format!(
            "{entity} {id} was modified concurrently (expected revision {expected}, found {revision})"
        ))),
    }
}
