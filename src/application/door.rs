use crate::domain::ids::{DoorAddress, LockerId};
use crate::domain::locker::Locker;
use crate::domain::ports::{DoorActuatorBox, Opened};
use crate::error::{LockerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum DoorMode {
    /// Drop-off into a locker already bound to the order.
    Store,
    /// Retrieval; releases the locker.
    Take,
}

/// How a caller names the locker behind a door: by id, or by its physical
/// address as reported from the hardware side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LockerRef {
    Id(LockerId),
    Address(DoorAddress),
}

/// Progress of a single door-open request. A failed request stays at the
/// phase it reached; anything from `HardwareOpening` on is compensated.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum DoorPhase {
    Requested,
    Validated,
    HardwareOpening,
    Opened,
}

/// Result of a successful door open.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoorOpened {
    pub locker_id: LockerId,
    pub address: DoorAddress,
    pub mode: DoorMode,
    pub opened_at: DateTime<Utc>,
}

/// Wraps the actuator with a per-attempt timeout and a bounded number of
/// retries. A timeout counts as a failed attempt.
pub struct DoorOpener {
    actuator: DoorActuatorBox,
    timeout: Duration,
    retries: u32,
}

impl DoorOpener {
    pub fn new(actuator: DoorActuatorBox, timeout: Duration, retries: u32) -> Self {
        Self {
            actuator,
            timeout,
            retries,
        }
    }

    pub async fn open(&self, locker: &Locker) -> Result<Opened> {
        let mut last_failure = String::new();
        for attempt in 0..=self.retries {
            match tokio::time::timeout(self.timeout, self.actuator.open(locker)).await {
                Ok(Ok(opened)) => return Ok(opened),
                Ok(Err(failure)) => last_failure = failure.to_string(),
                Err(_) => {
                    last_failure = format!("no response within {}ms", self.timeout.as_millis())
                }
            }
            tracing::warn!(
                locker = %locker.address,
                attempt = attempt + 1,
                reason = %last_failure,
                "door open attempt failed"
            );
        }
        Err(LockerError::HardwareFailure(format!(
            "door {} did not open: {last_failure}",
            locker.address
        )))
    }
}

/// Doors with a request in flight. A second request for a busy door loses
/// immediately instead of racing the first one through the hardware.
#[derive(Debug, Default)]
pub(crate) struct DoorClaims {
    busy: Mutex<HashSet<DoorAddress>>,
}

impl DoorClaims {
    pub(crate) fn claim(&self, address: &DoorAddress) -> Result<DoorClaim<'_>> {
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        if !busy.insert(address.clone()) {
            return Err(LockerError::Conflict(format!(
                "door {address} is already being operated"
            )));
        }
        Ok(DoorClaim {
            claims: self,
            address: address.clone(),
        })
    }
}

/// Releases the claim when dropped.
pub(crate) struct DoorClaim<'a> {
    claims: &'a DoorClaims,
    address: DoorAddress,
}

impl Drop for DoorClaim<'_> {
    fn drop(&mut self) {
        self.claims
            .busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.address);
    }
}
