use super::ids::{DeviceId, DoorAddress, LockerId, OrderId};
use crate::error::{LockerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LockerStatus {
    Free,
    Occupied,
}

/// Optional scope for free-locker queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockerFilter {
    pub device_id: Option<DeviceId>,
    pub cabinet_no: Option<u16>,
}

impl LockerFilter {
    pub fn matches(&self, locker: &Locker) -> bool {
        self.device_id
            .as_ref()
            .is_none_or(|device| *device == locker.address.device_id)
            && self
                .cabinet_no
                .is_none_or(|cabinet| cabinet == locker.address.cabinet_no)
    }
}

/// A physical storage compartment.
///
/// `status` and `current_order_id` only change together, through the
/// crate-private transition methods, so `Occupied` always carries an order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Locker {
    pub id: LockerId,
    pub address: DoorAddress,
    status: LockerStatus,
    current_order_id: Option<OrderId>,
    pub last_open_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped on every committed write.
    pub revision: u64,
}

impl Locker {
    pub fn new(id: LockerId, address: DoorAddress, now: DateTime<Utc>) -> Self {
        Self {
            id,
            address,
            status: LockerStatus::Free,
            current_order_id: None,
            last_open_at: None,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    pub fn status(&self) -> LockerStatus {
        self.status
    }

    pub fn current_order_id(&self) -> Option<OrderId> {
        self.current_order_id
    }

    pub fn is_free(&self) -> bool {
        self.status == LockerStatus::Free && self.current_order_id.is_none()
    }

    /// True when the locker is occupied by exactly `order_id`.
    pub fn is_bound_to(&self, order_id: OrderId) -> bool {
        self.status == LockerStatus::Occupied && self.current_order_id == Some(order_id)
    }

    /// Binds the locker to an order. Fails with `Conflict` unless free.
    pub(crate) fn mark_occupied(&mut self, order_id: OrderId, now: DateTime<Utc>) -> Result<()> {
        if !self.is_free() {
            return Err(LockerError::Conflict(format!(
                "locker {} is not free (status {:?}, order {:?})",
                self.address, self.status, self.current_order_id
            )));
        }
        self.status = LockerStatus::Occupied;
        self.current_order_id = Some(order_id);
        self.updated_at = now;
        Ok(())
    }

    /// Releases the locker. Returns false when it was already free.
    pub(crate) fn mark_free(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_free() {
            return false;
        }
        self.status = LockerStatus::Free;
        self.current_order_id = None;
        self.updated_at = now;
        true
    }

    pub(crate) fn record_open(&mut self, now: DateTime<Utc>) {
        self.last_open_at = Some(now);
        self.updated_at = now;
    }
}
