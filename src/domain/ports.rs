use super::account::{Phone, UserAccount};
use super::device::Device;
use super::ids::{DeviceId, DoorAddress, LockerId, OrderId, UserId};
use super::locker::{Locker, LockerFilter};
use super::order::{Order, OrderStatus, RetrievalCode};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Read side of the locker table. Lockers are created in bulk at provisioning
/// time and never deleted; state changes go through [`UnitOfWork`].
#[async_trait]
pub trait LockerRegistry: Send + Sync {
    async fn get(&self, id: LockerId) -> Result<Option<Locker>>;
    /// Free lockers in insertion order, optionally scoped.
    async fn list_free(&self, filter: &LockerFilter) -> Result<Vec<Locker>>;
    async fn find_by_address(&self, address: &DoorAddress) -> Result<Option<Locker>>;
    async fn all(&self) -> Result<Vec<Locker>>;
    /// Inserts new free lockers, assigning ids. Existing addresses are a `Conflict`.
    async fn insert_many(&self, addresses: Vec<DoorAddress>, now: DateTime<Utc>)
    -> Result<Vec<Locker>>;
}

#[async_trait]
pub trait OrderLedger: Send + Sync {
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;
    async fn next_id(&self) -> Result<OrderId>;
    /// Most recently created order matching the tuple with one of `statuses`.
    async fn latest_by_phone_and_code(
        &self,
        phone: &Phone,
        code: &RetrievalCode,
        device_id: Option<&DeviceId>,
        statuses: &[OrderStatus],
    ) -> Result<Option<Order>>;
    async fn list(&self, status: Option<OrderStatus>) -> Result<Vec<Order>>;
}

#[async_trait]
pub trait UserAccountStore: Send + Sync {
    async fn get(&self, id: UserId) -> Result<Option<UserAccount>>;
    async fn find_by_phone(&self, phone: &Phone) -> Result<Option<UserAccount>>;
    async fn next_id(&self) -> Result<UserId>;
}

/// Device records. Only touched by provisioning and the device monitor.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn get(&self, id: &DeviceId) -> Result<Option<Device>>;
    async fn store(&self, device: Device) -> Result<()>;
    async fn all(&self) -> Result<Vec<Device>>;
}

/// A set of staged writes. Each record carries the revision it was read at;
/// a revision of zero means the record must not exist yet.
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    pub lockers: Vec<Locker>,
    pub orders: Vec<Order>,
    pub accounts: Vec<UserAccount>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.lockers.is_empty() && self.orders.is_empty() && self.accounts.is_empty()
    }
}

/// Atomic commit across lockers, orders and accounts.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Applies every write or none. A stale revision, an existing record for
    /// a new one, or a duplicate phone fails the whole set with `Conflict`.
    async fn commit(&self, changes: ChangeSet) -> Result<()>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HardwareFailure(pub String);

/// Acknowledgement from the door controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opened;

/// Drives the physical door lock.
#[async_trait]
pub trait DoorActuator: Send + Sync {
    async fn open(&self, locker: &Locker) -> std::result::Result<Opened, HardwareFailure>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type LockerRegistryBox = Box<dyn LockerRegistry>;
pub type OrderLedgerBox = Box<dyn OrderLedger>;
pub type UserAccountStoreBox = Box<dyn UserAccountStore>;
pub type DeviceRegistryBox = Box<dyn DeviceRegistry>;
pub type UnitOfWorkBox = Box<dyn UnitOfWork>;
pub type DoorActuatorBox = Box<dyn DoorActuator>;
pub type ClockBox = Box<dyn Clock>;
