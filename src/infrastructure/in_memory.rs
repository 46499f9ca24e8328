use super::expect_revision;
use crate::domain::account::{Phone, UserAccount};
use crate::domain::device::Device;
use crate::domain::ids::{DeviceId, DoorAddress, LockerId, OrderId, UserId};
use crate::domain::locker::{Locker, LockerFilter};
use crate::domain::order::{Order, OrderStatus, RetrievalCode};
use crate::domain::ports::{
    ChangeSet, DeviceRegistry, LockerRegistry, OrderLedger, UnitOfWork, UserAccountStore,
};
use crate::error::{LockerError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    lockers: BTreeMap<LockerId, Locker>,
    orders: BTreeMap<OrderId, Order>,
    accounts: BTreeMap<UserId, UserAccount>,
    devices: BTreeMap<DeviceId, Device>,
    last_locker_id: u64,
    last_order_id: u64,
    last_user_id: u64,
}

impl Tables {
    fn check(&self, changes: &ChangeSet) -> Result<()> {
        for locker in &changes.lockers {
            let current = self.lockers.get(&locker.id).map(|l| l.revision);
            expect_revision("locker", locker.id, locker.revision, current)?;
        }
        for order in &changes.orders {
            let current = self.orders.get(&order.id).map(|o| o.revision);
            expect_revision("order", order.id, order.revision, current)?;
        }
        for account in &changes.accounts {
            let current = self.accounts.get(&account.id).map(|a| a.revision);
            expect_revision("user", account.id, account.revision, current)?;
            if account.revision == 0
                && self.accounts.values().any(|a| a.phone == account.phone)
            {
                return Err(LockerError::Conflict(format!(
                    "an account for phone {} already exists",
                    account.phone
                )));
            }
        }
        Ok(())
    }

    fn apply(&mut self, changes: ChangeSet) {
        for mut locker in changes.lockers {
            locker.revision += 1;
            self.lockers.insert(locker.id, locker);
        }
        for mut order in changes.orders {
            order.revision += 1;
            self.orders.insert(order.id, order);
        }
        for mut account in changes.accounts {
            account.revision += 1;
            self.accounts.insert(account.id, account);
        }
    }
}

/// A thread-safe in-memory store for lockers, orders, accounts and devices.
///
/// All tables sit behind one `RwLock`, so a commit is checked and applied
/// atomically. `Clone` shares the underlying tables.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockerRegistry for InMemoryStore {
    async fn get(&self, id: LockerId) -> Result<Option<Locker>> {
        let tables = self.tables.read().await;
        Ok(tables.lockers.get(&id).cloned())
    }

    async fn list_free(&self, filter: &LockerFilter) -> Result<Vec<Locker>> {
        let tables = self.tables.read().await;
        Ok(tables
            .lockers
            .values()
            .filter(|l| l.is_free() && filter.matches(l))
            .cloned()
            .collect())
    }

    async fn find_by_address(&self, address: &DoorAddress) -> Result<Option<Locker>> {
        let tables = self.tables.read().await;
        Ok(tables
            .lockers
            .values()
            .find(|l| l.address == *address)
            .cloned())
    }

    async fn all(&self) -> Result<Vec<Locker>> {
        let tables = self.tables.read().await;
        Ok(tables.lockers.values().cloned().collect())
    }

    async fn insert_many(
        &self,
        addresses: Vec<DoorAddress>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Locker>> {
        let mut tables = self.tables.write().await;
        if let Some(taken) = addresses
            .iter()
            .find(|a| tables.lockers.values().any(|l| l.address == **a))
        {
            return Err(LockerError::Conflict(format!(
                "locker {taken} already exists"
            )));
        }

        let mut created = Vec::with_capacity(addresses.len());
        for address in addresses {
            tables.last_locker_id += 1;
            let mut locker = Locker::new(LockerId(tables.last_locker_id), address, now);
            locker.revision = 1;
            tables.lockers.insert(locker.id, locker.clone());
            created.push(locker);
        }
        Ok(created)
    }
}

#[async_trait]
impl OrderLedger for InMemoryStore {
    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(&id).cloned())
    }

    async fn next_id(&self) -> Result<OrderId> {
        let mut tables = self.tables.write().await;
        tables.last_order_id += 1;
        Ok(OrderId(tables.last_order_id))
    }

    async fn latest_by_phone_and_code(
        &self,
        phone: &Phone,
        code: &RetrievalCode,
        device_id: Option<&DeviceId>,
        statuses: &[OrderStatus],
    ) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .filter(|o| {
                o.phone == *phone
                    && o.retrieval_code == *code
                    && statuses.contains(&o.status())
                    && device_id.is_none_or(|d| *d == o.address.device_id)
            })
            .max_by_key(|o| (o.created_at, o.id))
            .cloned())
    }

    async fn list(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .filter(|o| status.is_none_or(|s| s == o.status()))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserAccountStore for InMemoryStore {
    async fn get(&self, id: UserId) -> Result<Option<UserAccount>> {
        let tables = self.tables.read().await;
        Ok(tables.accounts.get(&id).cloned())
    }

    async fn find_by_phone(&self, phone: &Phone) -> Result<Option<UserAccount>> {
        let tables = self.tables.read().await;
        Ok(tables
            .accounts
            .values()
            .find(|a| a.phone == *phone)
            .cloned())
    }

    async fn next_id(&self) -> Result<UserId> {
        let mut tables = self.tables.write().await;
        tables.last_user_id += 1;
        Ok(UserId(tables.last_user_id))
    }
}

#[async_trait]
impl DeviceRegistry for InMemoryStore {
    async fn get(&self, id: &DeviceId) -> Result<Option<Device>> {
        let tables = self.tables.read().await;
        Ok(tables.devices.get(id).cloned())
    }

    async fn store(&self, device: Device) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.devices.insert(device.id.clone(), device);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Device>> {
        let tables = self.tables.read().await;
        Ok(tables.devices.values().cloned().collect())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryStore {
    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.check(&changes)?;
        tables.apply(changes);
        Ok(())
    }
}
