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
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Column Family for locker records.
pub const CF_LOCKERS: &str = "lockers";
/// Column Family for order records.
pub const CF_ORDERS: &str = "orders";
/// Column Family for user accounts.
pub const CF_USERS: &str = "users";
/// Column Family for device records.
pub const CF_DEVICES: &str = "devices";

/// A persistent store implementation using RocksDB.
///
/// Each table lives in its own Column Family, keyed by the big-endian id so
/// iteration follows insertion order. Commits check revisions under a
/// process-wide lock and then write a single `WriteBatch`, which RocksDB
/// applies atomically.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<()>>,
    last_locker_id: Arc<AtomicU64>,
    last_order_id: Arc<AtomicU64>,
    last_user_id: Arc<AtomicU64>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist and resumes id
    /// allocation after the highest stored key of each table.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_LOCKERS, CF_ORDERS, CF_USERS, CF_DEVICES]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        let last_locker_id = last_key(&db, CF_LOCKERS)?;
        let last_order_id = last_key(&db, CF_ORDERS)?;
        let last_user_id = last_key(&db, CF_USERS)?;

        Ok(Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(())),
            last_locker_id: Arc::new(AtomicU64::new(last_locker_id)),
            last_order_id: Arc::new(AtomicU64::new(last_order_id)),
            last_user_id: Arc::new(AtomicU64::new(last_user_id)),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        column_family(&self.db, name)
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_pinned_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    fn put_batch<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf_name: &str,
        key: &[u8],
        record: &T,
    ) -> Result<()> {
        let cf = self.cf(cf_name)?;
        batch.put_cf(cf, key, serde_json::to_vec(record)?);
        Ok(())
    }
}

fn column_family<'a>(db: &'a DB, name: &str) -> Result<&'a ColumnFamily> {
    db.cf_handle(name).ok_or_else(|| {
        LockerError::Internal(Box::new(std::io::Error::other(format!(
            "{name} column family not found"
        ))))
    })
}

fn last_key(db: &DB, cf_name: &str) -> Result<u64> {
    let cf = column_family(db, cf_name)?;
    match db.iterator_cf(cf, IteratorMode::End).next() {
        Some(item) => {
            let (key, _value) = item?;
            let bytes: [u8; 8] = key[..].try_into().map_err(|_| {
                LockerError::Internal(Box::new(std::io::Error::other(format!(
                    "malformed key in {cf_name}"
                ))))
            })?;
            Ok(u64::from_be_bytes(bytes))
        }
        None => Ok(0),
    }
}

#[async_trait]
impl LockerRegistry for RocksDBStore {
    async fn get(&self, id: LockerId) -> Result<Option<Locker>> {
        self.read(CF_LOCKERS, &id.0.to_be_bytes())
    }

    async fn list_free(&self, filter: &LockerFilter) -> Result<Vec<Locker>> {
        let lockers: Vec<Locker> = self.scan(CF_LOCKERS)?;
        Ok(lockers
            .into_iter()
            .filter(|l| l.is_free() && filter.matches(l))
            .collect())
    }

    async fn find_by_address(&self, address: &DoorAddress) -> Result<Option<Locker>> {
        let lockers: Vec<Locker> = self.scan(CF_LOCKERS)?;
        Ok(lockers.into_iter().find(|l| l.address == *address))
    }

    async fn all(&self) -> Result<Vec<Locker>> {
        self.scan(CF_LOCKERS)
    }

    async fn insert_many(
        &self,
        addresses: Vec<DoorAddress>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Locker>> {
        let _guard = self.commit_lock.lock().await;
        let existing: Vec<Locker> = self.scan(CF_LOCKERS)?;
        if let Some(taken) = addresses
            .iter()
            .find(|a| existing.iter().any(|l| l.address == **a))
        {
            return Err(LockerError::Conflict(format!(
                "locker {taken} already exists"
            )));
        }

        let mut batch = WriteBatch::default();
        let mut created = Vec::with_capacity(addresses.len());
        for address in addresses {
            let id = self.last_locker_id.fetch_add(1, Ordering::SeqCst) + 1;
            let mut locker = Locker::new(LockerId(id), address, now);
            locker.revision = 1;
            self.put_batch(&mut batch, CF_LOCKERS, &id.to_be_bytes(), &locker)?;
            created.push(locker);
        }
        self.db.write(batch)?;
        Ok(created)
    }
}

#[async_trait]
impl OrderLedger for RocksDBStore {
    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        self.read(CF_ORDERS, &id.0.to_be_bytes())
    }

    async fn next_id(&self) -> Result<OrderId> {
        Ok(OrderId(self.last_order_id.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn latest_by_phone_and_code(
        &self,
        phone: &Phone,
        code: &RetrievalCode,
        device_id: Option<&DeviceId>,
        statuses: &[OrderStatus],
    ) -> Result<Option<Order>> {
        let orders: Vec<Order> = self.scan(CF_ORDERS)?;
        Ok(orders
            .into_iter()
            .filter(|o| {
                o.phone == *phone
                    && o.retrieval_code == *code
                    && statuses.contains(&o.status())
                    && device_id.is_none_or(|d| *d == o.address.device_id)
            })
            .max_by_key(|o| (o.created_at, o.id)))
    }

    async fn list(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        let orders: Vec<Order> = self.scan(CF_ORDERS)?;
        Ok(orders
            .into_iter()
            .filter(|o| status.is_none_or(|s| s == o.status()))
            .collect())
    }
}

#[async_trait]
impl UserAccountStore for RocksDBStore {
    async fn get(&self, id: UserId) -> Result<Option<UserAccount>> {
        self.read(CF_USERS, &id.0.to_be_bytes())
    }

    async fn find_by_phone(&self, phone: &Phone) -> Result<Option<UserAccount>> {
        let accounts: Vec<UserAccount> = self.scan(CF_USERS)?;
        Ok(accounts.into_iter().find(|a| a.phone == *phone))
    }

    async fn next_id(&self) -> Result<UserId> {
        Ok(UserId(self.last_user_id.fetch_add(1, Ordering::SeqCst) + 1))
    }
}

#[async_trait]
impl DeviceRegistry for RocksDBStore {
    async fn get(&self, id: &DeviceId) -> Result<Option<Device>> {
        self.read(CF_DEVICES, id.as_str().as_bytes())
    }

    async fn store(&self, device: Device) -> Result<()> {
        let cf = self.cf(CF_DEVICES)?;
        self.db
            .put_cf(cf, device.id.as_str().as_bytes(), serde_json::to_vec(&device)?)?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Device>> {
        self.scan(CF_DEVICES)
    }
}

#[async_trait]
impl UnitOfWork for RocksDBStore {
    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        let _guard = self.commit_lock.lock().await;

        for locker in &changes.lockers {
            let current: Option<Locker> = self.read(CF_LOCKERS, &locker.id.0.to_be_bytes())?;
            expect_revision("locker", locker.id, locker.revision, current.map(|l| l.revision))?;
        }
        for order in &changes.orders {
            let current: Option<Order> = self.read(CF_ORDERS, &order.id.0.to_be_bytes())?;
            expect_revision("order", order.id, order.revision, current.map(|o| o.revision))?;
        }
        if !changes.accounts.is_empty() {
            let existing: Vec<UserAccount> = self.scan(CF_USERS)?;
            for account in &changes.accounts {
                let current = existing.iter().find(|a| a.id == account.id);
                expect_revision(
                    "user",
                    account.id,
                    account.revision,
                    current.map(|a| a.revision),
                )?;
                if account.revision == 0 && existing.iter().any(|a| a.phone == account.phone) {
                    return Err(LockerError::Conflict(format!(
                        "an account for phone {} already exists",
                        account.phone
                    )));
                }
            }
        }

        let mut batch = WriteBatch::default();
        for mut locker in changes.lockers {
            locker.revision += 1;
            self.put_batch(&mut batch, CF_LOCKERS, &locker.id.0.to_be_bytes(), &locker)?;
        }
        for mut order in changes.orders {
            order.revision += 1;
            self.put_batch(&mut batch, CF_ORDERS, &order.id.0.to_be_bytes(), &order)?;
        }
        for mut account in changes.accounts {
            account.revision += 1;
            self.put_batch(&mut batch, CF_USERS, &account.id.0.to_be_bytes(), &account)?;
        }
        self.db.write(batch)?;
        Ok(())
    }
}
