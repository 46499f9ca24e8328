use crate::domain::account::{Phone, UserAccount};
use crate::domain::ids::{LockerId, OrderId, UserId};
use crate::domain::locker::Locker;
use crate::domain::order::Order;
use crate::domain::ports::{ChangeSet, LockerRegistry, OrderLedger, UnitOfWork, UserAccountStore};
use crate::error::{LockerError, Result};
use chrono::{DateTime, Utc};

/// Replaces the staged copy of a record or appends it.
fn stage<T, K: PartialEq>(staged: &mut Vec<T>, record: T, key: impl Fn(&T) -> K) {
    let id = key(&record);
    match staged.iter_mut().find(|r| key(&**r) == id) {
        Some(slot) => *slot = record,
        None => staged.push(record),
    }
}

/// A read-modify-write scope over lockers, orders and accounts.
///
/// Reads return the staged copy when there is one and otherwise go to the
/// store, never to a snapshot taken earlier. Writes are only staged; nothing
/// is visible until [`StoreTx::commit`], and dropping the scope discards
/// them. The store rejects the commit if any record changed since it was read.
pub(crate) struct StoreTx<'a> {
    lockers: &'a dyn LockerRegistry,
    orders: &'a dyn OrderLedger,
    accounts: &'a dyn UserAccountStore,
    unit_of_work: &'a dyn UnitOfWork,
    changes: ChangeSet,
}

impl<'a> StoreTx<'a> {
    pub(crate) fn new(
        lockers: &'a dyn LockerRegistry,
        orders: &'a dyn OrderLedger,
        accounts: &'a dyn UserAccountStore,
        unit_of_work: &'a dyn UnitOfWork,
    ) -> Self {
        Self {
            lockers,
            orders,
            accounts,
            unit_of_work,
            changes: ChangeSet::default(),
        }
    }

    pub(crate) async fn locker(&self, id: LockerId) -> Result<Locker> {
        if let Some(locker) = self.changes.lockers.iter().find(|l| l.id == id) {
            return Ok(locker.clone());
        }
        self.lockers
            .get(id)
            .await?
            .ok_or_else(|| LockerError::not_found("locker", id))
    }

    pub(crate) async fn order(&self, id: OrderId) -> Result<Order> {
        if let Some(order) = self.changes.orders.iter().find(|o| o.id == id) {
            return Ok(order.clone());
        }
        self.orders
            .get(id)
            .await?
            .ok_or_else(|| LockerError::not_found("order", id))
    }

    pub(crate) async fn account(&self, id: UserId) -> Result<UserAccount> {
        if let Some(account) = self.changes.accounts.iter().find(|a| a.id == id) {
            return Ok(account.clone());
        }
        self.accounts
            .get(id)
            .await?
            .ok_or_else(|| LockerError::not_found("user", id))
    }

    /// The account linked to `phone`, staging a new empty one if none exists.
    pub(crate) async fn account_for_phone(
        &mut self,
        phone: &Phone,
        now: DateTime<Utc>,
    ) -> Result<UserAccount> {
        if let Some(account) = self.changes.accounts.iter().find(|a| a.phone == *phone) {
            return Ok(account.clone());
        }
        if let Some(account) = self.accounts.find_by_phone(phone).await? {
            return Ok(account);
        }
        let id = self.accounts.next_id().await?;
        let account = UserAccount::new(id, phone.clone(), now);
        self.put_account(account.clone());
        Ok(account)
    }

    pub(crate) fn put_locker(&mut self, locker: Locker) {
        stage(&mut self.changes.lockers, locker, |l| l.id);
    }

    pub(crate) fn put_order(&mut self, order: Order) {
        stage(&mut self.changes.orders, order, |o| o.id);
    }

    pub(crate) fn put_account(&mut self, account: UserAccount) {
        stage(&mut self.changes.accounts, account, |a| a.id);
    }

    pub(crate) async fn commit(self) -> Result<()> {
        if self.changes.is_empty() {
            return Ok(());
        }
        self.unit_of_work.commit(self.changes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{DeviceId, DoorAddress};
    use crate::infrastructure::in_memory::InMemoryStore;

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .insert_many(
                vec![DoorAddress::new(DeviceId::new("L0001"), 1, 1)],
                Utc::now(),
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_staged_writes_are_invisible_until_commit() {
        let store = seeded().await;
        let mut tx = StoreTx::new(&store, &store, &store, &store);

        let mut locker = tx.locker(LockerId(1)).await.unwrap();
        locker.mark_occupied(OrderId(9), Utc::now()).unwrap();
        tx.put_locker(locker);

        // The scope sees its own write, the store does not.
        assert!(tx.locker(LockerId(1)).await.unwrap().is_bound_to(OrderId(9)));
        let stored = LockerRegistry::get(&store, LockerId(1)).await.unwrap().unwrap();
        assert!(stored.is_free());

        tx.commit().await.unwrap();
        let stored = LockerRegistry::get(&store, LockerId(1)).await.unwrap().unwrap();
        assert!(stored.is_bound_to(OrderId(9)));
    }

    #[tokio::test]
    async fn test_dropped_scope_rolls_back() {
        let store = seeded().await;
        {
            let mut tx = StoreTx::new(&store, &store, &store, &store);
            let mut locker = tx.locker(LockerId(1)).await.unwrap();
            locker.mark_occupied(OrderId(9), Utc::now()).unwrap();
            tx.put_locker(locker);
        }
        let stored = LockerRegistry::get(&store, LockerId(1)).await.unwrap().unwrap();
        assert!(stored.is_free());
    }

    #[tokio::test]
    async fn test_account_for_phone_stages_once() {
        let store = seeded().await;
        let phone = Phone::parse("13800001111").unwrap();
        let mut tx = StoreTx::new(&store, &store, &store, &store);
        let first = tx.account_for_phone(&phone, Utc::now()).await.unwrap();
        let again = tx.account_for_phone(&phone, Utc::now()).await.unwrap();
        assert_eq!(first.id, again.id);
        tx.commit().await.unwrap();

        let stored = store.find_by_phone(&phone).await.unwrap().unwrap();
        assert_eq!(stored.id, first.id);
    }

    #[tokio::test]
    async fn test_missing_locker_is_not_found() {
        let store = seeded().await;
        let tx = StoreTx::new(&store, &store, &store, &store);
        assert!(matches!(
            tx.locker(LockerId(42)).await,
            Err(LockerError::NotFound { .. })
        ));
    }
}
