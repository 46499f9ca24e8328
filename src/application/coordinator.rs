use super::door::{DoorClaims, DoorMode, DoorOpened, DoorOpener, DoorPhase, LockerRef};
use super::transaction::StoreTx;
use crate::config::ServiceConfig;
use crate::domain::account::{Phone, UserAccount};
use crate::domain::auth::{AuthorizationPolicyBox, Identity};
use crate::domain::billing::BillingPolicy;
use crate::domain::device::{Device, next_device_ids};
use crate::domain::ids::{DeviceId, DoorAddress, LockerId, OrderId};
use crate::domain::locker::{Locker, LockerFilter};
use crate::domain::order::{Order, OrderStatus, RetrievalCode};
use crate::domain::ports::{
    ClockBox, DeviceRegistry, DeviceRegistryBox, DoorActuatorBox, LockerRegistry,
    LockerRegistryBox, OrderLedger, OrderLedgerBox, UnitOfWork, UnitOfWorkBox, UserAccountStore,
    UserAccountStoreBox,
};
use crate::error::{LockerError, Result};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// The persistence ports the coordinator works against.
pub struct Stores {
    pub lockers: LockerRegistryBox,
    pub orders: OrderLedgerBox,
    pub accounts: UserAccountStoreBox,
    pub devices: DeviceRegistryBox,
    pub unit_of_work: UnitOfWorkBox,
}

impl Stores {
    /// Uses one backend for every port.
    pub fn from_backend<S>(store: S) -> Self
    where
        S: LockerRegistry
            + OrderLedger
            + UserAccountStore
            + DeviceRegistry
            + UnitOfWork
            + Clone
            + 'static,
    {
        Self {
            lockers: Box::new(store.clone()),
            orders: Box::new(store.clone()),
            accounts: Box::new(store.clone()),
            devices: Box::new(store.clone()),
            unit_of_work: Box::new(store),
        }
    }
}

/// Coordinates lockers, orders and user accounts.
///
/// Every mutation runs as a read-modify-write inside a [`StoreTx`] and is
/// committed atomically; the store rejects the commit if another operation
/// changed any of the records in between. This is the only place where
/// locker and order status change.
pub struct LockerService {
    stores: Stores,
    opener: DoorOpener,
    claims: DoorClaims,
    auth: AuthorizationPolicyBox,
    clock: ClockBox,
    billing: RwLock<BillingPolicy>,
}

impl LockerService {
    pub fn new(
        stores: Stores,
        actuator: DoorActuatorBox,
        auth: AuthorizationPolicyBox,
        clock: ClockBox,
        billing: BillingPolicy,
        config: ServiceConfig,
    ) -> Self {
        Self {
            stores,
            opener: DoorOpener::new(actuator, config.hardware_timeout, config.hardware_retries),
            claims: DoorClaims::default(),
            auth,
            clock,
            billing: RwLock::new(billing),
        }
    }

    fn tx(&self) -> StoreTx<'_> {
        StoreTx::new(
            &*self.stores.lockers,
            &*self.stores.orders,
            &*self.stores.accounts,
            &*self.stores.unit_of_work,
        )
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn is_admin(&self, caller: &Identity) -> bool {
        self.auth.is_admin(caller)
    }

    fn require_admin(&self, caller: &Identity, action: &str) -> Result<()> {
        if self.is_admin(caller) {
            Ok(())
        } else {
            tracing::warn!(caller = %caller, action, "admin action refused");
            Err(LockerError::Forbidden(format!("{action} requires an admin")))
        }
    }

    // ---- billing rules ----

    pub async fn billing_policy(&self) -> BillingPolicy {
        self.billing.read().await.clone()
    }

    /// Replaces the billing policy. Orders already running are billed with
    /// the policy in force when they finish.
    pub async fn set_billing_policy(&self, caller: &Identity, policy: BillingPolicy) -> Result<()> {
        self.require_admin(caller, "set billing policy")?;
        policy.validate()?;
        *self.billing.write().await = policy;
        tracing::info!(caller = %caller, "billing policy updated");
        Ok(())
    }

    // ---- provisioning ----

    /// Registers `count` new devices, numbered after the highest existing one.
    pub async fn provision_devices(&self, caller: &Identity, count: u32) -> Result<Vec<Device>> {
        self.require_admin(caller, "provision devices")?;
        if count == 0 {
            return Err(LockerError::Validation(
                "device count must be positive".to_string(),
            ));
        }
        let existing = self.stores.devices.all().await?;
        let now = self.now();
        let mut created = Vec::with_capacity(count as usize);
        for id in next_device_ids(existing.iter().map(|d| &d.id), count) {
            let device = Device::new(id, now);
            self.stores.devices.store(device.clone()).await?;
            created.push(device);
        }
        tracing::info!(count, "devices provisioned");
        Ok(created)
    }

    /// Seeds free lockers for every door of a registered device. Doors are
    /// numbered from 1 within each cabinet.
    pub async fn provision_lockers(
        &self,
        caller: &Identity,
        device_id: &DeviceId,
        cabinet_count: u16,
        doors_per_cabinet: u16,
    ) -> Result<Vec<Locker>> {
        self.require_admin(caller, "provision lockers")?;
        if cabinet_count == 0 || doors_per_cabinet == 0 {
            return Err(LockerError::Validation(
                "cabinet and door counts must be positive".to_string(),
            ));
        }
        if self.stores.devices.get(device_id).await?.is_none() {
            return Err(LockerError::not_found("device", device_id));
        }
        let addresses = (1..=cabinet_count)
            .flat_map(|cabinet| {
                (1..=doors_per_cabinet)
                    .map(move |door| DoorAddress::new(device_id.clone(), cabinet, door))
            })
            .collect();
        let lockers = self.stores.lockers.insert_many(addresses, self.now()).await?;
        tracing::info!(device = %device_id, lockers = lockers.len(), "lockers provisioned");
        Ok(lockers)
    }

    // ---- reads ----

    /// Free lockers in insertion order. Callers take the first one.
    pub async fn list_free(&self, filter: &LockerFilter) -> Result<Vec<Locker>> {
        self.stores.lockers.list_free(filter).await
    }

    pub async fn find_locker(&self, address: &DoorAddress) -> Result<Locker> {
        self.stores
            .lockers
            .find_by_address(address)
            .await?
            .ok_or_else(|| LockerError::not_found("locker", address))
    }

    pub async fn lockers(&self) -> Result<Vec<Locker>> {
        self.stores.lockers.all().await
    }

    pub async fn get_order(&self, id: OrderId) -> Result<Order> {
        self.stores
            .orders
            .get(id)
            .await?
            .ok_or_else(|| LockerError::not_found("order", id))
    }

    pub async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        self.stores.orders.list(status).await
    }

    pub async fn account_by_phone(&self, phone: &str) -> Result<UserAccount> {
        let phone = Phone::parse(phone)?;
        self.stores
            .accounts
            .find_by_phone(&phone)
            .await?
            .ok_or_else(|| LockerError::not_found("user", &phone))
    }

    /// Most recent in-progress order for the phone and code, optionally on
    /// one device.
    pub async fn query_by_phone_and_code(
        &self,
        phone: &str,
        code: &str,
        device_id: Option<&DeviceId>,
    ) -> Result<Order> {
        let phone = Phone::parse(phone)?;
        let code = RetrievalCode::parse(code)?;
        self.stores
            .orders
            .latest_by_phone_and_code(&phone, &code, device_id, &[OrderStatus::InProgress])
            .await?
            .ok_or_else(|| LockerError::not_found("order", "for this phone or code"))
    }

    // ---- order lifecycle ----

    /// Creates a pending order on a free locker and binds the locker to it.
    /// A retrieval code is generated when none is given.
    ///
    /// The first order for a phone also opens its account. When two such
    /// orders race, the loser retries once against the account the winner
    /// committed.
    pub async fn create_order(
        &self,
        locker_id: LockerId,
        phone: &str,
        code: Option<&str>,
    ) -> Result<Order> {
        let phone = Phone::parse(phone)?;
        let code = match code {
            Some(code) => RetrievalCode::parse(code)?,
            None => RetrievalCode::generate(),
        };
        let deposit = self.billing.read().await.deposit();

        let mut retried = false;
        loop {
            let now = self.now();
            let mut tx = self.tx();
            let mut locker = tx.locker(locker_id).await?;
            let account = tx.account_for_phone(&phone, now).await?;
            let opens_account = account.revision == 0;
            let order_id = self.stores.orders.next_id().await?;
            locker.mark_occupied(order_id, now)?;
            let order = Order::new(
                order_id,
                account.id,
                phone.clone(),
                code.clone(),
                &locker,
                deposit,
                now,
            );
            tx.put_locker(locker);
            tx.put_order(order);
            match self.commit(tx, "create order").await {
                Err(LockerError::Conflict(_)) if opens_account && !retried => {
                    tracing::debug!(phone = %phone, "account opened concurrently, retrying");
                    retried = true;
                }
                outcome => {
                    outcome?;
                    tracing::info!(order = %order_id, locker = %locker_id, "order created");
                    return self.get_order(order_id).await;
                }
            }
        }
    }

    /// Test-mode payment callback: activates the order and credits the
    /// deposit to the user's account in the same commit.
    pub async fn mock_pay_success(&self, order_id: OrderId) -> Result<Order> {
        let now = self.now();
        let mut tx = self.tx();
        let mut order = tx.order(order_id).await?;
        order.mark_paid(now)?;
        let mut account = tx.account(order.user_id).await?;
        account.credit_deposit(order.deposit, now);
        tx.put_account(account);
        tx.put_order(order);
        self.commit(tx, "pay order").await?;

        tracing::info!(order = %order_id, "order paid");
        self.get_order(order_id).await
    }

    /// Completes an in-progress order, billing the time since it started
    /// with the current policy. The locker is released if still bound.
    pub async fn finish_order(&self, order_id: OrderId) -> Result<Order> {
        let now = self.now();
        let policy = self.billing_policy().await;
        let mut tx = self.tx();
        let mut order = tx.order(order_id).await?;
        let fee = policy.quote(order.start_time, now);
        order.finish(fee, now)?;
        Self::release_locker(&mut tx, &order, now).await?;
        tx.put_order(order);
        self.commit(tx, "finish order").await?;

        tracing::info!(order = %order_id, rent = %fee.rent, "order finished");
        self.get_order(order_id).await
    }

    /// Administrative override for any open order. Always releases the locker.
    pub async fn force_finish(&self, caller: &Identity, order_id: OrderId) -> Result<Order> {
        self.require_admin(caller, "force finish")?;
        let now = self.now();
        let mut tx = self.tx();
        let mut order = tx.order(order_id).await?;
        order.force_finish(now)?;
        Self::release_locker(&mut tx, &order, now).await?;
        tx.put_order(order);
        self.commit(tx, "force finish").await?;

        tracing::info!(order = %order_id, caller = %caller, "order force-finished");
        self.get_order(order_id).await
    }

    /// Refunds the deposit of a completed or in-progress order. The account
    /// must still hold at least the deposit.
    pub async fn refund(&self, order_id: OrderId) -> Result<Order> {
        let now = self.now();
        let mut tx = self.tx();
        let mut order = tx.order(order_id).await?;
        let amount = order.refund(now)?;
        let mut account = tx.account(order.user_id).await?;
        account.debit_deposit(amount, now)?;
        Self::release_locker(&mut tx, &order, now).await?;
        tx.put_account(account);
        tx.put_order(order);
        self.commit(tx, "refund").await?;

        tracing::info!(order = %order_id, amount = %amount, "order refunded");
        self.get_order(order_id).await
    }

    /// Unwinds an order whose downstream step failed. Only `CANCELLED` is a
    /// valid target.
    pub async fn recover_order(&self, order_id: OrderId, target: OrderStatus) -> Result<Order> {
        if target != OrderStatus::Cancelled {
            return Err(LockerError::Validation(format!(
                "orders can only be recovered to CANCELLED, not {target}"
            )));
        }
        let now = self.now();
        let mut tx = self.tx();
        let mut order = tx.order(order_id).await?;
        order.cancel(now)?;
        Self::release_locker(&mut tx, &order, now).await?;
        tx.put_order(order);
        self.commit(tx, "recover order").await?;

        tracing::info!(order = %order_id, "order recovered");
        self.get_order(order_id).await
    }

    /// Frees the order's locker if it is still bound to the order.
    async fn release_locker(tx: &mut StoreTx<'_>, order: &Order, now: DateTime<Utc>) -> Result<()> {
        let mut locker = tx.locker(order.locker_id).await?;
        if locker.is_bound_to(order.id) && locker.mark_free(now) {
            tx.put_locker(locker);
        }
        Ok(())
    }

    async fn commit(&self, tx: StoreTx<'_>, action: &str) -> Result<()> {
        tx.commit().await.inspect_err(|err| {
            tracing::warn!(action, error = %err, "commit rejected");
        })
    }

    // ---- doors ----

    /// Opens the door of a locker bound to `order_id`.
    ///
    /// `Store` needs the order in progress; `Take` frees the locker once the
    /// door has opened (finishing the order is a separate call). If anything
    /// fails after the hardware was asked to open, a locker still bound to
    /// the order is freed and a still-unpaid order is cancelled before the
    /// error is returned.
    pub async fn open_door(
        &self,
        locker: &LockerRef,
        order_id: OrderId,
        mode: DoorMode,
    ) -> Result<DoorOpened> {
        let target = match locker {
            LockerRef::Id(id) => self
                .stores
                .lockers
                .get(*id)
                .await?
                .ok_or_else(|| LockerError::not_found("locker", id))?,
            LockerRef::Address(address) => self.find_locker(address).await?,
        };
        let _claim = self.claims.claim(&target.address)?;

        let mut phase = DoorPhase::Requested;
        let result = self.run_door(target.id, order_id, mode, &mut phase).await;
        if let Err(err) = &result {
            tracing::warn!(
                locker = %target.address,
                order = %order_id,
                ?mode,
                ?phase,
                error = %err,
                "door open failed"
            );
            if phase >= DoorPhase::HardwareOpening {
                self.compensate(target.id, order_id).await;
            }
        }
        result
    }

    async fn run_door(
        &self,
        locker_id: LockerId,
        order_id: OrderId,
        mode: DoorMode,
        phase: &mut DoorPhase,
    ) -> Result<DoorOpened> {
        let mut tx = self.tx();
        let mut locker = tx.locker(locker_id).await?;
        let mut order = tx.order(order_id).await?;
        if !locker.is_bound_to(order_id) {
            return Err(LockerError::InvalidState(format!(
                "locker {} is not bound to order {order_id}",
                locker.address
            )));
        }
        if mode == DoorMode::Store {
            if order.status() != OrderStatus::InProgress {
                return Err(LockerError::InvalidState(format!(
                    "cannot store into order {order_id} in status {}",
                    order.status()
                )));
            }
            if order.locker_id != locker.id {
                return Err(LockerError::InvalidState(format!(
                    "order {order_id} belongs to locker {}, not {}",
                    order.locker_id, locker.id
                )));
            }
        }
        *phase = DoorPhase::Validated;
        tracing::debug!(locker = %locker.address, order = %order_id, ?mode, "door request validated");

        *phase = DoorPhase::HardwareOpening;
        self.opener.open(&locker).await?;

        let now = self.now();
        locker.record_open(now);
        match mode {
            DoorMode::Store => {
                order.locker_id = locker.id;
                order.address = locker.address.clone();
                order.updated_at = now;
                tx.put_order(order);
            }
            DoorMode::Take => {
                locker.mark_free(now);
            }
        }
        let opened = DoorOpened {
            locker_id: locker.id,
            address: locker.address.clone(),
            mode,
            opened_at: now,
        };
        tx.put_locker(locker);
        tx.commit().await?;
        *phase = DoorPhase::Opened;

        tracing::info!(locker = %opened.address, order = %order_id, ?mode, "door opened");
        Ok(opened)
    }

    /// Best effort: a failure here is logged and left alone.
    async fn compensate(&self, locker_id: LockerId, order_id: OrderId) {
        match self.restore_after_failure(locker_id, order_id).await {
            Ok(()) => tracing::info!(locker = %locker_id, order = %order_id, "locker restored to free"),
            Err(err) => tracing::error!(
                locker = %locker_id,
                order = %order_id,
                error = %err,
                "compensating recovery failed"
            ),
        }
    }

    /// Frees the locker if it still belongs to the order and cancels the
    /// order if it was never paid. A locker that is already free, or has
    /// since been rented to another order, is left alone.
    async fn restore_after_failure(&self, locker_id: LockerId, order_id: OrderId) -> Result<()> {
        let now = self.now();
        let mut tx = self.tx();
        let mut locker = tx.locker(locker_id).await?;
        if locker.is_bound_to(order_id) && locker.mark_free(now) {
            tx.put_locker(locker);
        }
        if let Some(mut order) = self.stores.orders.get(order_id).await?
            && order.status() == OrderStatus::PendingPay
        {
            order.cancel(now)?;
            tx.put_order(order);
        }
        tx.commit().await
    }

    /// Retrieval from the device side: finds the active order for the phone
    /// and code on this device and opens its door for taking. Returns the
    /// door sort string (`CCDD`).
    pub async fn open_by_phone(&self, device_id: &DeviceId, phone: &str, code: &str) -> Result<String> {
        let order = self
            .query_by_phone_and_code(phone, code, Some(device_id))
            .await
            .map_err(|err| match err {
                LockerError::Validation(_) | LockerError::NotFound { .. } => {
                    LockerError::not_found("order", "for this phone or code")
                }
                other => other,
            })?;
        let opened = self
            .open_door(&LockerRef::Id(order.locker_id), order.id, DoorMode::Take)
            .await?;
        Ok(opened.address.door_sort())
    }
}
