#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use smartlocker::application::coordinator::{LockerService, Stores};
use smartlocker::config::ServiceConfig;
use smartlocker::domain::auth::Identity;
use smartlocker::domain::billing::BillingPolicy;
use smartlocker::domain::ids::DeviceId;
use smartlocker::domain::locker::{Locker, LockerStatus};
use smartlocker::domain::order::OrderStatus;
use smartlocker::domain::ports::{DoorActuator, DoorActuatorBox, HardwareFailure, Opened};
use smartlocker::infrastructure::actuator::SimulatedActuator;
use smartlocker::infrastructure::auth::StaticAllowList;
use smartlocker::infrastructure::clock::ManualClock;
use smartlocker::infrastructure::in_memory::InMemoryStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

pub const PHONE: &str = "13800001111";
pub const ADMIN: &str = "ops";

pub fn admin() -> Identity {
    Identity::new(ADMIN)
}

/// Fails every open.
pub struct FailingActuator;

#[async_trait]
impl DoorActuator for FailingActuator {
    async fn open(&self, _locker: &Locker) -> Result<Opened, HardwareFailure> {
        Err(HardwareFailure("relay did not respond".to_string()))
    }
}

/// Never answers.
pub struct StalledActuator;

#[async_trait]
impl DoorActuator for StalledActuator {
    async fn open(&self, _locker: &Locker) -> Result<Opened, HardwareFailure> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Opened)
    }
}

/// Works until switched off.
#[derive(Clone, Default)]
pub struct SwitchableActuator {
    broken: Arc<AtomicBool>,
}

impl SwitchableActuator {
    pub fn break_down(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DoorActuator for SwitchableActuator {
    async fn open(&self, _locker: &Locker) -> Result<Opened, HardwareFailure> {
        if self.broken.load(Ordering::SeqCst) {
            Err(HardwareFailure("controller offline".to_string()))
        } else {
            Ok(Opened)
        }
    }
}

/// Holds every open until released, so other operations can run while the
/// door is moving.
#[derive(Clone, Default)]
pub struct GatedActuator {
    entered: Arc<Notify>,
    gate: Arc<Notify>,
}

impl GatedActuator {
    /// Resolves once an open has reached the hardware.
    pub async fn wait_until_opening(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl DoorActuator for GatedActuator {
    async fn open(&self, _locker: &Locker) -> Result<Opened, HardwareFailure> {
        self.entered.notify_one();
        self.gate.notified().await;
        Ok(Opened)
    }
}

pub struct Harness {
    pub service: Arc<LockerService>,
    pub store: InMemoryStore,
    pub clock: ManualClock,
}

/// One device `L0001` with `cabinets` x `doors` free lockers.
pub async fn harness_with(
    actuator: DoorActuatorBox,
    config: ServiceConfig,
    cabinets: u16,
    doors: u16,
) -> Harness {
    let store = InMemoryStore::new();
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap());
    let service = LockerService::new(
        Stores::from_backend(store.clone()),
        actuator,
        Box::new(StaticAllowList::new([ADMIN])),
        Box::new(clock.clone()),
        BillingPolicy::default(),
        config,
    );
    service.provision_devices(&admin(), 1).await.unwrap();
    service
        .provision_lockers(&admin(), &DeviceId::new("L0001"), cabinets, doors)
        .await
        .unwrap();
    Harness {
        service: Arc::new(service),
        store,
        clock,
    }
}

pub async fn harness() -> Harness {
    harness_with(
        Box::new(SimulatedActuator::new()),
        ServiceConfig::default(),
        1,
        4,
    )
    .await
}

/// Locker/order consistency over the whole store:
/// a locker is occupied exactly when it carries an order, that order exists
/// and is still open, and every in-progress order owns its locker. Only
/// meaningful between flows: a `take` leaves its order in progress until
/// the separate finish call.
pub async fn assert_consistent(service: &LockerService) {
    let lockers = service.lockers().await.unwrap();
    for locker in &lockers {
        let occupied = locker.status() == LockerStatus::Occupied;
        assert_eq!(
            occupied,
            locker.current_order_id().is_some(),
            "locker {} status and order disagree",
            locker.address
        );
        if let Some(order_id) = locker.current_order_id() {
            let order = service.get_order(order_id).await.unwrap();
            assert!(order.status().is_open(), "locker bound to closed order {order_id}");
            assert_eq!(order.locker_id, locker.id);
        }
    }
    for order in service.list_orders(Some(OrderStatus::InProgress)).await.unwrap() {
        let locker = lockers.iter().find(|l| l.id == order.locker_id).unwrap();
        assert!(
            locker.is_bound_to(order.id),
            "in-progress order {} lost its locker",
            order.id
        );
    }
}
