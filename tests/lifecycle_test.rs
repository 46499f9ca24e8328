mod common;

use chrono::Duration;
use common::{PHONE, admin, assert_consistent, harness};
use smartlocker::application::door::{DoorMode, LockerRef};
use smartlocker::domain::ids::{DeviceId, DoorAddress, LockerId};
use smartlocker::domain::locker::{LockerFilter, LockerStatus};
use smartlocker::domain::money::Money;
use smartlocker::domain::order::OrderStatus;
use smartlocker::error::LockerError;

#[tokio::test]
async fn test_full_rental_lifecycle() {
    let h = harness().await;
    let service = &h.service;

    let free = service.list_free(&LockerFilter::default()).await.unwrap();
    let locker_id = free[0].id;

    let order = service.create_order(locker_id, PHONE, None).await.unwrap();
    assert_eq!(order.status(), OrderStatus::PendingPay);
    let locker = service.lockers().await.unwrap().remove(0);
    assert_eq!(locker.status(), LockerStatus::Occupied);
    assert_consistent(service).await;

    let order = service.mock_pay_success(order.id).await.unwrap();
    assert_eq!(order.status(), OrderStatus::InProgress);
    let account = service.account_by_phone(PHONE).await.unwrap();
    assert_eq!(account.deposit, Money::from_minor(1500));
    assert_consistent(service).await;

    h.clock.advance(Duration::minutes(2));
    let stored = service
        .open_door(&LockerRef::Id(locker_id), order.id, DoorMode::Store)
        .await
        .unwrap();
    let locker = service.lockers().await.unwrap().remove(0);
    assert!(locker.is_bound_to(order.id));
    assert_eq!(locker.last_open_at, Some(stored.opened_at));
    assert_consistent(service).await;

    h.clock.advance(Duration::minutes(88));
    service
        .open_door(&LockerRef::Id(locker_id), order.id, DoorMode::Take)
        .await
        .unwrap();
    let locker = service.lockers().await.unwrap().remove(0);
    assert!(locker.is_free());
    assert_eq!(locker.current_order_id(), None);

    let finished = service.finish_order(order.id).await.unwrap();
    assert_eq!(finished.status(), OrderStatus::Completed);
    // 90 minutes: 15 free, 60 in the first period, one unit for the rest.
    assert_eq!(finished.rent, Money::from_minor(300));
    assert_eq!(finished.pay_amount, Money::from_minor(1800));
    assert_eq!(finished.end_time, Some(finished.start_time + Duration::minutes(90)));
    assert_consistent(service).await;
}

#[tokio::test]
async fn test_take_with_wrong_order_leaves_locker_alone() {
    let h = harness().await;
    let service = &h.service;
    let first = service.create_order(LockerId(1), PHONE, None).await.unwrap();
    let second = service
        .create_order(LockerId(2), "13900002222", None)
        .await
        .unwrap();
    let before = service.lockers().await.unwrap();

    let result = service
        .open_door(&LockerRef::Id(LockerId(1)), second.id, DoorMode::Take)
        .await;
    assert!(matches!(result, Err(LockerError::InvalidState(_))));
    assert_eq!(service.lockers().await.unwrap(), before);
    assert_eq!(
        service.get_order(first.id).await.unwrap().status(),
        OrderStatus::PendingPay
    );
}

#[tokio::test]
async fn test_retrieval_by_phone_and_code() {
    let h = harness().await;
    let service = &h.service;
    let order = service
        .create_order(LockerId(3), PHONE, Some("246810"))
        .await
        .unwrap();
    service.mock_pay_success(order.id).await.unwrap();

    let found = service
        .query_by_phone_and_code(PHONE, "246810", None)
        .await
        .unwrap();
    assert_eq!(found.id, order.id);

    let sort = service
        .open_by_phone(&DeviceId::new("L0001"), PHONE, "246810")
        .await
        .unwrap();
    assert_eq!(sort, "0103");
    assert!(service.lockers().await.unwrap()[2].is_free());

    service.finish_order(order.id).await.unwrap();
    let again = service.query_by_phone_and_code(PHONE, "246810", None).await;
    assert!(matches!(again, Err(LockerError::NotFound { .. })));
    assert_consistent(service).await;
}

#[tokio::test]
async fn test_open_by_physical_address() {
    let h = harness().await;
    let service = &h.service;
    let order = service.create_order(LockerId(2), PHONE, None).await.unwrap();
    service.mock_pay_success(order.id).await.unwrap();

    let address = DoorAddress::new(DeviceId::new("L0001"), 1, 2);
    let opened = service
        .open_door(&LockerRef::Address(address.clone()), order.id, DoorMode::Store)
        .await
        .unwrap();
    assert_eq!(opened.locker_id, LockerId(2));
    assert_eq!(service.find_locker(&address).await.unwrap().id, LockerId(2));
}

#[tokio::test]
async fn test_refund_after_completion() {
    let h = harness().await;
    let service = &h.service;
    let order = service.create_order(LockerId(1), PHONE, None).await.unwrap();
    service.mock_pay_success(order.id).await.unwrap();
    service.finish_order(order.id).await.unwrap();

    let refunded = service.refund(order.id).await.unwrap();
    assert_eq!(refunded.status(), OrderStatus::Refunded);
    assert_eq!(refunded.refund_amount, Money::from_minor(1500));
    assert_eq!(
        service.account_by_phone(PHONE).await.unwrap().deposit,
        Money::ZERO
    );

    let twice = service.refund(order.id).await;
    assert!(matches!(twice, Err(LockerError::InvalidState(_))));
    assert_consistent(service).await;
}

#[tokio::test]
async fn test_force_finish_releases_locker() {
    let h = harness().await;
    let service = &h.service;
    let order = service.create_order(LockerId(4), PHONE, None).await.unwrap();
    let finished = service.force_finish(&admin(), order.id).await.unwrap();
    assert_eq!(finished.status(), OrderStatus::ForceFinished);
    assert!(service.lockers().await.unwrap()[3].is_free());
    assert_consistent(service).await;
}
