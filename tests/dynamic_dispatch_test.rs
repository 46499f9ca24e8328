use chrono::Utc;
use smartlocker::domain::ids::{DeviceId, DoorAddress, LockerId};
use smartlocker::domain::locker::LockerFilter;
use smartlocker::domain::ports::{
    ChangeSet, DoorActuatorBox, LockerRegistryBox, Opened, UnitOfWorkBox,
};
use smartlocker::infrastructure::actuator::SimulatedActuator;
use smartlocker::infrastructure::in_memory::InMemoryStore;

#[tokio::test]
async fn test_stores_as_trait_objects() {
    let store = InMemoryStore::new();
    let lockers: LockerRegistryBox = Box::new(store.clone());
    let unit_of_work: UnitOfWorkBox = Box::new(store);

    // Verify Send + Sync by spawning tasks
    let seeded = tokio::spawn(async move {
        let address = DoorAddress::new(DeviceId::new("L0001"), 1, 1);
        lockers.insert_many(vec![address], Utc::now()).await.unwrap();
        lockers
    })
    .await
    .unwrap();

    let committed = tokio::spawn(async move {
        unit_of_work.commit(ChangeSet::default()).await.unwrap();
    });
    committed.await.unwrap();

    let free = seeded.list_free(&LockerFilter::default()).await.unwrap();
    assert_eq!(free.len(), 1);
    assert_eq!(free[0].id, LockerId(1));
}

#[tokio::test]
async fn test_actuator_as_trait_object() {
    let actuator: DoorActuatorBox = Box::new(SimulatedActuator::new());
    let locker = smartlocker::domain::locker::Locker::new(
        LockerId(1),
        DoorAddress::new(DeviceId::new("L0001"), 1, 1),
        Utc::now(),
    );
    let handle = tokio::spawn(async move { actuator.open(&locker).await });
    assert_eq!(handle.await.unwrap(), Ok(Opened));
}
