//! Application layer: the locker/order coordinator and its helpers.
//!
//! `LockerService` is the single entry point for state changes. It stages
//! every read-modify-write in a transaction scope, drives the door-open
//! state machine through a timed actuator, and compensates when the door
//! step fails. `DeviceMonitor` runs beside it and only touches devices.

pub mod coordinator;
pub mod devices;
pub mod door;
mod transaction;
