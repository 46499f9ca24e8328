//! Entities, value objects and the ports the application layer depends on.

pub mod account;
pub mod auth;
pub mod billing;
pub mod device;
pub mod ids;
pub mod locker;
pub mod money;
pub mod order;
pub mod ports;
