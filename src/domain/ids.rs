use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

numeric_id!(
    /// Server-assigned locker identifier.
    LockerId
);
numeric_id!(
    /// Server-assigned order identifier.
    OrderId
);
numeric_id!(UserId);

/// Physical device (controller board) identifier, e.g. `L0001`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The single addressing scheme for a door: device, cabinet (lock board) and
/// door (lock) number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DoorAddress {
    pub device_id: DeviceId,
    pub cabinet_no: u16,
    pub door_no: u16,
}

impl DoorAddress {
    pub fn new(device_id: DeviceId, cabinet_no: u16, door_no: u16) -> Self {
        Self {
            device_id,
            cabinet_no,
            door_no,
        }
    }

    /// Two-digit cabinet followed by two-digit door, as reported to devices.
    pub fn door_sort(&self) -> String {
        format!("{:02}{:02}", self.cabinet_no, self.door_no)
    }
}

impl fmt::Display for DoorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.device_id, self.cabinet_no, self.door_no)
    }
}
