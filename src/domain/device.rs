use super::ids::DeviceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const DEVICE_PREFIX: char = 'L';

/// A locker controller. Online state is tracked from logins and heartbeats
/// and is independent of locker occupancy.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Device {
    pub id: DeviceId,
    pub is_online: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    pub fn new(id: DeviceId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            is_online: false,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn login(&mut self, now: DateTime<Utc>) {
        self.is_online = true;
        self.last_login_at = Some(now);
        self.updated_at = now;
    }

    pub fn heartbeat(&mut self, now: DateTime<Utc>) {
        self.is_online = true;
        self.updated_at = now;
    }

    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.is_online && self.updated_at < cutoff
    }

    pub fn mark_offline(&mut self, now: DateTime<Utc>) {
        self.is_online = false;
        self.updated_at = now;
    }
}

/// Sequence number of an `L<digits>` device id.
pub fn device_number(id: &DeviceId) -> Option<u32> {
    id.as_str()
        .strip_prefix(DEVICE_PREFIX)
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse().ok())
}

pub fn device_id_for(number: u32) -> DeviceId {
    DeviceId(format!("{DEVICE_PREFIX}{number:04}"))
}

/// Ids for `count` new devices, continuing after the highest existing number.
pub fn next_device_ids<'a>(
    existing: impl IntoIterator<Item = &'a DeviceId>,
    count: u32,
) -> Vec<DeviceId> {
    let start = existing
        .into_iter()
        .filter_map(device_number)
        .max()
        .unwrap_or(0)
        + 1;
    (start..start + count).map(device_id_for).collect()
}
