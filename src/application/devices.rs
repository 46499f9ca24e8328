use crate::domain::device::Device;
use crate::domain::ids::DeviceId;
use crate::domain::ports::{ClockBox, DeviceRegistryBox};
use crate::error::{LockerError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Tracks device presence from logins and heartbeats. Never touches
/// lockers or orders.
pub struct DeviceMonitor {
    devices: DeviceRegistryBox,
    clock: ClockBox,
    offline_after: Duration,
}

impl DeviceMonitor {
    pub fn new(devices: DeviceRegistryBox, clock: ClockBox, offline_after: Duration) -> Self {
        Self {
            devices,
            clock,
            offline_after,
        }
    }

    async fn registered(&self, id: &DeviceId) -> Result<Device> {
        self.devices
            .get(id)
            .await?
            .ok_or_else(|| LockerError::not_found("device", id))
    }

    pub async fn login(&self, id: &DeviceId) -> Result<Device> {
        let mut device = self.registered(id).await?;
        device.login(self.clock.now());
        self.devices.store(device.clone()).await?;
        tracing::info!(device = %id, "device logged in");
        Ok(device)
    }

    pub async fn heartbeat(&self, id: &DeviceId) -> Result<Device> {
        let mut device = self.registered(id).await?;
        device.heartbeat(self.clock.now());
        self.devices.store(device.clone()).await?;
        tracing::debug!(device = %id, "heartbeat");
        Ok(device)
    }

    /// Marks devices silent for longer than the threshold offline and
    /// returns how many were changed.
    pub async fn sweep_offline(&self) -> Result<usize> {
        let now = self.clock.now();
        let threshold = chrono::Duration::from_std(self.offline_after)
            .map_err(|err| LockerError::Internal(Box::new(err)))?;
        let cutoff = now - threshold;

        let mut swept = 0;
        for mut device in self.devices.all().await? {
            if device.is_stale(cutoff) {
                device.mark_offline(now);
                self.devices.store(device).await?;
                swept += 1;
            }
        }
        if swept > 0 {
            tracing::info!(swept, "devices marked offline");
        }
        Ok(swept)
    }

    /// Runs [`DeviceMonitor::sweep_offline`] every `every` until the handle
    /// is aborted. A failed sweep is logged and the next tick tries again.
    pub fn spawn_offline_sweep(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = self.sweep_offline().await {
                    tracing::error!(error = %err, "offline sweep failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{Clock, DeviceRegistry};
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::in_memory::InMemoryStore;
    use chrono::Utc;

    async fn monitor() -> (Arc<DeviceMonitor>, InMemoryStore, ManualClock) {
        let store = InMemoryStore::new();
        let clock = ManualClock::new(Utc::now());
        for id in ["L0001", "L0002"] {
            store
                .store(Device::new(DeviceId::new(id), clock.now()))
                .await
                .unwrap();
        }
        let monitor = DeviceMonitor::new(
            Box::new(store.clone()),
            Box::new(clock.clone()),
            Duration::from_secs(300),
        );
        (Arc::new(monitor), store, clock)
    }

    #[tokio::test]
    async fn test_login_unknown_device_is_not_found() {
        let (monitor, _, _) = monitor().await;
        let result = monitor.login(&DeviceId::new("L0404")).await;
        assert!(matches!(result, Err(LockerError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_sweep_marks_silent_devices_offline() {
        let (monitor, store, clock) = monitor().await;
        monitor.login(&DeviceId::new("L0001")).await.unwrap();
        monitor.login(&DeviceId::new("L0002")).await.unwrap();

        clock.advance(chrono::Duration::minutes(4));
        monitor.heartbeat(&DeviceId::new("L0002")).await.unwrap();
        clock.advance(chrono::Duration::minutes(2));

        assert_eq!(monitor.sweep_offline().await.unwrap(), 1);
        let first = store.get(&DeviceId::new("L0001")).await.unwrap().unwrap();
        let second = store.get(&DeviceId::new("L0002")).await.unwrap().unwrap();
        assert!(!first.is_online);
        assert!(second.is_online);

        // Already offline devices are left alone.
        assert_eq!(monitor.sweep_offline().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_runs_on_interval() {
        let (monitor, store, clock) = monitor().await;
        monitor.login(&DeviceId::new("L0001")).await.unwrap();
        clock.advance(chrono::Duration::minutes(10));

        let handle = monitor.clone().spawn_offline_sweep(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(61)).await;
        handle.abort();

        let device = store.get(&DeviceId::new("L0001")).await.unwrap().unwrap();
        assert!(!device.is_online);
    }
}
