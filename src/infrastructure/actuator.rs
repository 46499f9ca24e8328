use crate::domain::locker::Locker;
use crate::domain::ports::{DoorActuator, HardwareFailure, Opened};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Stands in for the door controller: every open succeeds after an optional
/// delay. `Clone` shares the open counter.
#[derive(Debug, Default, Clone)]
pub struct SimulatedActuator {
    latency: Duration,
    opens: Arc<AtomicU64>,
}

impl SimulatedActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Number of doors opened so far.
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DoorActuator for SimulatedActuator {
    async fn open(&self, locker: &Locker) -> Result<Opened, HardwareFailure> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(locker = %locker.address, "simulated door open");
        Ok(Opened)
    }
}
