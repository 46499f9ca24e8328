use crate::domain::billing::BillingPolicy;
use crate::error::Result;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_HARDWARE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_OFFLINE_AFTER: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Runtime knobs for the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Upper bound on a single door-open attempt.
    pub hardware_timeout: Duration,
    /// Extra attempts after the first failed one.
    pub hardware_retries: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            hardware_timeout: DEFAULT_HARDWARE_TIMEOUT,
            hardware_retries: 0,
        }
    }
}

/// Reads a billing policy from a JSON file, e.g.
/// `{"mode": "flat", "rent": 500, "deposit": 1000}`.
pub fn load_billing_policy(path: impl AsRef<Path>) -> Result<BillingPolicy> {
    let file = File::open(path)?;
    let policy: BillingPolicy = serde_json::from_reader(BufReader::new(file))?;
    policy.validate()?;
    Ok(policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Money;
    use crate::error::LockerError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_flat_policy() {
        let file = write(r#"{"mode": "flat", "rent": 500, "deposit": 1000}"#);
        let policy = load_billing_policy(file.path()).unwrap();
        assert_eq!(
            policy,
            BillingPolicy::Flat {
                rent: Money::from_minor(500),
                deposit: Money::from_minor(1000),
            }
        );
    }

    #[test]
    fn test_metered_fields_default() {
        let file = write(r#"{"mode": "metered", "free_minutes": 5, "deposit_price": 800}"#);
        let BillingPolicy::Metered(rule) = load_billing_policy(file.path()).unwrap() else {
            panic!("expected metered policy");
        };
        assert_eq!(rule.free_minutes, 5);
        assert_eq!(rule.unit_minutes, 30);
        assert_eq!(rule.cap_price, None);
        assert_eq!(rule.deposit_price, Money::from_minor(800));
    }

    #[test]
    fn test_negative_price_rejected() {
        let file = write(r#"{"mode": "flat", "rent": -1, "deposit": 0}"#);
        assert!(matches!(
            load_billing_policy(file.path()),
            Err(LockerError::Validation(_))
        ));
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.hardware_timeout, Duration::from_secs(5));
        assert_eq!(config.hardware_retries, 0);
    }
}
