use super::ids::UserId;
use super::money::Money;
use crate::error::{LockerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const PHONE_LEN: usize = 11;

/// An 11-digit mobile number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Phone(String);

impl Phone {
    pub fn parse(phone: &str) -> Result<Self> {
        let phone = phone.trim();
        if phone.len() == PHONE_LEN && phone.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(phone.to_string()))
        } else {
            Err(LockerError::Validation(format!(
                "phone number must be {PHONE_LEN} digits"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Phone-linked prepaid deposit balance.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct UserAccount {
    pub id: UserId,
    pub phone: Phone,
    pub deposit: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub revision: u64,
}

impl UserAccount {
    pub fn new(id: UserId, phone: Phone, now: DateTime<Utc>) -> Self {
        Self {
            id,
            phone,
            deposit: Money::ZERO,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    pub(crate) fn credit_deposit(&mut self, amount: Money, now: DateTime<Utc>) {
        self.deposit += amount;
        self.updated_at = now;
    }

    /// Debits the deposit, refusing to take the balance below zero.
    pub(crate) fn debit_deposit(&mut self, amount: Money, now: DateTime<Utc>) -> Result<()> {
        if self.deposit >= amount {
            self.deposit -= amount;
            self.updated_at = now;
            Ok(())
        } else {
            Err(LockerError::InvalidState(format!(
                "insufficient deposit for user {}: balance {}, requested {}",
                self.id, self.deposit, amount
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> UserAccount {
        UserAccount::new(UserId(1), Phone::parse("13800001111").unwrap(), Utc::now())
    }

    #[test]
    fn test_phone_validation() {
        assert!(Phone::parse("13800001111").is_ok());
        assert!(Phone::parse(" 13800001111 ").is_ok());
        assert!(Phone::parse("1380000111").is_err());
        assert!(Phone::parse("1380000111x").is_err());
    }

    #[test]
    fn test_credit_then_debit() {
        let mut account = account();
        account.credit_deposit(Money::from_minor(1500), Utc::now());
        assert_eq!(account.deposit, Money::from_minor(1500));

        account.debit_deposit(Money::from_minor(500), Utc::now()).unwrap();
        assert_eq!(account.deposit, Money::from_minor(1000));
    }

    #[test]
    fn test_debit_insufficient() {
        let mut account = account();
        account.credit_deposit(Money::from_minor(100), Utc::now());
        let result = account.debit_deposit(Money::from_minor(200), Utc::now());
        assert!(matches!(result, Err(LockerError::InvalidState(_))));
        assert_eq!(account.deposit, Money::from_minor(100));
    }
}
