use super::account::Phone;
use super::billing::Fee;
use super::ids::{DoorAddress, LockerId, OrderId, UserId};
use super::locker::Locker;
use super::money::Money;
use crate::error::{LockerError, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

const CODE_LEN: usize = 6;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    PendingPay,
    InProgress,
    Completed,
    ForceFinished,
    Refunded,
    Cancelled,
}

impl OrderStatus {
    /// Pending or in progress: the order still holds (or may hold) a locker.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::PendingPay | Self::InProgress)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PendingPay => "PENDING_PAY",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::ForceFinished => "FORCE_FINISHED",
            Self::Refunded => "REFUNDED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// Six-digit code the customer presents at retrieval time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetrievalCode(String);

impl RetrievalCode {
    pub fn parse(code: &str) -> Result<Self> {
        let code = code.trim();
        if code.len() == CODE_LEN && code.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(code.to_string()))
        } else {
            Err(LockerError::Validation(format!(
                "retrieval code must be {CODE_LEN} digits"
            )))
        }
    }

    pub fn generate() -> Self {
        let value: u32 = rand::thread_rng().gen_range(100_000..=999_999);
        Self(value.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A rental order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub phone: Phone,
    pub retrieval_code: RetrievalCode,
    pub locker_id: LockerId,
    pub address: DoorAddress,
    status: OrderStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub pay_time: Option<DateTime<Utc>>,
    pub refund_time: Option<DateTime<Utc>>,
    pub deposit: Money,
    pub rent: Money,
    pub pay_amount: Money,
    pub refund_amount: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub revision: u64,
}

impl Order {
    pub(crate) fn new(
        id: OrderId,
        user_id: UserId,
        phone: Phone,
        retrieval_code: RetrievalCode,
        locker: &Locker,
        deposit: Money,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            phone,
            retrieval_code,
            locker_id: locker.id,
            address: locker.address.clone(),
            status: OrderStatus::PendingPay,
            start_time: now,
            end_time: None,
            pay_time: None,
            refund_time: None,
            deposit,
            rent: Money::ZERO,
            pay_amount: Money::ZERO,
            refund_amount: Money::ZERO,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    fn require(&self, allowed: &[OrderStatus], action: &str) -> Result<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(LockerError::InvalidState(format!(
                "cannot {action} order {} in status {}",
                self.id, self.status
            )))
        }
    }

    /// Payment received: the deposit is prepaid and the rental is active.
    pub(crate) fn mark_paid(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.require(&[OrderStatus::PendingPay], "pay")?;
        self.status = OrderStatus::InProgress;
        self.pay_amount = self.deposit;
        self.pay_time = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub(crate) fn finish(&mut self, fee: Fee, now: DateTime<Utc>) -> Result<()> {
        self.require(&[OrderStatus::InProgress], "finish")?;
        self.status = OrderStatus::Completed;
        self.rent = fee.rent;
        self.pay_amount = fee.rent.saturating_add(self.deposit);
        self.end_time = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub(crate) fn force_finish(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.require(
            &[OrderStatus::PendingPay, OrderStatus::InProgress],
            "force-finish",
        )?;
        self.status = OrderStatus::ForceFinished;
        self.end_time = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Returns the amount refunded (the prepaid deposit).
    pub(crate) fn refund(&mut self, now: DateTime<Utc>) -> Result<Money> {
        self.require(
            &[OrderStatus::Completed, OrderStatus::InProgress],
            "refund",
        )?;
        if self.end_time.is_none() {
            self.end_time = Some(now);
        }
        self.status = OrderStatus::Refunded;
        self.refund_amount = self.deposit;
        self.refund_time = Some(now);
        self.updated_at = now;
        Ok(self.refund_amount)
    }

    pub(crate) fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.require(
            &[OrderStatus::PendingPay, OrderStatus::InProgress],
            "cancel",
        )?;
        self.status = OrderStatus::Cancelled;
        self.end_time = Some(now);
        self.updated_at = now;
        Ok(())
    }
}
