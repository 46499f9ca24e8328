use crate::domain::ids::{DeviceId, LockerId, OrderId, UserId};
use crate::domain::locker::{Locker, LockerStatus};
use crate::domain::order::{Order, OrderStatus};
use crate::error::LockerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

/// The single line written back for every request.
#[derive(Debug, Serialize, PartialEq)]
pub struct Response {
    pub line: usize,
    pub action: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Response {
    pub fn ok(line: usize, action: String, message: String, data: Option<serde_json::Value>) -> Self {
        Self {
            line,
            action,
            success: true,
            error: None,
            message,
            data,
        }
    }

    pub fn failed(line: usize, action: String, err: &LockerError) -> Self {
        Self {
            line,
            action,
            success: false,
            error: Some(err.kind()),
            message: err.to_string(),
            data: None,
        }
    }
}

/// Writes responses as JSON lines.
pub struct ResponseWriter<W: Write> {
    sink: W,
}

impl<W: Write> ResponseWriter<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    pub fn write(&mut self, response: &Response) -> crate::error::Result<()> {
        serde_json::to_writer(&mut self.sink, response)?;
        self.sink.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> crate::error::Result<()> {
        self.sink.flush()?;
        Ok(())
    }
}

/// Order as reported to clients, with amounts in major units.
#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: OrderId,
    pub user_id: UserId,
    pub phone: String,
    pub retrieval_code: String,
    pub locker_id: LockerId,
    pub device_id: DeviceId,
    pub cabinet_no: u16,
    pub door_no: u16,
    pub status: OrderStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub pay_time: Option<DateTime<Utc>>,
    pub refund_time: Option<DateTime<Utc>>,
    pub deposit: Decimal,
    pub rent: Decimal,
    pub pay_amount: Decimal,
    pub refund_amount: Decimal,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            phone: order.phone.to_string(),
            retrieval_code: order.retrieval_code.as_str().to_string(),
            locker_id: order.locker_id,
            device_id: order.address.device_id.clone(),
            cabinet_no: order.address.cabinet_no,
            door_no: order.address.door_no,
            status: order.status(),
            start_time: order.start_time,
            end_time: order.end_time,
            pay_time: order.pay_time,
            refund_time: order.refund_time,
            deposit: order.deposit.to_decimal(),
            rent: order.rent.to_decimal(),
            pay_amount: order.pay_amount.to_decimal(),
            refund_amount: order.refund_amount.to_decimal(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LockerView {
    pub id: LockerId,
    pub device_id: DeviceId,
    pub cabinet_no: u16,
    pub door_no: u16,
    pub door_sort: String,
    pub status: LockerStatus,
    pub current_order_id: Option<OrderId>,
    pub last_open_at: Option<DateTime<Utc>>,
}

impl From<&Locker> for LockerView {
    fn from(locker: &Locker) -> Self {
        Self {
            id: locker.id,
            device_id: locker.address.device_id.clone(),
            cabinet_no: locker.address.cabinet_no,
            door_no: locker.address.door_no,
            door_sort: locker.address.door_sort(),
            status: locker.status(),
            current_order_id: locker.current_order_id(),
            last_open_at: locker.last_open_at,
        }
    }
}
