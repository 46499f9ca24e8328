use crate::application::door::{DoorMode, LockerRef};
use crate::domain::billing::BillingPolicy;
use crate::domain::ids::{DeviceId, LockerId, OrderId};
use crate::domain::order::OrderStatus;
use crate::error::{LockerError, Result};
use serde::Deserialize;
use std::io::BufRead;

/// One client action. The `action` field selects the variant.
#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    ProvisionDevices {
        count: u32,
    },
    ProvisionLockers {
        device_id: DeviceId,
        cabinet_count: u16,
        doors_per_cabinet: u16,
    },
    DeviceLogin {
        device_id: DeviceId,
    },
    DeviceHeartbeat {
        device_id: DeviceId,
    },
    ListFree {
        #[serde(default)]
        device_id: Option<DeviceId>,
        #[serde(default)]
        cabinet_no: Option<u16>,
    },
    CreateOrder {
        locker_id: LockerId,
        phone: String,
        #[serde(default)]
        code: Option<String>,
    },
    MockPay {
        order_id: OrderId,
    },
    GetOrder {
        order_id: OrderId,
    },
    OpenDoor {
        locker: LockerRef,
        order_id: OrderId,
        mode: DoorMode,
    },
    FinishOrder {
        order_id: OrderId,
    },
    ForceFinish {
        order_id: OrderId,
    },
    Refund {
        order_id: OrderId,
    },
    QueryByPhoneAndCode {
        phone: String,
        code: String,
        #[serde(default)]
        device_id: Option<DeviceId>,
    },
    RecoverOrder {
        order_id: OrderId,
        target_status: OrderStatus,
    },
    OpenByPhone {
        device_id: DeviceId,
        phone: String,
        code: String,
    },
    AmIAdmin,
    GetBillingPolicy,
    SetBillingPolicy {
        policy: BillingPolicy,
    },
    ListOrders {
        #[serde(default)]
        status: Option<OrderStatus>,
    },
}

/// A request plus the identity it runs as.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Envelope {
    #[serde(default)]
    pub caller: Option<String>,
    #[serde(flatten)]
    pub request: Request,
}

/// A non-blank input line. `action` is whatever the line named, even when
/// the rest of it could not be parsed.
#[derive(Debug)]
pub struct RequestLine {
    pub line: usize,
    pub action: String,
    pub parsed: Result<Envelope>,
}

/// Reads JSON-lines requests. Blank lines are skipped.
pub struct RequestReader<R: BufRead> {
    source: R,
}

impl<R: BufRead> RequestReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    /// Lazily parses one request per line. I/O errors end the stream after
    /// being reported once.
    pub fn requests(self) -> impl Iterator<Item = RequestLine> {
        let mut lines = self.source.lines().enumerate();
        let mut failed = false;
        std::iter::from_fn(move || {
            if failed {
                return None;
            }
            for (index, line) in lines.by_ref() {
                match line {
                    Ok(text) if text.trim().is_empty() => continue,
                    Ok(text) => return Some(parse_line(index + 1, &text)),
                    Err(err) => {
                        failed = true;
                        return Some(RequestLine {
                            line: index + 1,
                            action: "unknown".to_string(),
                            parsed: Err(err.into()),
                        });
                    }
                }
            }
            None
        })
    }
}

fn parse_line(line: usize, text: &str) -> RequestLine {
    let value = match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => value,
        Err(err) => {
            return RequestLine {
                line,
                action: "unknown".to_string(),
                parsed: Err(LockerError::Validation(format!("malformed request: {err}"))),
            };
        }
    };
    let action = value
        .get("action")
        .and_then(|a| a.as_str())
        .unwrap_or("unknown")
        .to_string();
    let parsed = serde_json::from_value::<Envelope>(value)
        .map_err(|err| LockerError::Validation(format!("invalid {action} request: {err}")));
    RequestLine {
        line,
        action,
        parsed,
    }
}
