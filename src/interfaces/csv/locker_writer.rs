use crate::domain::locker::{Locker, LockerStatus};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct LockerRow<'a> {
    id: u64,
    device_id: &'a str,
    cabinet_no: u16,
    door_no: u16,
    status: LockerStatus,
    current_order_id: Option<u64>,
    last_open_at: Option<String>,
}

/// Writes a locker snapshot as CSV, one row per locker.
pub struct LockerWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> LockerWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_lockers(&mut self, lockers: &[Locker]) -> Result<()> {
        for locker in lockers {
            self.writer
                .serialize(LockerRow {
                    id: locker.id.0,
                    device_id: locker.address.device_id.as_str(),
                    cabinet_no: locker.address.cabinet_no,
                    door_no: locker.address.door_no,
                    status: locker.status(),
                    current_order_id: locker.current_order_id().map(|id| id.0),
                    last_open_at: locker.last_open_at.map(|at| at.to_rfc3339()),
                })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
