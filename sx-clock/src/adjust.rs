use std::ops::RangeInclusive;

use tracing::{debug, warn};

use crate::{
    audit::{AuditLog, AuditLogEntry},
    command::{AdjustmentCommand, CommandTransport, DeviceCommand, DeviceError, DeviceId},
    register::{RegisterCodec, RegisterReader},
    time_types::HardwareTimestamp,
};

/// Phase steps the device can apply incrementally, in nanoseconds. Anything
/// outside this range is applied by setting the absolute time instead.
pub const ADJUST_TIME_RANGE: RangeInclusive<i64> = -32768..=32767;

/// Builds steering commands, submits them and records the successful ones.
///
/// An adjustment is only written to the audit log after the device accepted
/// it, so the log is always a subset of what was applied to the counter.
#[derive(Debug)]
pub struct AdjustmentEngine<T, L> {
    device_id: DeviceId,
    transport: T,
    audit: L,
}

impl<T: CommandTransport, L: AuditLog> AdjustmentEngine<T, L> {
    pub fn new(device_id: DeviceId, transport: T, audit: L) -> Self {
        Self {
            device_id,
            transport,
            audit,
        }
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn audit(&self) -> &L {
        &self.audit
    }

    fn submit(&self, adjustment: AdjustmentCommand) -> Result<(), DeviceError> {
        let command = DeviceCommand::new(self.device_id, adjustment);
        debug!(op = adjustment.name(), ?command, "submitting clock command");

        self.transport.submit(&command).map_err(|error| {
            warn!(op = adjustment.name(), %error, "device rejected clock command");
            error
        })
    }

    /// Change the frequency of the counter by `delta_ppb` parts per billion.
    pub fn adjust_frequency(&self, delta_ppb: i32) -> Result<(), DeviceError> {
        // The frequency register of the device counts in the opposite direction.
        self.submit(AdjustmentCommand::AdjustFrequency {
            delta: delta_ppb.wrapping_neg(),
        })?;

        self.audit.append(AuditLogEntry::AdjustFrequency { delta_ppb });
        Ok(())
    }

    fn submit_set_time(&self, ts: HardwareTimestamp) -> Result<(), DeviceError> {
        self.submit(AdjustmentCommand::SetTimeImmediate {
            seconds: ts.seconds,
            nanos: ts.nanos,
        })
    }

    pub fn set_time(&self, ts: HardwareTimestamp) -> Result<(), DeviceError> {
        self.submit_set_time(ts)?;

        self.audit.append(AuditLogEntry::SetTime {
            nanos: ts.total_nanos(),
        });
        Ok(())
    }

    /// Step the counter by `delta_ns` nanoseconds.
    ///
    /// Small steps use the incremental adjust command. Larger ones read the
    /// current time, add the delta and set the result, which loses the time
    /// that passes between the read and the write.
    pub fn adjust_time(
        &self,
        codec: &RegisterCodec,
        reader: &impl RegisterReader,
        delta_ns: i64,
    ) -> Result<(), DeviceError> {
        if ADJUST_TIME_RANGE.contains(&delta_ns) {
            self.submit(AdjustmentCommand::AdjustTime {
                delta: delta_ns as i32, // in range, see above
            })?;
        } else {
            let now = codec.read_current(reader);
            let target = now.add_nanos(delta_ns);
            debug!(%now, %target, delta_ns, "phase step out of range, setting time");
            self.submit_set_time(target)?;
        }

        self.audit.append(AuditLogEntry::AdjustTime { delta_ns });
        Ok(())
    }
}
