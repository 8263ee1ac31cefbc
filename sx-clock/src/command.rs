//! Steering commands for the UTC counter (the MTUTC access register).

use thiserror::Error as ThisError;

/// Identifier of the device a command is addressed to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct DeviceId(pub u8);

#[derive(Debug, Copy, Clone, PartialEq, Eq, ThisError)]
pub enum DeviceError {
    #[error("Device is busy processing another command.")]
    Busy,
    #[error("Device did not answer the command in time.")]
    Timeout,
    #[error("Device has gone away")]
    NoDevice,
    #[error("Device rejected the command with status {0:#06x}")]
    Status(u16),
}

/// A single steering operation on the UTC counter.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AdjustmentCommand {
    SetTimeImmediate { seconds: u32, nanos: u32 },
    /// Frequency adjustment in the polarity of the hardware register.
    AdjustFrequency { delta: i32 },
    /// Phase step in nanoseconds, limited to `[-32768, 32767]` by hardware.
    AdjustTime { delta: i32 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DeviceCommand {
    pub device_id: DeviceId,
    pub adjustment: AdjustmentCommand,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MtutcOperation {
    SetTimeImmediate = 1,
    AdjustTime = 2,
    AdjustFrequencyUtc = 3,
}

/// Field image of the MTUTC register as written by the transport.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct MtutcRegister {
    pub device_id: u8,
    pub operation: u8,
    pub freq_adjustment: i32,
    pub time_adjustment: i32,
    pub utc_sec: u32,
    pub utc_nsec: u32,
}

impl AdjustmentCommand {
    pub fn operation(&self) -> MtutcOperation {
        match self {
            AdjustmentCommand::SetTimeImmediate { .. } => MtutcOperation::SetTimeImmediate,
            AdjustmentCommand::AdjustFrequency { .. } => MtutcOperation::AdjustFrequencyUtc,
            AdjustmentCommand::AdjustTime { .. } => MtutcOperation::AdjustTime,
        }
    }

    /// Short name of the operation, used in log messages.
    pub fn name(&self) -> &'static str {
        match self {
            AdjustmentCommand::SetTimeImmediate { .. } => "set-time",
            AdjustmentCommand::AdjustFrequency { .. } => "adj-freq",
            AdjustmentCommand::AdjustTime { .. } => "adj-time",
        }
    }
}

impl DeviceCommand {
    pub fn new(device_id: DeviceId, adjustment: AdjustmentCommand) -> Self {
        Self {
            device_id,
            adjustment,
        }
    }

    /// Register image for this command, all unused fields zeroed.
    pub fn to_register(&self) -> MtutcRegister {
        let mut reg = MtutcRegister {
            device_id: self.device_id.0,
            operation: self.adjustment.operation() as u8,
            ..Default::default()
        };

        match self.adjustment {
            AdjustmentCommand::SetTimeImmediate { seconds, nanos } => {
                reg.utc_sec = seconds;
                reg.utc_nsec = nanos;
            }
            AdjustmentCommand::AdjustFrequency { delta } => reg.freq_adjustment = delta,
            AdjustmentCommand::AdjustTime { delta } => reg.time_adjustment = delta,
        }

        reg
    }
}

/// Synchronous command channel to the device.
///
/// Every call is attempted at most once; retry policy, if any, lives in the
/// implementation or above the clock.
pub trait CommandTransport {
    fn submit(&self, command: &DeviceCommand) -> Result<(), DeviceError>;
}

impl<T: CommandTransport + ?Sized> CommandTransport for &T {
    fn submit(&self, command: &DeviceCommand) -> Result<(), DeviceError> {
        (**self).submit(command)
    }
}
