//! Clock core for the UTC counter of Spectrum switch ASICs.
//!
//! The device carries a free-running UTC counter that is read through a
//! memory-mapped register block and steered through register-access
//! commands. This crate decodes that counter for both ASIC generations,
//! builds the steering commands, and turns the truncated timestamps that
//! hardware attaches to completion queue entries back into full UTC time.
//!
//! All I/O is left to the caller: the register read primitive, the command
//! transport and the audit log are traits implemented outside this crate.
#![forbid(unsafe_code)]

mod adjust;
mod audit;
mod clock;
mod command;
mod reconcile;
mod register;
mod time_types;

#[cfg(any(test, feature = "__internal-test"))]
pub mod test_support;

pub use adjust::{AdjustmentEngine, ADJUST_TIME_RANGE};
pub use audit::{AuditLog, AuditLogEntry, MemoryAuditLog, TracingAuditLog};
pub use clock::{
    ClockError, ClockFramework, ClockInfo, HardwareClock, PtpClockOps, MAX_ADJUSTMENT_MAGNITUDE,
};
pub use command::{
    AdjustmentCommand, CommandTransport, DeviceCommand, DeviceError, DeviceId, MtutcOperation,
    MtutcRegister,
};
pub use reconcile::{reconcile, reconstruct_seconds};
pub use register::{HardwareGeneration, RegisterCodec, RegisterReader};
pub use time_types::{HardwareTimestamp, TruncatedTimestamp, NANOS_PER_SECOND};
