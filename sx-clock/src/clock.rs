use std::{
    sync::{Arc, OnceLock},
    time::{SystemTime, UNIX_EPOCH},
};

use thiserror::Error as ThisError;
use tracing::info;

use crate::{
    adjust::AdjustmentEngine,
    audit::AuditLog,
    command::{CommandTransport, DeviceError, DeviceId},
    reconcile::reconcile,
    register::{HardwareGeneration, RegisterCodec, RegisterReader},
    time_types::{HardwareTimestamp, TruncatedTimestamp},
};

/// Largest frequency adjustment the device accepts, in parts per billion.
/// The frequency register is not limited beyond its 32 bit width.
pub const MAX_ADJUSTMENT_MAGNITUDE: i32 = i32::MAX;

#[derive(Debug, Copy, Clone, PartialEq, Eq, ThisError)]
pub enum ClockError {
    #[error("clock command failed: {0}")]
    Device(#[from] DeviceError),
    #[error("hardware clock used before initialization")]
    Uninitialized,
    #[error("hardware clock was already initialized")]
    AlreadyInitialized,
}

/// Capabilities advertised to the clock framework.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ClockInfo {
    pub name: &'static str,
    /// Largest frequency adjustment accepted, in parts per billion.
    pub max_adj: i32,
    pub n_alarm: u32,
    pub n_ext_ts: u32,
    pub n_per_out: u32,
    pub pps: bool,
}

impl ClockInfo {
    pub const fn for_generation(generation: HardwareGeneration) -> Self {
        let name = match generation {
            HardwareGeneration::Spc2 => "sx_clock_spc2",
            HardwareGeneration::Spc3 => "sx_clock_spc3",
        };

        ClockInfo {
            name,
            max_adj: MAX_ADJUSTMENT_MAGNITUDE,
            n_alarm: 0,
            n_ext_ts: 0,
            n_per_out: 0,
            pps: false,
        }
    }
}

/// Operations a clock framework can invoke on a registered clock.
pub trait PtpClockOps: Send + Sync {
    fn get_time(&self) -> Result<HardwareTimestamp, ClockError>;
    fn set_time(&self, ts: HardwareTimestamp) -> Result<(), ClockError>;
    fn adjust_frequency(&self, delta_ppb: i32) -> Result<(), ClockError>;
    fn adjust_time(&self, delta_ns: i64) -> Result<(), ClockError>;
}

/// PTP clock framework that exposes registered clocks to the rest of the
/// system.
pub trait ClockFramework {
    type Error: From<ClockError>;

    fn register(&mut self, info: ClockInfo, ops: Arc<dyn PtpClockOps>) -> Result<(), Self::Error>;
}

/// The UTC counter of one device.
///
/// The hardware generation is bound once through [`HardwareClock::initialize`]
/// and cannot change afterwards; every operation before that fails with
/// [`ClockError::Uninitialized`].
///
/// Adjustments are not serialized against each other. Callers that need
/// adjustments to be mutually exclusive must hold their own lock around them.
#[derive(Debug)]
pub struct HardwareClock<R, T, L> {
    codec: OnceLock<RegisterCodec>,
    reader: R,
    engine: AdjustmentEngine<T, L>,
}

impl<R: RegisterReader, T: CommandTransport, L: AuditLog> HardwareClock<R, T, L> {
    pub fn new(device_id: DeviceId, reader: R, transport: T, audit: L) -> Self {
        Self {
            codec: OnceLock::new(),
            reader,
            engine: AdjustmentEngine::new(device_id, transport, audit),
        }
    }

    pub fn initialize(&self, generation: HardwareGeneration) -> Result<(), ClockError> {
        let mut bound = false;
        self.codec.get_or_init(|| {
            bound = true;
            generation.codec()
        });

        if !bound {
            return Err(ClockError::AlreadyInitialized);
        }

        info!(%generation, device_id = self.engine.device_id().0, "hardware clock initialized");
        Ok(())
    }

    fn codec(&self) -> Result<&RegisterCodec, ClockError> {
        self.codec.get().ok_or(ClockError::Uninitialized)
    }

    pub fn generation(&self) -> Option<HardwareGeneration> {
        self.codec.get().map(RegisterCodec::generation)
    }

    pub fn info(&self) -> Result<ClockInfo, ClockError> {
        Ok(ClockInfo::for_generation(self.codec()?.generation()))
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn transport(&self) -> &T {
        self.engine.transport()
    }

    pub fn audit(&self) -> &L {
        self.engine.audit()
    }

    pub fn get_time(&self) -> Result<HardwareTimestamp, ClockError> {
        Ok(self.codec()?.read_current(&self.reader))
    }

    pub fn set_time(&self, ts: HardwareTimestamp) -> Result<(), ClockError> {
        self.codec()?;
        Ok(self.engine.set_time(ts)?)
    }

    pub fn adjust_frequency(&self, delta_ppb: i32) -> Result<(), ClockError> {
        self.codec()?;
        Ok(self.engine.adjust_frequency(delta_ppb)?)
    }

    pub fn adjust_time(&self, delta_ns: i64) -> Result<(), ClockError> {
        let codec = self.codec()?;
        Ok(self.engine.adjust_time(codec, &self.reader, delta_ns)?)
    }

    /// Full UTC time of a completion queue timestamp, see [`reconcile`].
    pub fn reconcile(&self, cqe_ts: TruncatedTimestamp) -> Result<HardwareTimestamp, ClockError> {
        Ok(reconcile(self.codec()?, &self.reader, cqe_ts))
    }

    /// Human readable comparison of the hardware counter with the host clock.
    pub fn dump(&self, host_now: SystemTime) -> Result<String, ClockError> {
        let hardware = self.get_time()?;
        let host = host_now.duration_since(UNIX_EPOCH).unwrap_or_default();

        Ok(format!(
            "Hardware UTC:  {}.{:09}\nLinux UTC:     {}.{:09}\n\n\n",
            hardware.seconds,
            hardware.nanos,
            host.as_secs() as u32,
            host.subsec_nanos(),
        ))
    }

    /// Nothing is held beyond the lifetime of the clock itself.
    pub fn cleanup(&self) -> Result<(), ClockError> {
        Ok(())
    }
}

impl<R, T, L> HardwareClock<R, T, L>
where
    R: RegisterReader + Send + Sync + 'static,
    T: CommandTransport + Send + Sync + 'static,
    L: AuditLog + Send + Sync + 'static,
{
    /// Hand the operation table of this clock to `framework`.
    pub fn register<F: ClockFramework>(
        self: &Arc<Self>,
        framework: &mut F,
    ) -> Result<(), F::Error> {
        let info = self.info()?;
        framework.register(info, self.clone())?;

        info!(name = info.name, "hardware clock registered");
        Ok(())
    }
}

impl<R, T, L> PtpClockOps for HardwareClock<R, T, L>
where
    R: RegisterReader + Send + Sync,
    T: CommandTransport + Send + Sync,
    L: AuditLog + Send + Sync,
{
    fn get_time(&self) -> Result<HardwareTimestamp, ClockError> {
        HardwareClock::get_time(self)
    }

    fn set_time(&self, ts: HardwareTimestamp) -> Result<(), ClockError> {
        HardwareClock::set_time(self, ts)
    }

    fn adjust_frequency(&self, delta_ppb: i32) -> Result<(), ClockError> {
        HardwareClock::adjust_frequency(self, delta_ppb)
    }

    fn adjust_time(&self, delta_ns: i64) -> Result<(), ClockError> {
        HardwareClock::adjust_time(self, delta_ns)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        audit::{AuditLogEntry, MemoryAuditLog},
        command::AdjustmentCommand,
        test_support::{RecordingTransport, TestDevice, TestRegisters},
    };

    type TestClock<'a> = HardwareClock<&'a TestDevice, &'a TestDevice, MemoryAuditLog>;

    fn clock(device: &TestDevice) -> TestClock<'_> {
        HardwareClock::new(DeviceId(1), device, device, MemoryAuditLog::default())
    }

    #[test]
    fn test_uninitialized() {
        let device = TestDevice::new(HardwareGeneration::Spc2, HardwareTimestamp::new(100, 0));
        let clock = clock(&device);

        assert_eq!(clock.generation(), None);
        assert_eq!(clock.get_time(), Err(ClockError::Uninitialized));
        assert_eq!(
            clock.set_time(HardwareTimestamp::new(1, 0)),
            Err(ClockError::Uninitialized)
        );
        assert_eq!(clock.adjust_frequency(1), Err(ClockError::Uninitialized));
        assert_eq!(clock.adjust_time(1), Err(ClockError::Uninitialized));
        assert_eq!(
            clock.reconcile(TruncatedTimestamp::new(0, 0)),
            Err(ClockError::Uninitialized)
        );
        assert_eq!(clock.info(), Err(ClockError::Uninitialized));

        // nothing reached the device
        assert_eq!(device.registers().reads(), 0);
        assert!(device.transport().commands().is_empty());
        assert!(clock.audit().is_empty());
    }

    #[test]
    fn test_initialize_once() {
        let device = TestDevice::new(HardwareGeneration::Spc3, HardwareTimestamp::new(100, 0));
        let clock = clock(&device);

        clock.initialize(HardwareGeneration::Spc3).unwrap();
        assert_eq!(
            clock.initialize(HardwareGeneration::Spc2),
            Err(ClockError::AlreadyInitialized)
        );
        assert_eq!(clock.generation(), Some(HardwareGeneration::Spc3));
    }

    #[test]
    fn test_get_time_uses_bound_layout() {
        let now = HardwareTimestamp::new(1_700_000_000, 250_000_000);

        for generation in [HardwareGeneration::Spc2, HardwareGeneration::Spc3] {
            let device = TestDevice::new(generation, now);
            let clock = clock(&device);
            clock.initialize(generation).unwrap();
            assert_eq!(clock.get_time(), Ok(now));
        }
    }

    #[test]
    fn test_adjustments_reach_device() {
        let device = TestDevice::new(HardwareGeneration::Spc2, HardwareTimestamp::new(100, 0));
        let clock = clock(&device);
        clock.initialize(HardwareGeneration::Spc2).unwrap();

        clock.adjust_frequency(1000).unwrap();
        assert_eq!(device.frequency(), -1000);

        clock.adjust_time(500).unwrap();
        assert_eq!(clock.get_time(), Ok(HardwareTimestamp::new(100, 500)));

        clock.adjust_time(-2_000_000_000).unwrap();
        assert_eq!(clock.get_time(), Ok(HardwareTimestamp::new(98, 500)));

        clock
            .set_time(HardwareTimestamp::new(5_000, 1))
            .unwrap();
        assert_eq!(clock.get_time(), Ok(HardwareTimestamp::new(5_000, 1)));

        assert_eq!(
            device.transport().adjustments(),
            vec![
                AdjustmentCommand::AdjustFrequency { delta: -1000 },
                AdjustmentCommand::AdjustTime { delta: 500 },
                AdjustmentCommand::SetTimeImmediate {
                    seconds: 98,
                    nanos: 500
                },
                AdjustmentCommand::SetTimeImmediate {
                    seconds: 5_000,
                    nanos: 1
                },
            ]
        );
        assert_eq!(
            clock.audit().snapshot(),
            vec![
                AuditLogEntry::AdjustFrequency { delta_ppb: 1000 },
                AuditLogEntry::AdjustTime { delta_ns: 500 },
                AuditLogEntry::AdjustTime {
                    delta_ns: -2_000_000_000
                },
                AuditLogEntry::SetTime {
                    nanos: 5_000_000_000_001
                },
            ]
        );
    }

    #[test]
    fn test_device_error_passthrough() {
        let device = TestDevice::new(HardwareGeneration::Spc3, HardwareTimestamp::new(100, 0));
        device
            .transport()
            .set_failure(Some(DeviceError::Status(0x0b)));
        let clock = clock(&device);
        clock.initialize(HardwareGeneration::Spc3).unwrap();

        let expected = Err(ClockError::Device(DeviceError::Status(0x0b)));
        assert_eq!(clock.adjust_frequency(10), expected);
        assert_eq!(clock.adjust_time(10), expected);
        assert_eq!(clock.adjust_time(i64::MAX), expected);
        assert_eq!(clock.set_time(HardwareTimestamp::new(1, 2)), expected);

        assert!(clock.audit().is_empty());
        assert_eq!(device.now(), HardwareTimestamp::new(100, 0));
        assert_eq!(device.frequency(), 0);
    }

    #[test]
    fn test_reconcile() {
        let device = TestDevice::new(HardwareGeneration::Spc3, HardwareTimestamp::new(100_106, 0));
        let clock = clock(&device);
        clock.initialize(HardwareGeneration::Spc3).unwrap();

        assert_eq!(
            clock.reconcile(TruncatedTimestamp::new(250, 42)),
            Ok(HardwareTimestamp::new(100_090, 42))
        );
    }

    #[test]
    fn test_info() {
        let device = TestDevice::new(HardwareGeneration::Spc2, HardwareTimestamp::default());
        let clock = clock(&device);
        clock.initialize(HardwareGeneration::Spc2).unwrap();

        let info = clock.info().unwrap();
        assert_eq!(info.max_adj, i32::MAX);
        assert_eq!(info.name, "sx_clock_spc2");
        assert_eq!((info.n_alarm, info.n_ext_ts, info.n_per_out), (0, 0, 0));
        assert!(!info.pps);

        assert_ne!(
            ClockInfo::for_generation(HardwareGeneration::Spc2),
            ClockInfo::for_generation(HardwareGeneration::Spc3)
        );
    }

    #[test]
    fn test_dump() {
        let device = TestDevice::new(HardwareGeneration::Spc2, HardwareTimestamp::new(100, 5));
        let clock = clock(&device);
        clock.initialize(HardwareGeneration::Spc2).unwrap();

        let host = UNIX_EPOCH + Duration::new(1_700_000_000, 123_000);
        assert_eq!(
            clock.dump(host).unwrap(),
            "Hardware UTC:  100.000000005\nLinux UTC:     1700000000.000123000\n\n\n"
        );
        assert!(clock.cleanup().is_ok());
    }

    #[derive(Default)]
    struct TestFramework {
        registered: Vec<(ClockInfo, Arc<dyn PtpClockOps>)>,
    }

    impl ClockFramework for TestFramework {
        type Error = ClockError;

        fn register(
            &mut self,
            info: ClockInfo,
            ops: Arc<dyn PtpClockOps>,
        ) -> Result<(), ClockError> {
            self.registered.push((info, ops));
            Ok(())
        }
    }

    #[test]
    fn test_register() {
        let now = HardwareTimestamp::new(1_000, 0);
        let codec = HardwareGeneration::Spc3.codec();
        let clock = Arc::new(HardwareClock::new(
            DeviceId(2),
            TestRegisters::new(codec.encode(now)),
            RecordingTransport::default(),
            MemoryAuditLog::default(),
        ));
        let mut framework = TestFramework::default();

        assert_eq!(
            clock.register(&mut framework),
            Err(ClockError::Uninitialized)
        );
        assert!(framework.registered.is_empty());

        clock.initialize(HardwareGeneration::Spc3).unwrap();
        clock.register(&mut framework).unwrap();

        let (info, ops) = &framework.registered[0];
        assert_eq!(info.name, "sx_clock_spc3");
        assert_eq!(ops.get_time(), Ok(now));

        ops.adjust_frequency(-20).unwrap();
        assert_eq!(
            clock.transport().commands()[0].adjustment,
            AdjustmentCommand::AdjustFrequency { delta: 20 }
        );
        assert_eq!(clock.transport().commands()[0].device_id, DeviceId(2));
    }
}
