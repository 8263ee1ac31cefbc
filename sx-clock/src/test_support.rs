//! Test doubles for the collaborators of the clock.

use std::sync::{
    atomic::{AtomicI32, AtomicU64, AtomicUsize, Ordering},
    Mutex,
};

use crate::{
    AdjustmentCommand, CommandTransport, DeviceCommand, DeviceError, HardwareGeneration,
    HardwareTimestamp, RegisterCodec, RegisterReader,
};

/// UTC register block holding a settable raw word, in the byte order of the
/// device (the seconds field of Spectrum-2 sits at offset 0).
#[derive(Debug, Default)]
pub struct TestRegisters {
    word: AtomicU64,
    reads: AtomicUsize,
}

impl TestRegisters {
    pub fn new(word: u64) -> Self {
        Self {
            word: AtomicU64::new(word),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, word: u64) {
        self.word.store(word, Ordering::SeqCst);
    }

    pub fn word(&self) -> u64 {
        self.word.load(Ordering::SeqCst)
    }

    /// Number of register reads performed so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl RegisterReader for TestRegisters {
    fn read_u64(&self) -> u64 {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.word()
    }

    fn read_u32(&self, byte_offset: u32) -> u32 {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match byte_offset {
            0 => (self.word() >> 32) as u32,
            4 => self.word() as u32,
            other => panic!("read outside of the UTC block at offset {other}"),
        }
    }
}

/// Transport that records every command and optionally fails them all.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    commands: Mutex<Vec<DeviceCommand>>,
    failure: Mutex<Option<DeviceError>>,
}

impl RecordingTransport {
    pub fn failing(error: DeviceError) -> Self {
        Self {
            commands: Mutex::default(),
            failure: Mutex::new(Some(error)),
        }
    }

    pub fn set_failure(&self, failure: Option<DeviceError>) {
        *self.failure.lock().unwrap() = failure;
    }

    /// Commands submitted so far, including rejected ones.
    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn adjustments(&self) -> Vec<AdjustmentCommand> {
        self.commands().into_iter().map(|c| c.adjustment).collect()
    }
}

impl CommandTransport for RecordingTransport {
    fn submit(&self, command: &DeviceCommand) -> Result<(), DeviceError> {
        self.commands.lock().unwrap().push(*command);
        match *self.failure.lock().unwrap() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Software model of the UTC counter that applies the commands it receives.
///
/// The counter does not advance on its own, which keeps tests deterministic.
#[derive(Debug)]
pub struct TestDevice {
    codec: RegisterCodec,
    registers: TestRegisters,
    frequency: AtomicI32,
    transport: RecordingTransport,
}

impl TestDevice {
    pub fn new(generation: HardwareGeneration, now: HardwareTimestamp) -> Self {
        let codec = generation.codec();
        Self {
            codec,
            registers: TestRegisters::new(codec.encode(now)),
            frequency: AtomicI32::new(0),
            transport: RecordingTransport::default(),
        }
    }

    pub fn now(&self) -> HardwareTimestamp {
        self.codec.decode(self.registers.word())
    }

    pub fn set_now(&self, now: HardwareTimestamp) {
        self.registers.set(self.codec.encode(now));
    }

    /// Frequency register value, in hardware polarity.
    pub fn frequency(&self) -> i32 {
        self.frequency.load(Ordering::SeqCst)
    }

    pub fn registers(&self) -> &TestRegisters {
        &self.registers
    }

    pub fn transport(&self) -> &RecordingTransport {
        &self.transport
    }
}

impl RegisterReader for TestDevice {
    fn read_u64(&self) -> u64 {
        self.registers.read_u64()
    }

    fn read_u32(&self, byte_offset: u32) -> u32 {
        self.registers.read_u32(byte_offset)
    }
}

impl CommandTransport for TestDevice {
    fn submit(&self, command: &DeviceCommand) -> Result<(), DeviceError> {
        self.transport.submit(command)?;

        match command.adjustment {
            AdjustmentCommand::SetTimeImmediate { seconds, nanos } => {
                self.set_now(HardwareTimestamp::new(seconds, nanos))
            }
            AdjustmentCommand::AdjustTime { delta } => {
                self.set_now(self.now().add_nanos(delta.into()))
            }
            AdjustmentCommand::AdjustFrequency { delta } => {
                self.frequency.store(delta, Ordering::SeqCst)
            }
        }

        Ok(())
    }
}
