//! User space access to the UTC register block.

use std::{
    fs::File,
    io,
    os::unix::fs::FileExt,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use sx_clock::{CommandTransport, DeviceCommand, DeviceError, RegisterReader};
use tracing::warn;

/// UTC register block read with positioned reads from a file, such as
/// `/dev/mem` or a saved register dump.
///
/// The device stores the block big endian. A failing read is reported once
/// and then reads as zero, the clock treats register reads as infallible.
#[derive(Debug)]
pub struct FileRegisters {
    file: File,
    path: PathBuf,
    utc_offset: u64,
    read_failed: AtomicBool,
}

impl FileRegisters {
    pub fn open(path: impl AsRef<Path>, utc_offset: u64) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            utc_offset,
            read_failed: AtomicBool::new(false),
        })
    }

    fn read_bytes<const N: usize>(&self, byte_offset: u32) -> [u8; N] {
        let mut buf = [0u8; N];
        let position = self.utc_offset + u64::from(byte_offset);

        if let Err(error) = self.file.read_exact_at(&mut buf, position) {
            if !self.read_failed.swap(true, Ordering::Relaxed) {
                warn!(path = ?self.path, position, %error, "could not read UTC register");
            }
            return [0u8; N];
        }

        buf
    }
}

impl RegisterReader for FileRegisters {
    fn read_u64(&self) -> u64 {
        u64::from_be_bytes(self.read_bytes(0))
    }

    fn read_u32(&self, byte_offset: u32) -> u32 {
        u32::from_be_bytes(self.read_bytes(byte_offset))
    }
}

/// Transport for tools that only observe the clock. Every command is refused.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadOnlyTransport;

impl CommandTransport for ReadOnlyTransport {
    fn submit(&self, command: &DeviceCommand) -> Result<(), DeviceError> {
        warn!(op = command.adjustment.name(), "refusing clock command on read-only access");
        Err(DeviceError::NoDevice)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use sx_clock::{AdjustmentCommand, DeviceId};

    use super::*;

    fn register_file(name: &str, contents: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "sx-clock-ctl-{}-{name}",
            std::process::id()
        ));
        let mut file = File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    #[test]
    fn test_reads_big_endian_at_offset() {
        let mut contents = vec![0xffu8; 16];
        contents.extend_from_slice(&[0x00, 0x00, 0x00, 0x64, 0x1d, 0xcd, 0x65, 0x00]);
        let path = register_file("offset", &contents);

        let registers = FileRegisters::open(&path, 16).unwrap();
        assert_eq!(registers.read_u64(), 0x0000_0064_1dcd_6500);
        assert_eq!(registers.read_u32(0), 100);
        assert_eq!(registers.read_u32(4), 500_000_000);

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_short_file_reads_zero() {
        let path = register_file("short", &[0x01, 0x02]);

        let registers = FileRegisters::open(&path, 0).unwrap();
        assert_eq!(registers.read_u64(), 0);
        assert_eq!(registers.read_u32(4), 0);

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_read_only_transport() {
        let command =
            DeviceCommand::new(DeviceId(1), AdjustmentCommand::AdjustFrequency { delta: 1 });
        assert_eq!(
            ReadOnlyTransport.submit(&command),
            Err(DeviceError::NoDevice)
        );
    }
}
