use std::fmt::Display;

use serde::{Deserialize, Serialize};

pub const NANOS_PER_SECOND: u32 = 1_000_000_000;

/// A point in UTC as kept by the free-running counter of the device.
///
/// Values read from hardware are passed through as-is, so `nanos` is only
/// guaranteed to be below [`NANOS_PER_SECOND`] for timestamps computed by
/// this crate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct HardwareTimestamp {
    pub seconds: u32,
    pub nanos: u32,
}

impl HardwareTimestamp {
    pub const fn new(seconds: u32, nanos: u32) -> Self {
        Self { seconds, nanos }
    }

    /// Total nanoseconds since the epoch of the counter.
    pub fn total_nanos(self) -> i64 {
        i64::from(self.seconds) * i64::from(NANOS_PER_SECOND) + i64::from(self.nanos)
    }

    /// Build a timestamp from a (possibly negative) nanosecond count.
    ///
    /// Nanoseconds end up in `[0, 1_000_000_000)` with the quotient carried
    /// into the seconds, which wrap modulo 2^32 like the register field.
    pub fn from_total_nanos(total: i128) -> Self {
        let per_second = i128::from(NANOS_PER_SECOND);

        // Since we want nanos to be in [0,1_000_000_000), we need
        // euclidean division and remainder.
        let seconds = total.div_euclid(per_second);
        let nanos = total.rem_euclid(per_second);

        Self {
            seconds: seconds as u32,
            nanos: nanos as u32, // always fits, see rem_euclid above
        }
    }

    /// Shift this timestamp by a signed number of nanoseconds, renormalizing
    /// the result.
    pub fn add_nanos(self, delta: i64) -> Self {
        Self::from_total_nanos(i128::from(self.total_nanos()) + i128::from(delta))
    }
}

impl Display for HardwareTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanos)
    }
}

/// Timestamp attached by hardware to a completion queue entry.
///
/// Only the low 8 bits of the seconds survive, so the value is ambiguous
/// modulo 256 seconds until it is reconciled against the full counter.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct TruncatedTimestamp {
    pub seconds: u8,
    /// Nanoseconds, a 30 bit field in the completion entry.
    pub nanos: u32,
}

impl TruncatedTimestamp {
    pub const fn new(seconds: u8, nanos: u32) -> Self {
        Self { seconds, nanos }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_nanos() {
        assert_eq!(HardwareTimestamp::new(0, 0).total_nanos(), 0);
        assert_eq!(
            HardwareTimestamp::new(100, 500_000_000).total_nanos(),
            100_500_000_000
        );
        assert_eq!(
            HardwareTimestamp::new(u32::MAX, 999_999_999).total_nanos(),
            u32::MAX as i64 * 1_000_000_000 + 999_999_999
        );
    }

    #[test]
    fn test_from_total_nanos_normalizes() {
        assert_eq!(
            HardwareTimestamp::from_total_nanos(102_500_000_000),
            HardwareTimestamp::new(102, 500_000_000)
        );
        assert_eq!(
            HardwareTimestamp::from_total_nanos(1_000_000_000),
            HardwareTimestamp::new(1, 0)
        );
        assert_eq!(
            HardwareTimestamp::from_total_nanos(999_999_999),
            HardwareTimestamp::new(0, 999_999_999)
        );
    }

    #[test]
    fn test_from_total_nanos_negative() {
        // -1ns is the last nanosecond of the previous (wrapped) second
        assert_eq!(
            HardwareTimestamp::from_total_nanos(-1),
            HardwareTimestamp::new(u32::MAX, 999_999_999)
        );
    }

    #[test]
    fn test_add_nanos() {
        let ts = HardwareTimestamp::new(100, 500_000_000);
        assert_eq!(ts.add_nanos(2_000_000_000), HardwareTimestamp::new(102, 500_000_000));
        assert_eq!(ts.add_nanos(600_000_000), HardwareTimestamp::new(101, 100_000_000));
        assert_eq!(ts.add_nanos(-600_000_000), HardwareTimestamp::new(99, 900_000_000));
        assert_eq!(ts.add_nanos(-100_500_000_000), HardwareTimestamp::new(0, 0));
    }

    #[test]
    fn test_add_nanos_renormalizes_hardware_overflow() {
        // the counter is trusted, but an out of range value must not leak
        // into a computed timestamp
        let ts = HardwareTimestamp::new(10, 1_500_000_000);
        assert_eq!(ts.add_nanos(0), HardwareTimestamp::new(11, 500_000_000));
    }

    #[test]
    fn test_display() {
        assert_eq!(HardwareTimestamp::new(12, 34).to_string(), "12.000000034");
        assert_eq!(
            HardwareTimestamp::new(1_700_000_000, 999_999_999).to_string(),
            "1700000000.999999999"
        );
    }
}
