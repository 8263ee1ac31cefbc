//! Reconstruction of completion queue timestamps.
//!
//! Hardware only stores the low 8 bits of the seconds in a completion queue
//! entry. The full value is recovered from the free-running counter, assuming
//! the entry is less than 256 seconds old. Older entries come out exactly a
//! multiple of 256 seconds too late; the truncated field simply does not carry
//! enough information to do better.

use crate::{
    register::{RegisterCodec, RegisterReader},
    time_types::{HardwareTimestamp, TruncatedTimestamp},
};

/// Full seconds value of a timestamp whose seconds were truncated to
/// `truncated`, given the current full seconds of the counter.
///
/// Wraps modulo 2^32 like the counter itself.
pub fn reconstruct_seconds(now_seconds: u32, truncated: u8) -> u32 {
    let now_truncated = now_seconds as u8;

    if now_truncated >= truncated {
        now_seconds.wrapping_sub(u32::from(now_truncated - truncated))
    } else {
        // the counter wrapped between capture and now
        now_seconds
            .wrapping_sub(256)
            .wrapping_add(u32::from(truncated - now_truncated))
    }
}

/// Turn a truncated completion queue timestamp into full UTC time, using the
/// current seconds of the counter to disambiguate.
pub fn reconcile(
    codec: &RegisterCodec,
    reader: &impl RegisterReader,
    cqe_ts: TruncatedTimestamp,
) -> HardwareTimestamp {
    let now_seconds = codec.read_seconds(reader);

    HardwareTimestamp {
        seconds: reconstruct_seconds(now_seconds, cqe_ts.seconds),
        nanos: cqe_ts.nanos,
    }
}
