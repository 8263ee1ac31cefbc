use std::{
    collections::VecDeque,
    fmt::Display,
    sync::{Mutex, PoisonError},
};

use tracing::info;

/// Record of one successfully applied clock adjustment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AuditLogEntry {
    /// Frequency change as requested by the caller, in parts per billion.
    AdjustFrequency { delta_ppb: i32 },
    /// Phase change as requested by the caller, in nanoseconds.
    AdjustTime { delta_ns: i64 },
    /// Absolute time the counter was set to, in nanoseconds.
    SetTime { nanos: i64 },
}

impl Display for AuditLogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditLogEntry::AdjustFrequency { delta_ppb } => write!(f, "adj-freq {delta_ppb}ppb"),
            AuditLogEntry::AdjustTime { delta_ns } => write!(f, "adj-time {delta_ns}ns"),
            AuditLogEntry::SetTime { nanos } => write!(f, "set-time {nanos}ns"),
        }
    }
}

/// Sink for adjustment records.
///
/// Appending never fails from the point of view of the clock.
pub trait AuditLog {
    fn append(&self, entry: AuditLogEntry);
}

impl<L: AuditLog + ?Sized> AuditLog for &L {
    fn append(&self, entry: AuditLogEntry) {
        (**self).append(entry)
    }
}

/// Audit log that emits every entry as a tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn append(&self, entry: AuditLogEntry) {
        info!(target: "sx_clock::audit", %entry, "clock adjusted");
    }
}

/// Bounded in-memory audit log. Once full, the oldest entries are dropped.
#[derive(Debug)]
pub struct MemoryAuditLog {
    capacity: usize,
    entries: Mutex<VecDeque<AuditLogEntry>>,
}

impl MemoryAuditLog {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy of the retained entries, oldest first.
    pub fn snapshot(&self) -> Vec<AuditLogEntry> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryAuditLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&self, entry: AuditLogEntry) {
        if self.capacity == 0 {
            return;
        }

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }
}
