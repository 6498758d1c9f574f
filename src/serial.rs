//! Serial number allocation.
//!
//! A monotonically increasing counter rather than random serials: uniqueness
//! then holds without consulting an issuance history, which this crate does
//! not keep.

use std::sync::atomic::{AtomicU64, Ordering};

/// Certificate serial number.
pub type SerialNumber = u64;

/// Lock-free, strictly increasing serial counter.
///
/// One allocator lives inside each CA bundle, so replacing the bundle starts
/// a fresh sequence.
#[derive(Debug)]
pub struct SerialAllocator {
    next: AtomicU64,
}

impl Default for SerialAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialAllocator {
    /// Starts at serial 1. Zero is never handed out.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: SerialNumber) -> Self {
        Self {
            next: AtomicU64::new(first.max(1)),
        }
    }

    /// Returns the next serial, or `None` once the 64-bit space is spent.
    pub fn next(&self) -> Option<SerialNumber> {
        self.next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_add(1))
            .ok()
    }

    /// The serial the next call to [`SerialAllocator::next`] would return.
    pub fn peek(&self) -> SerialNumber {
        self.next.load(Ordering::Acquire)
    }
}
