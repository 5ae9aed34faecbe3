//! Interrupt top half.
//!
//! On every interrupt the top half reads each axis CSR, masks that axis's
//! interrupt, and hands the snapshot to the status worker over a bounded
//! queue. It never blocks, locks or allocates: a full queue drops the
//! snapshot and counts it, the poller re-derives the same bits later.

use crossbeam_channel::{Sender, TrySendError};
use hy8601_common::hal::regs::Csr;
use hy8601_common::hal::types::{InterruptStats, StatusSnapshot};
use hy8601_common::consts::MAX_AXES;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::carrier::InterruptHandler;
use crate::registers::RegisterBank;

/// Interrupt-context capture of the card status.
pub struct TopHalf {
    banks: heapless::Vec<RegisterBank, MAX_AXES>,
    queue: Sender<StatusSnapshot>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl TopHalf {
    /// Top half over `banks` (at most four, extra banks are ignored).
    pub fn new(banks: impl IntoIterator<Item = RegisterBank>, queue: Sender<StatusSnapshot>) -> Self {
        Self {
            banks: banks.into_iter().take(MAX_AXES).collect(),
            queue,
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Capture and enqueue one snapshot. Returns false if it was dropped.
    pub fn capture(&self) -> bool {
        let mut snapshot = StatusSnapshot::new();
        for bank in &self.banks {
            // Capacity equals MAX_AXES, push cannot fail.
            let _ = snapshot.push(bank.csr_raw());
            bank.set_int_mask(Csr::empty());
        }

        match self.queue.try_send(snapshot) {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Delivered and dropped counters.
    pub fn stats(&self) -> InterruptStats {
        InterruptStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

impl InterruptHandler for TopHalf {
    fn on_interrupt(&self) {
        self.capture();
    }
}
