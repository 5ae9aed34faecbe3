//! IP carrier board abstraction.
//!
//! A carrier maps the register window of a slot, routes the slot's
//! interrupt line to a handler through a 256-entry vector table, and gates
//! the line: after each delivery the line stays disabled until
//! [`Carrier::irq_enable`] is called again.

use hy8601_common::hal::error::HalError;
use std::sync::{Arc, OnceLock};

use crate::registers::RegisterWindow;

/// Interrupt-level callback.
///
/// Runs in interrupt context: must not block, lock or allocate.
pub trait InterruptHandler: Send + Sync {
    /// Service one interrupt.
    fn on_interrupt(&self);
}

/// Carrier board operations needed by the controller.
pub trait Carrier: Send + Sync {
    /// Short carrier name for logs and reports.
    fn name(&self) -> &'static str;

    /// Map the I/O window of the module in `slot`.
    fn map_window(&self, slot: u32) -> Result<Arc<dyn RegisterWindow>, HalError>;

    /// Route `vector` on `slot` to `handler`.
    fn int_connect(
        &self,
        slot: u32,
        vector: u8,
        handler: Arc<dyn InterruptHandler>,
    ) -> Result<(), HalError>;

    /// Enable (or re-enable) interrupt delivery for `slot`.
    fn irq_enable(&self, slot: u32) -> Result<(), HalError>;
}

/// Number of interrupt vectors.
pub const VECTOR_COUNT: usize = 256;

/// Fixed vector table resolving a vector to its handler.
///
/// Each vector is connected at most once for the lifetime of the table.
pub struct VectorTable {
    entries: [OnceLock<Arc<dyn InterruptHandler>>; VECTOR_COUNT],
}

impl Default for VectorTable {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorTable {
    /// Empty table.
    pub fn new() -> Self {
        Self {
            entries: std::array::from_fn(|_| OnceLock::new()),
        }
    }

    /// Connect `handler` to `vector`.
    ///
    /// # Errors
    /// Returns `HalError::CommunicationError` if the vector is already taken.
    pub fn connect(&self, vector: u8, handler: Arc<dyn InterruptHandler>) -> Result<(), HalError> {
        self.entries[usize::from(vector)]
            .set(handler)
            .map_err(|_| HalError::CommunicationError(format!("vector {vector:#04x} already connected")))
    }

    /// Whether a handler is connected to `vector`.
    pub fn is_connected(&self, vector: u8) -> bool {
        self.entries[usize::from(vector)].get().is_some()
    }

    /// Invoke the handler for `vector`. Returns false if none is connected.
    #[inline]
    pub fn dispatch(&self, vector: u8) -> bool {
        match self.entries[usize::from(vector)].get() {
            Some(handler) => {
                handler.on_interrupt();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl InterruptHandler for Counter {
        fn on_interrupt(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn dispatch_reaches_connected_handler() {
        let table = VectorTable::new();
        let counter = Arc::new(Counter::default());
        table.connect(0x70, counter.clone()).unwrap();

        assert!(table.dispatch(0x70));
        assert!(!table.dispatch(0x71));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn vector_connects_once() {
        let table = VectorTable::new();
        table.connect(1, Arc::new(Counter::default())).unwrap();
        assert!(table.is_connected(1));
        assert!(matches!(
            table.connect(1, Arc::new(Counter::default())),
            Err(HalError::CommunicationError(_))
        ));
    }
}
