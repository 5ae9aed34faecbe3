//! Linux UIO carrier.
//!
//! Each slot is a `/dev/uioN` device exposing the module's I/O space as
//! map 0. Interrupts are received by a blocking 4-byte read of the device
//! and re-enabled by writing `1u32` to it, which is how UIO masks the line
//! between deliveries.

use hy8601_common::hal::error::HalError;
use hy8601_common::hal::regs::WINDOW_SIZE;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, trace};

use crate::carrier::{Carrier, InterruptHandler, VectorTable};
use crate::registers::{MmioWindow, RegisterWindow};

struct UioSlot {
    path: PathBuf,
    file: File,
    listening: AtomicBool,
}

/// Carrier backed by UIO devices, slot `n` being the `n`-th device.
pub struct UioCarrier {
    slots: Vec<UioSlot>,
    vectors: Arc<VectorTable>,
}

impl UioCarrier {
    /// Open the given UIO devices.
    ///
    /// # Errors
    /// Returns `HalError::CommunicationError` if a device cannot be opened.
    pub fn open<P: AsRef<Path>>(devices: &[P]) -> Result<Self, HalError> {
        let mut slots = Vec::with_capacity(devices.len());
        for device in devices {
            let path = device.as_ref().to_path_buf();
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)
                .map_err(|e| {
                    HalError::CommunicationError(format!("cannot open {}: {e}", path.display()))
                })?;
            info!("Opened UIO device {}", path.display());
            slots.push(UioSlot {
                path,
                file,
                listening: AtomicBool::new(false),
            });
        }
        Ok(Self {
            slots,
            vectors: Arc::new(VectorTable::new()),
        })
    }

    fn slot(&self, slot: u32) -> Result<&UioSlot, HalError> {
        self.slots
            .get(slot as usize)
            .ok_or_else(|| HalError::CommunicationError(format!("no UIO device for slot {slot}")))
    }
}

impl Carrier for UioCarrier {
    fn name(&self) -> &'static str {
        "uio"
    }

    fn map_window(&self, slot: u32) -> Result<Arc<dyn RegisterWindow>, HalError> {
        let uio = self.slot(slot)?;
        let window = MmioWindow::map(&uio.file, 0, WINDOW_SIZE)?;
        Ok(Arc::new(window))
    }

    fn int_connect(
        &self,
        slot: u32,
        vector: u8,
        handler: Arc<dyn InterruptHandler>,
    ) -> Result<(), HalError> {
        let uio = self.slot(slot)?;
        if uio.listening.swap(true, Ordering::SeqCst) {
            return Err(HalError::CommunicationError(format!(
                "slot {slot} interrupt already connected"
            )));
        }
        self.vectors.connect(vector, handler)?;

        let mut events = uio
            .file
            .try_clone()
            .map_err(|e| HalError::CommunicationError(e.to_string()))?;
        let vectors = Arc::clone(&self.vectors);
        let path = uio.path.clone();
        std::thread::Builder::new()
            .name(format!("hy8601-irq-{slot}"))
            .spawn(move || {
                let mut count = [0u8; 4];
                loop {
                    if let Err(e) = events.read_exact(&mut count) {
                        error!("UIO read on {} failed: {e}", path.display());
                        break;
                    }
                    trace!(slot, events = u32::from_ne_bytes(count), "UIO interrupt");
                    vectors.dispatch(vector);
                }
            })
            .map_err(|e| HalError::InitFailed(format!("cannot spawn irq thread: {e}")))?;
        Ok(())
    }

    fn irq_enable(&self, slot: u32) -> Result<(), HalError> {
        let uio = self.slot(slot)?;
        (&uio.file)
            .write_all(&1u32.to_ne_bytes())
            .map_err(|e| HalError::CommunicationError(format!("irq enable failed: {e}")))
    }
}
