//! Identification PROM decoding.
//!
//! The PROM sits at [`regs::PROM_OFFSET`]. Bytes are presented high byte
//! first within each 16-bit word, and the 32-bit manufacturer id is stored
//! high word first.

use hy8601_common::hal::error::HalError;
use hy8601_common::hal::regs::{self, prom};
use serde::Serialize;
use tracing::{info, warn};

use crate::registers::RegisterWindow;

/// Decoded PROM header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromInfo {
    /// Detection string as read, lossily decoded.
    pub detect: String,
    /// Manufacturer id.
    pub manufacturer: u32,
    /// Card model.
    pub model: u16,
    /// Raw revision word.
    pub revision: u16,
    /// Driver id words, low then high.
    pub driver_ids: [u16; 2],
    /// PROM flags.
    pub flags: u16,
    /// Number of PROM bytes in use.
    pub bytes_used: u16,
    /// Serial number.
    pub serial: u16,
}

impl PromInfo {
    /// Read the PROM header from `window`.
    pub fn read(window: &dyn RegisterWindow) -> Self {
        let word = |field: usize| window.read16(regs::PROM_OFFSET + field);

        let mut detect = [0u8; 6];
        for (i, pair) in detect.chunks_mut(2).enumerate() {
            pair.copy_from_slice(&word(prom::DETECT + 2 * i).to_be_bytes());
        }

        Self {
            detect: String::from_utf8_lossy(&detect).into_owned(),
            manufacturer: (u32::from(word(prom::MANUFACTURER)) << 16)
                | u32::from(word(prom::MANUFACTURER + 2)),
            model: word(prom::MODEL),
            revision: word(prom::REVISION),
            driver_ids: [word(prom::DRIVER_ID_LO), word(prom::DRIVER_ID_HI)],
            flags: word(prom::FLAGS),
            bytes_used: word(prom::BYTES_USED),
            serial: word(prom::SERIAL),
        }
    }

    /// Whether the detection string matches.
    pub fn detect_ok(&self) -> bool {
        self.detect.as_bytes() == prom::DETECT_STRING
    }

    /// Whether the manufacturer is Hytec.
    pub fn manufacturer_ok(&self) -> bool {
        self.manufacturer == prom::HYTEC_ID
    }

    /// Firmware version: the revision nibbles read as decimal digits.
    pub fn firmware_version(&self) -> i32 {
        let r = i32::from(self.revision);
        ((r >> 12) & 0xF) * 1000 + ((r >> 8) & 0xF) * 100 + ((r >> 4) & 0xF) * 10 + (r & 0xF)
    }

    /// Validate the header against `expected_model`.
    ///
    /// A wrong detection string or manufacturer id is only reported; the
    /// model number alone decides.
    ///
    /// # Errors
    /// Returns `HalError::PromMismatch` if the model differs.
    pub fn check(&self, expected_model: u16) -> Result<(), HalError> {
        info!(
            "PROM header '{}', manufacturer {:#010x}, model {:#06x}, rev {:#06x}, serial {}",
            self.detect, self.manufacturer, self.model, self.revision, self.serial
        );
        info!(
            "PROM driver ids {:#06x}, {:#06x}, flags {:#06x}, bytes used {}",
            self.driver_ids[0], self.driver_ids[1], self.flags, self.bytes_used
        );

        if !self.detect_ok() {
            warn!(
                "Invalid PROM header '{}', expected '{}'",
                self.detect,
                String::from_utf8_lossy(prom::DETECT_STRING)
            );
        }
        if !self.manufacturer_ok() {
            warn!(
                "Unsupported manufacturer id {:#010x}, expected {:#010x}",
                self.manufacturer,
                prom::HYTEC_ID
            );
        }
        if self.model != expected_model {
            return Err(HalError::PromMismatch {
                expected: expected_model,
                found: self.model,
            });
        }
        Ok(())
    }
}
