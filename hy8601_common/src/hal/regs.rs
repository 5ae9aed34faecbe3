//! Hy8601 register map.
//!
//! Each axis owns a 0x20-byte register bank at `axis * BANK_SIZE` from the
//! window base. The identification PROM sits at [`PROM_OFFSET`]. All registers
//! are 16 bits wide.

use bitflags::bitflags;
use static_assertions::const_assert;

bitflags! {
    /// Per-axis control/status register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Csr: u16 {
        /// Stop on home switch, latched.
        const HOMESTOP   = 0x8000;
        /// Interrupt enable.
        const INTEN      = 0x4000;
        /// Motion complete. Write 1 to clear.
        const DONE       = 0x2000;
        /// Immediate stop.
        const CRASHSTOP  = 0x1000;
        /// Set for positive direction.
        const DIRECTION  = 0x0800;
        /// Auxiliary output 2 (brake, active low).
        const AUX2       = 0x0400;
        /// Auxiliary output 1 (power).
        const AUX1       = 0x0200;
        /// Count encoder instead of steps.
        const ENCODUSE   = 0x0100;
        /// Encoder detected. Read only.
        const ENCODDET   = 0x0080;
        /// Constant-velocity motion.
        const JOG        = 0x0040;
        /// Start a step-count move.
        const GO         = 0x0020;
        /// Driver fault. Read only.
        const DRVSTAT    = 0x0010;
        /// Home switch active. Read only.
        const HOMELMT    = 0x0008;
        /// High limit switch active. Read only.
        const MAXLMT     = 0x0004;
        /// Low limit switch active. Read only.
        const MINLMT     = 0x0002;
        /// Reset the axis logic.
        const RESET      = 0x0001;
    }
}

impl Csr {
    /// Bits only the card drives; writes leave them untouched.
    pub const HW_OWNED: Self = Self::from_bits_truncate(
        Self::ENCODDET.bits()
            | Self::DRVSTAT.bits()
            | Self::HOMELMT.bits()
            | Self::MAXLMT.bits()
            | Self::MINLMT.bits(),
    );

    /// Interrupt source used for motion completion.
    pub const DONE_INT: Self = Self::DONE;

    /// Any kind of motion in progress.
    #[inline]
    pub const fn is_busy(&self) -> bool {
        self.intersects(Self::GO.union(Self::JOG))
    }

    /// Value written to the CSR to set `bits` without disturbing DONE.
    ///
    /// DONE is acknowledged only when it is in `bits`.
    #[inline]
    pub const fn set_value(current: u16, bits: Csr) -> u16 {
        let done = Self::DONE.bits();
        ((current | bits.bits()) & !done) | (bits.bits() & done)
    }

    /// Value written to the CSR to clear `bits` without disturbing DONE.
    ///
    /// Writing 0 to DONE leaves it unchanged on the card, so DONE is masked
    /// out unless it is itself being cleared, in which case a 1 is written.
    #[inline]
    pub const fn clear_value(current: u16, bits: Csr) -> u16 {
        let done = Self::DONE.bits();
        (current & !bits.bits() & !done) | (bits.bits() & done)
    }
}

impl Default for Csr {
    fn default() -> Self {
        Self::empty()
    }
}

/// Size of one axis register bank.
pub const BANK_SIZE: usize = 0x20;

/// Step count low word (pending move magnitude).
pub const STEPCNT_LO: usize = 0x00;
/// Step count high word.
pub const STEPCNT_HI: usize = 0x02;
/// Current position low word.
pub const CURRPOS_LO: usize = 0x04;
/// Current position high word.
pub const CURRPOS_HI: usize = 0x06;
/// Start/stop speed.
pub const START_STOP_SPEED: usize = 0x08;
/// High speed.
pub const HIGH_SPEED: usize = 0x0A;
/// Ramp rate.
pub const RAMP_RATE: usize = 0x0C;
/// Control/status register.
pub const CSR: usize = 0x0E;
/// Interrupt mask.
pub const INT_MASK: usize = 0x10;
/// Interrupt vector.
pub const INT_VECTOR: usize = 0x12;
/// Interrupt request.
pub const INT_REQUEST: usize = 0x14;
/// Current speed.
pub const CURRENT_SPEED: usize = 0x16;

/// Minimum acceleration for which `move` programs the ramp register.
pub const MIN_MOVE_RAMP: i32 = 64;

/// Offset of the identification PROM in the window.
pub const PROM_OFFSET: usize = 0x80;
/// Size of the identification PROM area.
pub const PROM_SIZE: usize = 0x20;
/// Total window size covering four banks and the PROM.
pub const WINDOW_SIZE: usize = PROM_OFFSET + PROM_SIZE;

/// PROM field offsets, relative to [`PROM_OFFSET`].
pub mod prom {
    /// Detection string, 6 bytes.
    pub const DETECT: usize = 0x00;
    /// Manufacturer id, 32 bits, high word first.
    pub const MANUFACTURER: usize = 0x06;
    /// Model number.
    pub const MODEL: usize = 0x0A;
    /// Firmware revision, BCD nibbles.
    pub const REVISION: usize = 0x0C;
    pub const DRIVER_ID_LO: usize = 0x10;
    pub const DRIVER_ID_HI: usize = 0x12;
    pub const FLAGS: usize = 0x14;
    pub const BYTES_USED: usize = 0x16;
    /// Serial number, 6 bytes.
    pub const SERIAL: usize = 0x1A;

    /// Expected detection string.
    pub const DETECT_STRING: &[u8; 6] = b"VITA4 ";
    /// Hytec manufacturer id.
    pub const HYTEC_ID: u32 = 0x0080_0300;
    /// Model word of the Hy8601.
    pub const MODEL_8601: u16 = 0x8601;
}

/// Bank offset of `axis`.
#[inline]
pub const fn bank_offset(axis: usize) -> usize {
    axis * BANK_SIZE
}

const_assert!(bank_offset(crate::consts::MAX_AXES) <= PROM_OFFSET);
const_assert!(CURRENT_SPEED < BANK_SIZE);
const_assert!(prom::SERIAL + 6 <= PROM_SIZE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csr_bits_match_card_layout() {
        assert_eq!(Csr::all().bits(), 0xFFFF);
        assert_eq!(Csr::DONE.bits(), 0x2000);
        assert_eq!(Csr::HW_OWNED.bits(), 0x009E);
    }

    #[test]
    fn clear_value_keeps_done_untouched() {
        let current = (Csr::DONE | Csr::GO | Csr::JOG | Csr::AUX1).bits();
        let written = Csr::clear_value(current, Csr::GO | Csr::JOG);
        assert_eq!(written, Csr::AUX1.bits());
    }

    #[test]
    fn clear_value_writes_one_to_done_when_clearing_it() {
        let current = (Csr::DONE | Csr::INTEN).bits();
        let written = Csr::clear_value(current, Csr::DONE);
        assert_eq!(written, (Csr::DONE | Csr::INTEN).bits());
    }

    #[test]
    fn set_value_leaves_done_alone() {
        let current = (Csr::DONE | Csr::INTEN).bits();
        let written = Csr::set_value(current, Csr::AUX1);
        assert_eq!(written, (Csr::INTEN | Csr::AUX1).bits());
    }

    #[test]
    fn set_value_acknowledges_done_when_asked() {
        let current = (Csr::DONE | Csr::INTEN).bits();
        let written = Csr::set_value(current, Csr::GO | Csr::DONE);
        assert_eq!(written, (Csr::DONE | Csr::INTEN | Csr::GO).bits());
    }

    #[test]
    fn bank_offsets() {
        assert_eq!(bank_offset(0), 0x00);
        assert_eq!(bank_offset(3), 0x60);
        assert_eq!(bank_offset(2) + CSR, 0x4E);
    }

    #[test]
    fn busy_detection() {
        assert!(Csr::GO.is_busy());
        assert!((Csr::JOG | Csr::HOMESTOP).is_busy());
        assert!(!(Csr::DONE | Csr::INTEN).is_busy());
    }
}
