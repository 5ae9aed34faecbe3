//! Register access over a mapped card window.
//!
//! [`RegisterWindow`] is the raw 16-bit access seam. It is implemented by
//! [`MmioWindow`] for real hardware and by the simulated card. Every write
//! goes straight to the window, nothing is cached.
//!
//! [`RegisterBank`] binds a window to one axis bank and provides the typed
//! accessors the axis logic uses, including the CSR set and clear rules
//! that never acknowledge DONE by accident.

use hy8601_common::hal::error::HalError;
use hy8601_common::hal::regs::{self, Csr};
use memmap2::{MmapOptions, MmapRaw};
use std::fs::File;
use std::sync::Arc;

/// Raw 16-bit register access.
///
/// Offsets are byte offsets from the window base and are always even and
/// in range by construction; implementations do not report errors.
pub trait RegisterWindow: Send + Sync {
    /// Read the register at `offset`.
    fn read16(&self, offset: usize) -> u16;

    /// Write `value` to the register at `offset`.
    fn write16(&self, offset: usize, value: u16);

    /// Window length in bytes.
    fn len(&self) -> usize;

    /// Whether the window is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Memory-mapped register window with volatile accesses.
pub struct MmioWindow {
    map: MmapRaw,
    len: usize,
}

impl MmioWindow {
    /// Map `len` bytes of `file` starting at `offset`.
    ///
    /// # Errors
    /// Returns `HalError::CommunicationError` if the mapping fails.
    pub fn map(file: &File, offset: u64, len: usize) -> Result<Self, HalError> {
        let map = MmapOptions::new()
            .offset(offset)
            .len(len)
            .map_raw(file)
            .map_err(|e| HalError::CommunicationError(format!("mmap failed: {e}")))?;
        Ok(Self { map, len })
    }

    #[inline]
    fn ptr(&self, offset: usize) -> *mut u16 {
        debug_assert!(offset % 2 == 0 && offset + 2 <= self.len);
        // SAFETY: offset is in range and 2-byte aligned within a page-aligned mapping.
        unsafe { self.map.as_mut_ptr().add(offset).cast::<u16>() }
    }
}

impl RegisterWindow for MmioWindow {
    fn read16(&self, offset: usize) -> u16 {
        // SAFETY: see `ptr`; device memory must be read with volatile loads.
        unsafe { core::ptr::read_volatile(self.ptr(offset)) }
    }

    fn write16(&self, offset: usize, value: u16) {
        // SAFETY: see `ptr`; device memory must be written with volatile stores.
        unsafe { core::ptr::write_volatile(self.ptr(offset), value) }
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// One axis register bank inside a window.
#[derive(Clone)]
pub struct RegisterBank {
    window: Arc<dyn RegisterWindow>,
    base: usize,
}

impl std::fmt::Debug for RegisterBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterBank")
            .field("base", &format_args!("{:#04x}", self.base))
            .finish()
    }
}

impl RegisterBank {
    /// Bank of `axis` in `window`.
    pub fn new(window: Arc<dyn RegisterWindow>, axis: usize) -> Self {
        Self {
            window,
            base: regs::bank_offset(axis),
        }
    }

    /// Read a bank register.
    #[inline]
    pub fn read(&self, reg: usize) -> u16 {
        self.window.read16(self.base + reg)
    }

    /// Write a bank register.
    #[inline]
    pub fn write(&self, reg: usize, value: u16) {
        self.window.write16(self.base + reg, value);
    }

    /// Raw CSR value.
    #[inline]
    pub fn csr_raw(&self) -> u16 {
        self.read(regs::CSR)
    }

    /// CSR as flags.
    #[inline]
    pub fn csr(&self) -> Csr {
        Csr::from_bits_retain(self.csr_raw())
    }

    /// Set `bits` in the CSR. DONE is only acknowledged when it is in `bits`.
    pub fn set_csr(&self, bits: Csr) {
        let current = self.csr_raw();
        self.write(regs::CSR, Csr::set_value(current, bits));
    }

    /// Clear `bits` in the CSR. DONE is only cleared when it is in `bits`.
    pub fn clear_csr(&self, bits: Csr) {
        let current = self.csr_raw();
        self.write(regs::CSR, Csr::clear_value(current, bits));
    }

    /// Remaining step count, 32-bit register pair reinterpreted as signed.
    pub fn step_count(&self) -> i32 {
        read_pair(self, regs::STEPCNT_LO, regs::STEPCNT_HI) as i32
    }

    /// Program the step count magnitude.
    pub fn set_step_count(&self, steps: u32) {
        write_pair(self, regs::STEPCNT_LO, regs::STEPCNT_HI, steps);
    }

    /// Hardware position counter.
    pub fn position(&self) -> i32 {
        read_pair(self, regs::CURRPOS_LO, regs::CURRPOS_HI) as i32
    }

    /// Overwrite the hardware position counter.
    pub fn set_position(&self, position: i32) {
        write_pair(self, regs::CURRPOS_LO, regs::CURRPOS_HI, position as u32);
    }

    /// Start/stop speed in steps per second.
    pub fn set_start_speed(&self, speed: u16) {
        self.write(regs::START_STOP_SPEED, speed);
    }

    /// Slew speed in steps per second.
    pub fn set_high_speed(&self, speed: u16) {
        self.write(regs::HIGH_SPEED, speed);
    }

    /// Programmed acceleration ramp.
    pub fn ramp_rate(&self) -> u16 {
        self.read(regs::RAMP_RATE)
    }

    /// Program the acceleration ramp.
    pub fn set_ramp_rate(&self, rate: u16) {
        self.write(regs::RAMP_RATE, rate);
    }

    /// Select the CSR bits that raise an interrupt. Empty disables the axis.
    pub fn set_int_mask(&self, mask: Csr) {
        self.write(regs::INT_MASK, mask.bits());
    }

    /// Current interrupt mask.
    pub fn int_mask(&self) -> Csr {
        Csr::from_bits_retain(self.read(regs::INT_MASK))
    }

    /// Program the interrupt vector for this axis.
    pub fn set_vector(&self, vector: u8) {
        self.write(regs::INT_VECTOR, u16::from(vector));
    }

    /// Programmed interrupt vector.
    pub fn vector(&self) -> u8 {
        (self.read(regs::INT_VECTOR) & 0xFF) as u8
    }
}

fn read_pair(bank: &RegisterBank, lo: usize, hi: usize) -> u32 {
    (u32::from(bank.read(hi)) << 16) | u32::from(bank.read(lo))
}

fn write_pair(bank: &RegisterBank, lo: usize, hi: usize, value: u32) {
    bank.write(lo, (value & 0xFFFF) as u16);
    bank.write(hi, (value >> 16) as u16);
}

/// Convert a motion argument to a 16-bit register value.
///
/// Fractions are floored and the result truncated to the register width.
pub(crate) fn to_reg16(value: f64) -> u16 {
    value.floor() as i64 as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::simulation::SimCard;
    use proptest::prelude::*;

    fn bank(axis: usize) -> (Arc<SimCard>, RegisterBank) {
        let card = Arc::new(SimCard::new());
        let bank = RegisterBank::new(card.clone(), axis);
        (card, bank)
    }

    #[test]
    fn bank_addresses_its_own_axis() {
        let (card, bank) = bank(2);
        bank.set_ramp_rate(0x1234);
        assert_eq!(card.read16(0x40 + regs::RAMP_RATE), 0x1234);
        assert_eq!(card.read16(regs::RAMP_RATE), 0);
    }

    #[test]
    fn step_count_is_split_high_word_first() {
        let (card, bank) = bank(0);
        bank.set_step_count(0x0001_86A0);
        assert_eq!(card.read16(regs::STEPCNT_LO), 0x86A0);
        assert_eq!(card.read16(regs::STEPCNT_HI), 0x0001);
        assert_eq!(bank.step_count(), 100_000);
    }

    #[test]
    fn step_count_reads_as_signed() {
        let (_card, bank) = bank(0);
        bank.write(regs::STEPCNT_HI, 0xFFFF);
        bank.write(regs::STEPCNT_LO, 0xFFF6);
        assert_eq!(bank.step_count(), -10);
    }

    #[test]
    fn position_round_trips_negative_values() {
        let (_card, bank) = bank(1);
        bank.set_position(-123_456);
        assert_eq!(bank.position(), -123_456);
    }

    #[test]
    fn set_csr_keeps_done() {
        let (card, bank) = bank(0);
        card.force_csr(0, Csr::DONE);
        bank.set_csr(Csr::AUX1);
        assert_eq!(bank.csr(), Csr::DONE | Csr::AUX1);
    }

    #[test]
    fn set_done_acknowledges_it() {
        let (card, bank) = bank(0);
        card.force_csr(0, Csr::DONE | Csr::INTEN);
        bank.set_csr(Csr::DONE);
        assert_eq!(bank.csr(), Csr::INTEN);
    }

    #[test]
    fn clear_done_explicitly() {
        let (card, bank) = bank(0);
        card.force_csr(0, Csr::DONE | Csr::INTEN);
        bank.clear_csr(Csr::DONE);
        assert_eq!(bank.csr(), Csr::INTEN);
    }

    #[test]
    fn register_arguments_floor_and_truncate() {
        assert_eq!(to_reg16(99.9), 99);
        assert_eq!(to_reg16(65_536.0 + 5.0), 5);
    }

    proptest! {
        #[test]
        fn clearing_never_drops_done(initial in any::<u16>(), bits in any::<u16>()) {
            let (card, bank) = bank(0);
            let initial = Csr::from_bits_retain(initial) & !Csr::HW_OWNED;
            let bits = Csr::from_bits_retain(bits) & !Csr::DONE;
            card.force_csr(0, initial);

            bank.clear_csr(bits);

            let after = bank.csr();
            prop_assert_eq!(after.contains(Csr::DONE), initial.contains(Csr::DONE));
            prop_assert!(!after.intersects(bits - Csr::HW_OWNED));
        }

        #[test]
        fn setting_never_drops_done(initial in any::<u16>(), bits in any::<u16>()) {
            let (card, bank) = bank(0);
            let initial = Csr::from_bits_retain(initial) & !(Csr::HW_OWNED | Csr::RESET | Csr::CRASHSTOP);
            let bits = Csr::from_bits_retain(bits) & !(Csr::DONE | Csr::HW_OWNED | Csr::RESET | Csr::CRASHSTOP);
            card.force_csr(0, initial);

            bank.set_csr(bits);

            prop_assert_eq!(bank.csr().contains(Csr::DONE), initial.contains(Csr::DONE));
        }
    }
}
