//! Software model of a Hy8601 card.
//!
//! `SimCard` implements [`RegisterWindow`] with the register semantics the
//! driver relies on:
//! - DONE is write-1-to-clear, writing 0 leaves it alone
//! - ENCODDET, DRVSTAT and the limit/home switch bits are driven by the card
//! - RESET clears the step and position counters
//! - CRASHSTOP aborts motion at once and asserts DONE
//! - clearing GO/JOG during motion completes the stop on the next tick
//! - an interrupt is requested while `CSR & INTMASK` is non-zero and INTEN is set
//!
//! Register storage is atomic so the interrupt path never takes a lock.

use hy8601_common::consts::MAX_AXES;
use hy8601_common::hal::regs::{self, Csr, prom};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use tracing::trace;

use crate::registers::RegisterWindow;

/// Contents of the simulated identification PROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimProm {
    /// Detection string, `"VITA4 "` on a real card.
    pub detect: [u8; 6],
    /// Manufacturer id, written high word first.
    pub manufacturer: u32,
    /// Model word checked at setup.
    pub model: u16,
    /// Revision word, one decimal digit per nibble.
    pub revision: u16,
    /// Driver id words, low then high.
    pub driver_ids: [u16; 2],
    /// PROM flags word.
    pub flags: u16,
    /// Number of PROM bytes in use.
    pub bytes_used: u16,
    /// Card serial number.
    pub serial: u16,
}

impl Default for SimProm {
    fn default() -> Self {
        Self {
            detect: *prom::DETECT_STRING,
            manufacturer: prom::HYTEC_ID,
            model: prom::MODEL_8601,
            revision: 0x0203,
            driver_ids: [0, 0],
            flags: 0,
            bytes_used: 0x1C,
            serial: 1,
        }
    }
}

/// Switch and sensor placement of one simulated axis.
#[derive(Debug, Clone, Copy, Default)]
struct AxisModel {
    home: Option<i32>,
    low_limit: Option<i32>,
    high_limit: Option<i32>,
    fault: bool,
    encoder: bool,
}

/// Simulated Hy8601 register window.
pub struct SimCard {
    regs: Box<[AtomicU16]>,
    models: Mutex<[AxisModel; MAX_AXES]>,
    stop_pending: [AtomicBool; MAX_AXES],
}

impl Default for SimCard {
    fn default() -> Self {
        Self::new()
    }
}

impl SimCard {
    /// Card with a genuine Hy8601 PROM.
    pub fn new() -> Self {
        Self::with_prom(&SimProm::default())
    }

    /// Card with a custom PROM image.
    pub fn with_prom(image: &SimProm) -> Self {
        let card = Self {
            regs: (0..regs::WINDOW_SIZE / 2).map(|_| AtomicU16::new(0)).collect(),
            models: Mutex::new([AxisModel::default(); MAX_AXES]),
            stop_pending: std::array::from_fn(|_| AtomicBool::new(false)),
        };

        let base = regs::PROM_OFFSET;
        for (i, pair) in image.detect.chunks(2).enumerate() {
            card.store(base + prom::DETECT + 2 * i, u16::from_be_bytes([pair[0], pair[1]]));
        }
        card.store(base + prom::MANUFACTURER, (image.manufacturer >> 16) as u16);
        card.store(base + prom::MANUFACTURER + 2, image.manufacturer as u16);
        card.store(base + prom::MODEL, image.model);
        card.store(base + prom::REVISION, image.revision);
        card.store(base + prom::DRIVER_ID_LO, image.driver_ids[0]);
        card.store(base + prom::DRIVER_ID_HI, image.driver_ids[1]);
        card.store(base + prom::FLAGS, image.flags);
        card.store(base + prom::BYTES_USED, image.bytes_used);
        card.store(base + prom::SERIAL, image.serial);
        card
    }

    #[inline]
    fn load(&self, offset: usize) -> u16 {
        self.regs[offset / 2].load(Ordering::SeqCst)
    }

    #[inline]
    fn store(&self, offset: usize, value: u16) {
        self.regs[offset / 2].store(value, Ordering::SeqCst);
    }

    fn reg(&self, axis: usize, reg: usize) -> u16 {
        self.load(regs::bank_offset(axis) + reg)
    }

    fn set_reg(&self, axis: usize, reg: usize, value: u16) {
        self.store(regs::bank_offset(axis) + reg, value);
    }

    fn pair(&self, axis: usize, lo: usize, hi: usize) -> u32 {
        (u32::from(self.reg(axis, hi)) << 16) | u32::from(self.reg(axis, lo))
    }

    fn set_pair(&self, axis: usize, lo: usize, hi: usize, value: u32) {
        self.set_reg(axis, lo, value as u16);
        self.set_reg(axis, hi, (value >> 16) as u16);
    }

    fn update_csr(&self, axis: usize, f: impl Fn(Csr) -> Csr) -> Csr {
        let cell = &self.regs[(regs::bank_offset(axis) + regs::CSR) / 2];
        match cell.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |old| {
            Some(f(Csr::from_bits_retain(old)).bits())
        }) {
            Ok(prev) | Err(prev) => Csr::from_bits_retain(prev),
        }
    }

    fn csr_axis(offset: usize) -> Option<usize> {
        (offset < regs::PROM_OFFSET && offset % regs::BANK_SIZE == regs::CSR)
            .then_some(offset / regs::BANK_SIZE)
    }

    fn write_csr(&self, axis: usize, value: u16) {
        let value = Csr::from_bits_retain(value);
        let old = self.update_csr(axis, |old| {
            let mut new = value - Csr::HW_OWNED - Csr::DONE;
            let mut done = if value.contains(Csr::DONE) {
                Csr::empty()
            } else {
                old & Csr::DONE
            };
            if new.contains(Csr::RESET) {
                new -= Csr::GO | Csr::JOG;
            }
            if new.contains(Csr::CRASHSTOP) && !old.contains(Csr::CRASHSTOP) && old.is_busy() {
                new -= Csr::GO | Csr::JOG;
                done = Csr::DONE;
            }
            (old & Csr::HW_OWNED) | done | new
        });

        if value.contains(Csr::RESET) {
            self.set_pair(axis, regs::STEPCNT_LO, regs::STEPCNT_HI, 0);
            self.set_pair(axis, regs::CURRPOS_LO, regs::CURRPOS_HI, 0);
            self.stop_pending[axis].store(false, Ordering::SeqCst);
        } else if old.is_busy()
            && !value.is_busy()
            && !(value.contains(Csr::CRASHSTOP) && !old.contains(Csr::CRASHSTOP))
        {
            self.stop_pending[axis].store(true, Ordering::SeqCst);
        }
    }

    /// Overwrite an axis CSR without any register side effects.
    pub fn force_csr(&self, axis: usize, csr: Csr) {
        self.set_reg(axis, regs::CSR, csr.bits());
    }

    /// Current CSR of `axis`.
    pub fn csr(&self, axis: usize) -> Csr {
        Csr::from_bits_retain(self.reg(axis, regs::CSR))
    }

    /// Assert DONE as the card does when motion ends.
    pub fn assert_done(&self, axis: usize) {
        self.update_csr(axis, |csr| (csr - Csr::GO - Csr::JOG) | Csr::DONE);
    }

    /// Hardware position counter of `axis`.
    pub fn position(&self, axis: usize) -> i32 {
        self.pair(axis, regs::CURRPOS_LO, regs::CURRPOS_HI) as i32
    }

    /// Remaining step count of `axis`.
    pub fn step_count(&self, axis: usize) -> u32 {
        self.pair(axis, regs::STEPCNT_LO, regs::STEPCNT_HI)
    }

    /// Load the remaining step count directly.
    pub fn set_step_count(&self, axis: usize, steps: u32) {
        self.set_pair(axis, regs::STEPCNT_LO, regs::STEPCNT_HI, steps);
    }

    /// Attach or detach an encoder.
    pub fn set_encoder_detected(&self, axis: usize, present: bool) {
        self.models.lock()[axis].encoder = present;
        self.refresh_switches(axis);
    }

    /// Raise or clear the driver fault input.
    pub fn set_fault(&self, axis: usize, fault: bool) {
        self.models.lock()[axis].fault = fault;
        self.refresh_switches(axis);
    }

    /// Place the home switch.
    pub fn set_home_position(&self, axis: usize, home: Option<i32>) {
        self.models.lock()[axis].home = home;
        self.refresh_switches(axis);
    }

    /// Place the limit switches.
    pub fn set_limits(&self, axis: usize, low: Option<i32>, high: Option<i32>) {
        {
            let mut models = self.models.lock();
            models[axis].low_limit = low;
            models[axis].high_limit = high;
        }
        self.refresh_switches(axis);
    }

    fn refresh_switches(&self, axis: usize) {
        let model = self.models.lock()[axis];
        let pos = self.position(axis);
        let mut hw = Csr::empty();
        hw.set(Csr::ENCODDET, model.encoder);
        hw.set(Csr::DRVSTAT, model.fault);
        hw.set(Csr::HOMELMT, model.home == Some(pos));
        hw.set(Csr::MAXLMT, model.high_limit.is_some_and(|h| pos >= h));
        hw.set(Csr::MINLMT, model.low_limit.is_some_and(|l| pos <= l));
        self.update_csr(axis, |csr| (csr - Csr::HW_OWNED) | hw);
    }

    /// Vector of the first axis currently requesting an interrupt.
    pub fn irq_pending(&self) -> Option<u8> {
        (0..MAX_AXES).find_map(|axis| {
            let csr = self.csr(axis);
            let mask = Csr::from_bits_retain(self.reg(axis, regs::INT_MASK));
            (csr.contains(Csr::INTEN) && csr.intersects(mask))
                .then(|| (self.reg(axis, regs::INT_VECTOR) & 0xFF) as u8)
        })
    }

    /// Advance every axis by up to `steps` steps.
    pub fn tick(&self, steps: u32) {
        for axis in 0..MAX_AXES {
            self.tick_axis(axis, steps);
        }
    }

    fn tick_axis(&self, axis: usize, steps: u32) {
        if self.stop_pending[axis].swap(false, Ordering::SeqCst) {
            self.update_csr(axis, |csr| csr | Csr::DONE);
            return;
        }

        let csr = self.csr(axis);
        if csr.intersects(Csr::RESET | Csr::CRASHSTOP) || !csr.is_busy() {
            return;
        }

        let model = self.models.lock()[axis];
        let forward = csr.contains(Csr::DIRECTION);
        let counting = csr.contains(Csr::GO);
        let mut pos = self.position(axis);
        let mut remaining = self.step_count(axis);
        let mut finished = counting && remaining == 0;

        for _ in 0..steps {
            if finished {
                break;
            }
            if counting {
                remaining -= 1;
            }
            pos = if forward {
                pos.wrapping_add(1)
            } else {
                pos.wrapping_sub(1)
            };

            let at_home = csr.contains(Csr::HOMESTOP) && model.home == Some(pos);
            let at_limit = if forward {
                model.high_limit.is_some_and(|h| pos >= h)
            } else {
                model.low_limit.is_some_and(|l| pos <= l)
            };
            finished = at_home || at_limit || (counting && remaining == 0);
        }

        self.set_pair(axis, regs::CURRPOS_LO, regs::CURRPOS_HI, pos as u32);
        if counting {
            self.set_step_count(axis, remaining);
        }
        self.refresh_switches(axis);

        if finished {
            trace!(axis, pos, "simulated motion complete");
            self.update_csr(axis, |csr| (csr - Csr::GO - Csr::JOG) | Csr::DONE);
        }
    }
}

impl RegisterWindow for SimCard {
    fn read16(&self, offset: usize) -> u16 {
        self.load(offset)
    }

    fn write16(&self, offset: usize, value: u16) {
        if offset >= regs::PROM_OFFSET {
            return;
        }
        match Self::csr_axis(offset) {
            Some(axis) => self.write_csr(axis, value),
            None => self.store(offset, value),
        }
    }

    fn len(&self) -> usize {
        regs::WINDOW_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::RegisterBank;
    use std::sync::Arc;

    fn card_and_bank() -> (Arc<SimCard>, RegisterBank) {
        let card = Arc::new(SimCard::new());
        let bank = RegisterBank::new(card.clone(), 0);
        (card, bank)
    }

    #[test]
    fn done_is_write_one_to_clear() {
        let (card, bank) = card_and_bank();
        card.assert_done(0);
        bank.write(regs::CSR, Csr::INTEN.bits());
        assert_eq!(card.csr(0), Csr::INTEN | Csr::DONE);
        bank.write(regs::CSR, (Csr::INTEN | Csr::DONE).bits());
        assert_eq!(card.csr(0), Csr::INTEN);
    }

    #[test]
    fn hardware_bits_ignore_writes() {
        let (card, bank) = card_and_bank();
        card.set_encoder_detected(0, true);
        bank.write(regs::CSR, 0);
        assert!(card.csr(0).contains(Csr::ENCODDET));
        bank.write(regs::CSR, Csr::MAXLMT.bits());
        assert!(!card.csr(0).contains(Csr::MAXLMT));
    }

    #[test]
    fn go_counts_down_and_asserts_done() {
        let (card, bank) = card_and_bank();
        bank.set_step_count(10);
        bank.set_csr(Csr::DIRECTION | Csr::GO);
        card.tick(4);
        assert_eq!(card.position(0), 4);
        assert_eq!(card.step_count(0), 6);
        assert!(!card.csr(0).contains(Csr::DONE));
        card.tick(100);
        assert_eq!(card.position(0), 10);
        assert_eq!(card.csr(0) & (Csr::DONE | Csr::GO), Csr::DONE);
    }

    #[test]
    fn reverse_move_decrements_position() {
        let (card, bank) = card_and_bank();
        bank.set_step_count(5);
        bank.set_csr(Csr::GO);
        card.tick(10);
        assert_eq!(card.position(0), -5);
    }

    #[test]
    fn controlled_stop_completes_next_tick() {
        let (card, bank) = card_and_bank();
        bank.set_csr(Csr::DIRECTION | Csr::JOG);
        card.tick(3);
        bank.clear_csr(Csr::JOG | Csr::GO);
        assert!(!card.csr(0).contains(Csr::DONE));
        card.tick(3);
        assert!(card.csr(0).contains(Csr::DONE));
        assert_eq!(card.position(0), 3);
    }

    #[test]
    fn crash_stop_aborts_immediately() {
        let (card, bank) = card_and_bank();
        bank.set_step_count(100);
        bank.set_csr(Csr::DIRECTION | Csr::GO);
        card.tick(10);
        bank.set_csr(Csr::CRASHSTOP);
        assert_eq!(card.csr(0) & (Csr::DONE | Csr::GO), Csr::DONE);
        assert_eq!(card.step_count(0), 90);
    }

    #[test]
    fn reset_clears_counters() {
        let (card, bank) = card_and_bank();
        bank.set_position(77);
        bank.set_step_count(12);
        bank.set_csr(Csr::RESET);
        assert_eq!(card.position(0), 0);
        assert_eq!(card.step_count(0), 0);
    }

    #[test]
    fn homing_stops_on_home_switch() {
        let (card, bank) = card_and_bank();
        card.set_home_position(0, Some(-7));
        bank.set_csr(Csr::HOMESTOP | Csr::JOG);
        card.tick(50);
        let csr = card.csr(0);
        assert_eq!(card.position(0), -7);
        assert!(csr.contains(Csr::HOMELMT | Csr::DONE | Csr::HOMESTOP));
        assert!(!csr.contains(Csr::JOG));
    }

    #[test]
    fn jog_stops_on_limit() {
        let (card, bank) = card_and_bank();
        card.set_limits(0, None, Some(20));
        bank.set_csr(Csr::DIRECTION | Csr::JOG);
        card.tick(100);
        assert_eq!(card.position(0), 20);
        assert!(card.csr(0).contains(Csr::MAXLMT | Csr::DONE));
    }

    #[test]
    fn interrupt_request_needs_inten_and_mask() {
        let (card, bank) = card_and_bank();
        bank.set_vector(0x70);
        card.assert_done(0);
        assert_eq!(card.irq_pending(), None);
        bank.set_int_mask(Csr::DONE);
        assert_eq!(card.irq_pending(), None);
        card.force_csr(0, Csr::INTEN | Csr::DONE);
        assert_eq!(card.irq_pending(), Some(0x70));
        bank.set_int_mask(Csr::empty());
        assert_eq!(card.irq_pending(), None);
    }

    #[test]
    fn prom_is_read_only() {
        let card = SimCard::new();
        let before = card.read16(regs::PROM_OFFSET + prom::MODEL);
        card.write16(regs::PROM_OFFSET + prom::MODEL, 0);
        assert_eq!(card.read16(regs::PROM_OFFSET + prom::MODEL), before);
        assert_eq!(before, 0x8601);
    }
}
