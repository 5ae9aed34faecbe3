//! One motor axis of the card.
//!
//! An `Axis` owns its register bank and the software position state:
//! - `abs_position` - absolute position maintained from observed steps when
//!   the encoder is in use
//! - `desired_move` - signed steps of the current move not yet accounted for
//! - `phase` - whether the completion of the current move has been applied
//!
//! All methods expect the caller to hold the device lock.

use hy8601_common::hal::params::{Param, ParamSink};
use hy8601_common::hal::regs::{Csr, MIN_MOVE_RAMP};
use hy8601_common::hal::types::{AxisState, MotionPhase};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, trace};

use crate::registers::{RegisterBank, to_reg16};

/// Steps moved since the previous observation and the new outstanding delta.
///
/// `remaining` is the step-count register read as a signed value.
pub fn reconcile(desired_move: i64, remaining: i64) -> (i64, i64) {
    if desired_move < 0 {
        if remaining >= 0 {
            ((desired_move + remaining).abs(), -remaining)
        } else {
            (desired_move.abs(), 0)
        }
    } else if remaining >= 0 {
        (desired_move - remaining, remaining)
    } else {
        (desired_move, 0)
    }
}

/// Motor axis.
#[derive(Debug)]
pub struct Axis {
    index: usize,
    bank: RegisterBank,
    vector: u8,
    use_encoder: bool,
    encoder_ratio: f64,
    abs_position: f64,
    desired_move: i64,
    phase: MotionPhase,
    stopping: bool,
}

/// Software state of an axis, for reports.
#[derive(Debug, Clone, Serialize)]
pub struct AxisReport {
    /// Axis number on the card.
    pub index: usize,
    /// Encoder selected for this axis.
    pub use_encoder: bool,
    /// Configured encoder ratio. Reported only.
    pub encoder_ratio: f64,
    /// Software absolute position.
    pub abs_position: f64,
    /// Outstanding signed steps of the current move.
    pub desired_move: i64,
    /// Completion bookkeeping of the current move.
    pub phase: MotionPhase,
    /// Motion state derived from the live CSR.
    pub state: AxisState,
    /// Live CSR value.
    pub csr: u16,
    /// Programmed ramp register.
    pub ramp_rate: u16,
    /// Programmed interrupt vector.
    pub vector: u8,
}

impl Axis {
    /// Create an axis. Call [`Axis::initialise`] before use.
    pub fn new(
        index: usize,
        bank: RegisterBank,
        vector: u8,
        use_encoder: bool,
        encoder_ratio: f64,
    ) -> Self {
        Self {
            index,
            bank,
            vector,
            use_encoder,
            encoder_ratio,
            abs_position: 0.0,
            desired_move: 0,
            phase: MotionPhase::InProgress,
            stopping: false,
        }
    }

    /// Reset the axis logic and arm its interrupt.
    ///
    /// Pulses RESET, selects the encoder when used, enables interrupts,
    /// writes the vector and pulses CRASHSTOP with `settle` in between.
    pub fn initialise(&mut self, settle: Duration) {
        self.abs_position = 0.0;
        self.desired_move = 0;
        self.phase = MotionPhase::InProgress;
        self.stopping = false;

        self.bank.set_csr(Csr::RESET | Csr::DONE);
        self.bank.clear_csr(Csr::RESET);

        if self.use_encoder {
            self.bank.set_csr(Csr::ENCODUSE);
        }

        self.bank.set_csr(Csr::INTEN);
        self.bank.set_vector(self.vector);

        self.bank.set_csr(Csr::CRASHSTOP);
        if !settle.is_zero() {
            std::thread::sleep(settle);
        }
        self.bank.clear_csr(Csr::CRASHSTOP);

        debug!(
            axis = self.index,
            use_encoder = self.use_encoder,
            vector = self.vector,
            "axis initialised"
        );
    }

    /// Axis number on the card.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Register bank of this axis.
    pub fn bank(&self) -> &RegisterBank {
        &self.bank
    }

    /// Whether the encoder is selected.
    pub fn use_encoder(&self) -> bool {
        self.use_encoder
    }

    /// Configured encoder ratio.
    pub fn encoder_ratio(&self) -> f64 {
        self.encoder_ratio
    }

    /// Software absolute position, maintained only with the encoder.
    pub fn abs_position(&self) -> f64 {
        self.abs_position
    }

    /// Signed steps of the current move not yet accounted for.
    pub fn desired_move(&self) -> i64 {
        self.desired_move
    }

    /// Completion bookkeeping of the current move.
    pub fn phase(&self) -> MotionPhase {
        self.phase
    }

    /// Motion state from the live CSR.
    pub fn state(&self) -> AxisState {
        AxisState::from_csr(self.bank.csr(), self.stopping)
    }

    fn program_speeds(&self, min_velocity: f64, max_velocity: f64) {
        if min_velocity != 0.0 {
            self.bank.set_start_speed(to_reg16(min_velocity));
        }
        if max_velocity != 0.0 {
            self.bank.set_high_speed(to_reg16(max_velocity));
        }
    }

    fn set_direction(&self, forward: bool) {
        if forward {
            self.bank.set_csr(Csr::DIRECTION);
        } else {
            self.bank.clear_csr(Csr::DIRECTION);
        }
    }

    /// Acknowledge the previous DONE and set the motion bits in one write.
    fn start(&mut self, params: &dyn ParamSink, bits: Csr) {
        self.stopping = false;
        self.bank.set_csr(bits | Csr::DONE);
        self.bank.set_int_mask(Csr::DONE_INT);
        params.set_integer(self.index, Param::Done, 0);
        params.call_callbacks(self.index);
    }

    /// Start a step-count move.
    ///
    /// `position` is a delta when `relative`, otherwise an absolute target
    /// measured from the hardware counter (no encoder) or from the software
    /// absolute position (encoder).
    pub fn move_to(
        &mut self,
        params: &dyn ParamSink,
        position: f64,
        relative: bool,
        min_velocity: f64,
        max_velocity: f64,
        acceleration: f64,
    ) {
        self.program_speeds(min_velocity, max_velocity);
        if acceleration >= f64::from(MIN_MOVE_RAMP) {
            self.bank.set_ramp_rate(to_reg16(acceleration));
        }

        let delta = if relative {
            position.floor() as i64
        } else {
            let current = if self.use_encoder {
                self.abs_position.trunc() as i64
            } else {
                i64::from(self.bank.position())
            };
            (position - current as f64).floor() as i64
        };

        self.bank.set_step_count(delta.unsigned_abs() as u32);
        self.set_direction(delta >= 0);
        self.phase = MotionPhase::InProgress;
        self.desired_move = delta;

        debug!(axis = self.index, delta, relative, "move");
        self.start(params, Csr::GO);
    }

    /// Move towards the home switch, stopping on it.
    pub fn home(
        &mut self,
        params: &dyn ParamSink,
        min_velocity: f64,
        max_velocity: f64,
        acceleration: f64,
        forwards: bool,
    ) {
        self.program_speeds(min_velocity, max_velocity);
        if acceleration != 0.0 {
            self.bank.set_ramp_rate(to_reg16(acceleration));
        }
        self.set_direction(forwards);

        debug!(axis = self.index, forwards, "home");
        self.start(params, Csr::HOMESTOP | Csr::JOG);
    }

    /// Run at constant velocity until stopped. The sign of `max_velocity`
    /// selects the direction.
    pub fn move_velocity(
        &mut self,
        params: &dyn ParamSink,
        min_velocity: f64,
        max_velocity: f64,
        acceleration: f64,
    ) {
        self.program_speeds(min_velocity, max_velocity);
        if acceleration != 0.0 {
            self.bank.set_ramp_rate(to_reg16(acceleration));
        }
        self.set_direction(max_velocity >= 0.0);

        debug!(axis = self.index, max_velocity, "jog");
        self.start(params, Csr::JOG);
    }

    /// Stop motion. Non-zero `acceleration` decelerates on the ramp, zero
    /// aborts with CRASHSTOP.
    pub fn stop(&mut self, acceleration: f64) {
        let busy = self.bank.csr().is_busy();
        let acce = acceleration.abs().floor() as u64;

        if acce != 0 {
            if acce <= 0xFFFF {
                self.bank.set_ramp_rate(acce as u16);
            }
            self.bank.clear_csr(Csr::JOG | Csr::GO);
        } else {
            self.bank.set_csr(Csr::CRASHSTOP);
            self.bank.clear_csr(Csr::CRASHSTOP);
        }

        self.stopping = busy;
        debug!(axis = self.index, acce, "stop");
    }

    /// Read the hardware, reconcile the position and publish the status.
    ///
    /// Returns whether DONE is asserted.
    pub fn poll(&mut self, params: &dyn ParamSink) -> bool {
        let position = self.bank.position();
        let csr = self.bank.csr();
        let remaining = i64::from(self.bank.step_count());

        let (step_moved, desired_move) = reconcile(self.desired_move, remaining);
        self.desired_move = desired_move;

        let done = csr.contains(Csr::DONE);
        if done {
            self.stopping = false;
        }

        if csr.contains(Csr::ENCODDET) && self.use_encoder {
            let step = if csr.contains(Csr::DIRECTION) {
                step_moved as f64
            } else {
                -(step_moved as f64)
            };

            if !done {
                self.abs_position += step;
            } else {
                if self.phase != MotionPhase::DoneConsumed {
                    self.abs_position += step;
                }
                self.bank.set_step_count(0);
            }

            let published = self.abs_position.round();
            params.set_double(self.index, Param::Position, published);
            params.set_double(self.index, Param::EncoderPosition, published);
        } else {
            params.set_double(self.index, Param::Position, f64::from(position));
            params.set_double(self.index, Param::EncoderPosition, f64::from(position));
        }

        if done {
            self.phase = MotionPhase::DoneConsumed;
        }

        trace!(
            axis = self.index,
            step_moved,
            remaining,
            desired = self.desired_move,
            abs = self.abs_position,
            csr = csr.bits(),
            "poll"
        );

        params.set_integer(self.index, Param::Direction, flag(csr, Csr::DIRECTION));
        params.set_integer(self.index, Param::HasEncoder, flag(csr, Csr::ENCODDET));
        self.publish_limits(params, csr);
        params.call_callbacks(self.index);

        done
    }

    /// Publish a CSR captured by the interrupt top half.
    ///
    /// Clears the HOMESTOP latch once the home switch is reached. A captured
    /// DONE only completes the current move while the live CSR still shows
    /// it; a snapshot taken before a newer move was started is ignored.
    pub fn apply_status(&mut self, params: &dyn ParamSink, csr: Csr) {
        self.publish_limits(params, csr);
        params.call_callbacks(self.index);

        if csr.contains(Csr::HOMELMT) {
            self.bank.clear_csr(Csr::HOMESTOP);
        }
        if csr.contains(Csr::DONE)
            && self.phase == MotionPhase::InProgress
            && self.bank.csr().contains(Csr::DONE)
        {
            self.phase = MotionPhase::DoneUnconsumed;
        }
    }

    fn publish_limits(&self, params: &dyn ParamSink, csr: Csr) {
        params.set_integer(self.index, Param::Done, flag(csr, Csr::DONE));
        params.set_integer(self.index, Param::HighLimit, flag(csr, Csr::MAXLMT));
        params.set_integer(self.index, Param::Home, flag(csr, Csr::HOMELMT));
        params.set_integer(self.index, Param::Problem, flag(csr, Csr::DRVSTAT));
        params.set_integer(self.index, Param::LowLimit, flag(csr, Csr::MINLMT));
    }

    /// Redefine the current position.
    pub fn set_position(&mut self, position: f64) {
        if self.use_encoder {
            self.abs_position = position;
        } else {
            self.bank.set_position(position.floor() as i32);
        }
        debug!(axis = self.index, position, "set position");
    }

    /// Drive an auxiliary output bit.
    pub fn write_aux_bit(&self, bit: Csr, asserted: bool) {
        if asserted {
            self.bank.set_csr(bit);
        } else {
            self.bank.clear_csr(bit);
        }
    }

    /// Snapshot of the software and register state.
    pub fn report(&self) -> AxisReport {
        let csr = self.bank.csr();
        AxisReport {
            index: self.index,
            use_encoder: self.use_encoder,
            encoder_ratio: self.encoder_ratio,
            abs_position: self.abs_position,
            desired_move: self.desired_move,
            phase: self.phase,
            state: AxisState::from_csr(csr, self.stopping),
            csr: csr.bits(),
            ramp_rate: self.bank.ramp_rate(),
            vector: self.bank.vector(),
        }
    }
}

fn flag(csr: Csr, bit: Csr) -> i32 {
    i32::from(csr.contains(bit))
}
