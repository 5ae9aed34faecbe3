//! Card controller.
//!
//! `Controller::configure` brings up one card: it validates the PROM,
//! connects the interrupt top half, initialises every axis and starts the
//! status worker and the poller. A failed setup leaves the controller
//! *degraded*: it still exists and reports, but every command returns
//! [`HalError::NotOperational`].
//!
//! # Thread Model
//!
//! ```text
//!  carrier IRQ ──► TopHalf ──(bounded queue)──► StatusWorker ─┐
//!                                                             ├─► Device (Mutex)
//!  caller ──► Controller commands ──(wake)──► Poller ─────────┘
//! ```

use crossbeam_channel::Sender;
use hy8601_common::hal::config::CardConfig;
use hy8601_common::hal::error::HalError;
use hy8601_common::hal::params::{Param, ParamSink};
use hy8601_common::hal::regs::{Csr, WINDOW_SIZE, prom};
use hy8601_common::hal::types::{AuxOutput, AxisState, InterruptStats};
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::axis::{Axis, AxisReport};
use crate::carrier::Carrier;
use crate::device::{AxisDirectory, Device, SharedDevice};
use crate::isr::TopHalf;
use crate::poller::{Poller, PollerWaker};
use crate::prom::PromInfo;
use crate::registers::RegisterBank;
use crate::worker::StatusWorker;

/// Serializable controller report.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerReport {
    /// Port the card is registered under.
    pub port_name: String,
    /// Name of the carrier driver.
    pub carrier: String,
    /// Carrier slot of the card.
    pub slot: u32,
    /// Axes in use after clamping.
    pub num_axes: usize,
    /// Interrupt vector after masking.
    pub vector: u8,
    /// Whether setup succeeded.
    pub operational: bool,
    /// Reason the controller is degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_error: Option<String>,
    /// Decoded identification PROM.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prom: Option<PromInfo>,
    /// Interrupt queue counters.
    pub interrupts: InterruptStats,
    /// Configured encoder ratio of every axis.
    pub encoder_ratios: Vec<f64>,
    /// Per-axis state, empty when degraded.
    pub axes: Vec<AxisReport>,
}

/// Parts that only exist once setup succeeded.
struct Running {
    device: SharedDevice,
    top_half: Arc<TopHalf>,
    prom: PromInfo,
    waker: PollerWaker,
    shutdown: Option<Sender<()>>,
    threads: Vec<JoinHandle<()>>,
}

/// Controller of one Hy8601 card.
pub struct Controller {
    config: CardConfig,
    carrier: Arc<dyn Carrier>,
    params: Arc<dyn ParamSink>,
    vector: u8,
    num_axes: usize,
    running: Option<Running>,
    setup_error: Option<HalError>,
}

impl Controller {
    /// Configure a card and start its threads.
    ///
    /// Never fails: setup errors are logged and kept, see
    /// [`Controller::setup_error`].
    pub fn configure(
        config: CardConfig,
        carrier: Arc<dyn Carrier>,
        params: Arc<dyn ParamSink>,
    ) -> Self {
        info!(
            "Configuring {} on carrier '{}' (card {}, carrier {}, slot {})",
            config.port_name,
            carrier.name(),
            config.card,
            config.carrier,
            config.slot
        );

        if !config.vector_in_range() {
            error!(
                "{}: interrupt vector {} outside 1..=255, using {:#04x}",
                config.port_name,
                config.vector,
                config.masked_vector()
            );
        }
        let vector = config.masked_vector();

        let num_axes = config.clamped_axes();
        if num_axes != config.num_axes {
            warn!(
                "{}: num_axes {} clamped to {}",
                config.port_name, config.num_axes, num_axes
            );
        }

        for param in Param::CONTROLLER {
            params.create_param(param);
        }

        let mut controller = Self {
            config,
            carrier,
            params,
            vector,
            num_axes,
            running: None,
            setup_error: None,
        };

        match controller.setup() {
            Ok(running) => {
                info!(
                    "{}: {} axes ready, firmware {}",
                    controller.config.port_name,
                    num_axes,
                    running.prom.firmware_version()
                );
                controller.running = Some(running);
            }
            Err(e) => {
                error!(
                    "{}: card setup failed, controller not operational: {}",
                    controller.config.port_name, e
                );
                controller.setup_error = Some(e);
            }
        }
        controller
    }

    fn setup(&self) -> Result<Running, HalError> {
        let slot = self.config.slot;
        let window = self.carrier.map_window(slot)?;
        if window.len() < WINDOW_SIZE {
            return Err(HalError::InitFailed(format!(
                "register window of slot {} is {} bytes, need {}",
                slot,
                window.len(),
                WINDOW_SIZE
            )));
        }

        let prom = PromInfo::read(window.as_ref());
        self.params
            .set_integer(0, Param::FirmwareVersion, prom.firmware_version());
        self.params.call_callbacks(0);
        prom.check(prom::MODEL_8601)?;

        let banks: Vec<RegisterBank> = (0..self.num_axes)
            .map(|axis| RegisterBank::new(window.clone(), axis))
            .collect();

        let (snapshot_tx, snapshot_rx) = crossbeam_channel::bounded(self.config.queue_capacity.max(1));
        let top_half = Arc::new(TopHalf::new(banks.iter().cloned(), snapshot_tx));
        self.carrier
            .int_connect(slot, self.vector, top_half.clone())?;
        self.carrier.irq_enable(slot)?;
        debug!(slot, vector = self.vector, "interrupt connected");

        let settle = self.config.reset_settle();
        let axes = banks
            .into_iter()
            .enumerate()
            .map(|(index, bank)| {
                let mut axis = Axis::new(
                    index,
                    bank,
                    self.vector,
                    self.config.uses_encoder(index),
                    self.config.encoder_ratio(index),
                );
                axis.initialise(settle);
                axis
            })
            .collect();
        let device = Device::new(axes, self.params.clone()).shared();

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        let mut threads = Vec::with_capacity(2);

        let worker = StatusWorker {
            device: device.clone(),
            carrier: self.carrier.clone(),
            slot,
            snapshots: snapshot_rx,
            shutdown: shutdown_rx.clone(),
        };
        threads.push(
            worker
                .spawn()
                .map_err(|e| HalError::InitFailed(format!("cannot start status worker: {e}")))?,
        );

        let poller = Poller {
            device: device.clone(),
            moving_period: self.config.moving_poll(),
            idle_period: self.config.idle_poll(),
            wake: wake_rx,
            shutdown: shutdown_rx,
        };
        threads.push(
            poller
                .spawn()
                .map_err(|e| HalError::InitFailed(format!("cannot start poller: {e}")))?,
        );

        Ok(Running {
            device,
            top_half,
            prom,
            waker: PollerWaker::new(wake_tx),
            shutdown: Some(shutdown_tx),
            threads,
        })
    }

    /// Port the card is registered under.
    pub fn port_name(&self) -> &str {
        &self.config.port_name
    }

    /// Axes in use after clamping.
    pub fn num_axes(&self) -> usize {
        self.num_axes
    }

    /// Interrupt vector after masking.
    pub fn vector(&self) -> u8 {
        self.vector
    }

    /// Whether setup succeeded and the controller was not shut down.
    pub fn is_operational(&self) -> bool {
        self.running.is_some()
    }

    /// Error that left the controller degraded, if any.
    pub fn setup_error(&self) -> Option<&HalError> {
        self.setup_error.as_ref()
    }

    fn running(&self) -> Result<&Running, HalError> {
        self.running.as_ref().ok_or_else(|| {
            HalError::NotOperational(match &self.setup_error {
                Some(e) => format!("{}: {}", self.config.port_name, e),
                None => format!("{}: shut down", self.config.port_name),
            })
        })
    }

    fn with_axis<R>(
        &self,
        axis: usize,
        f: impl FnOnce(&mut Axis, &dyn ParamSink) -> R,
    ) -> Result<R, HalError> {
        let running = self.running()?;
        let mut device = running.device.lock();
        let count = device.axis_count();
        let target = device
            .axis_mut(axis)
            .ok_or(HalError::AxisOutOfRange { axis, count })?;
        Ok(f(target, self.params.as_ref()))
    }

    fn wake_poller(&self) {
        if let Some(running) = &self.running {
            running.waker.wake();
        }
    }

    /// Start a move to `position` (absolute or relative steps).
    pub fn move_axis(
        &self,
        axis: usize,
        position: f64,
        relative: bool,
        min_velocity: f64,
        max_velocity: f64,
        acceleration: f64,
    ) -> Result<(), HalError> {
        self.with_axis(axis, |a, params| {
            a.move_to(params, position, relative, min_velocity, max_velocity, acceleration)
        })?;
        self.wake_poller();
        Ok(())
    }

    /// Home `axis`, stopping on the home switch.
    pub fn home(
        &self,
        axis: usize,
        min_velocity: f64,
        max_velocity: f64,
        acceleration: f64,
        forwards: bool,
    ) -> Result<(), HalError> {
        self.with_axis(axis, |a, params| {
            a.home(params, min_velocity, max_velocity, acceleration, forwards)
        })?;
        self.wake_poller();
        Ok(())
    }

    /// Jog `axis`. The sign of `max_velocity` selects the direction.
    pub fn move_velocity(
        &self,
        axis: usize,
        min_velocity: f64,
        max_velocity: f64,
        acceleration: f64,
    ) -> Result<(), HalError> {
        self.with_axis(axis, |a, params| {
            a.move_velocity(params, min_velocity, max_velocity, acceleration)
        })?;
        self.wake_poller();
        Ok(())
    }

    /// Stop `axis`, on the ramp if `acceleration` is non-zero.
    pub fn stop(&self, axis: usize, acceleration: f64) -> Result<(), HalError> {
        self.with_axis(axis, |a, _| a.stop(acceleration))?;
        self.wake_poller();
        Ok(())
    }

    /// Redefine the current position of `axis`.
    pub fn set_position(&self, axis: usize, position: f64) -> Result<(), HalError> {
        self.with_axis(axis, |a, _| a.set_position(position))
    }

    /// Drive an auxiliary output. The brake output is active low.
    pub fn write_aux(&self, axis: usize, output: AuxOutput, enabled: bool) -> Result<(), HalError> {
        let (bit, asserted, param) = match output {
            AuxOutput::Power => (Csr::AUX1, enabled, Param::PowerControl),
            AuxOutput::Brake => (Csr::AUX2, !enabled, Param::BrakeControl),
        };
        self.with_axis(axis, |a, params| {
            a.write_aux_bit(bit, asserted);
            params.set_integer(axis, param, i32::from(enabled));
            params.call_callbacks(axis);
        })?;
        debug!(axis, ?output, enabled, "aux output");
        Ok(())
    }

    /// Store a move-all request. No motion is started.
    pub fn write_move_all(&self, value: i32) -> Result<(), HalError> {
        let running = self.running()?;
        let device = running.device.lock();
        device.params().set_integer(0, Param::MoveAll, value);
        device.params().call_callbacks(0);
        Ok(())
    }

    /// Poll `axis` and return its published position.
    pub fn read_position(&self, axis: usize) -> Result<f64, HalError> {
        self.read_polled(axis, Param::Position)
    }

    /// Poll `axis` and return its published encoder position.
    pub fn read_encoder_position(&self, axis: usize) -> Result<f64, HalError> {
        self.read_polled(axis, Param::EncoderPosition)
    }

    fn read_polled(&self, axis: usize, param: Param) -> Result<f64, HalError> {
        self.with_axis(axis, |a, params| {
            a.poll(params);
            params.get_double(axis, param).unwrap_or_default()
        })
    }

    /// Firmware version decoded from the PROM revision.
    ///
    /// Published before the model check, so it is also known when setup
    /// rejected the card.
    pub fn firmware_version(&self) -> Option<i32> {
        self.params.get_integer(0, Param::FirmwareVersion)
    }

    /// Interrupt queue counters.
    pub fn interrupt_stats(&self) -> InterruptStats {
        self.running
            .as_ref()
            .map(|r| r.top_half.stats())
            .unwrap_or_default()
    }

    /// Current state of every axis, empty when degraded.
    pub fn axis_states(&self) -> Vec<AxisState> {
        self.running
            .as_ref()
            .map(|r| r.device.lock().states())
            .unwrap_or_default()
    }

    /// Collect the controller state.
    pub fn report_data(&self) -> ControllerReport {
        let axes = self
            .running
            .as_ref()
            .map(|r| r.device.lock().axes().iter().map(Axis::report).collect())
            .unwrap_or_default();
        ControllerReport {
            port_name: self.config.port_name.clone(),
            carrier: self.carrier.name().to_string(),
            slot: self.config.slot,
            num_axes: self.num_axes,
            vector: self.vector,
            operational: self.is_operational(),
            setup_error: self.setup_error.as_ref().map(ToString::to_string),
            prom: self.running.as_ref().map(|r| r.prom.clone()),
            interrupts: self.interrupt_stats(),
            encoder_ratios: (0..self.num_axes)
                .map(|axis| self.config.encoder_ratio(axis))
                .collect(),
            axes,
        }
    }

    /// Write a human-readable report. Level 0 prints one line, higher
    /// levels add per-axis detail and interrupt counters.
    pub fn report(&self, out: &mut impl Write, level: u32) -> std::io::Result<()> {
        let data = self.report_data();
        writeln!(
            out,
            "Hytec motor driver {}, numAxes={}",
            data.port_name, data.num_axes
        )?;
        if level == 0 {
            return Ok(());
        }

        for (axis, ratio) in data.encoder_ratios.iter().enumerate() {
            writeln!(out, "  axis {axis}")?;
            writeln!(out, "    encoder ratio = {ratio:.6}")?;
            if let Some(a) = data.axes.get(axis) {
                writeln!(
                    out,
                    "    state = {:?}, csr = {:#06x}, position = {}",
                    a.state, a.csr, a.abs_position
                )?;
                writeln!(
                    out,
                    "    ramp = {}, vector = {:#04x}",
                    a.ramp_rate, a.vector
                )?;
            }
        }
        writeln!(
            out,
            "  interrupts delivered = {}, dropped = {}",
            data.interrupts.delivered, data.interrupts.dropped
        )?;
        if let Some(e) = &data.setup_error {
            writeln!(out, "  not operational: {e}")?;
        }
        Ok(())
    }

    /// Stop the worker and poller threads and wait for them.
    pub fn shutdown(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        drop(running.shutdown.take());
        for handle in running.threads.drain(..) {
            if handle.join().is_err() {
                warn!("{}: controller thread panicked", self.config.port_name);
            }
        }
        info!("{}: controller shut down", self.config.port_name);
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown();
    }
}
