//! Device state shared by the command, poller and worker contexts.
//!
//! One `Device` holds every axis and the parameter sink. It lives behind a
//! single `parking_lot::Mutex`; all register access except the interrupt
//! top half happens with that lock held.

use hy8601_common::hal::params::ParamSink;
use hy8601_common::hal::regs::Csr;
use hy8601_common::hal::types::AxisState;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::axis::Axis;

/// Axis lookup by index.
pub trait AxisDirectory {
    /// Number of axes.
    fn axis_count(&self) -> usize;

    /// Mutable axis `index`, if configured.
    fn axis_mut(&mut self, index: usize) -> Option<&mut Axis>;
}

/// Axes plus the sink they publish to.
pub struct Device {
    axes: Vec<Axis>,
    params: Arc<dyn ParamSink>,
}

/// Device behind the device lock.
pub type SharedDevice = Arc<Mutex<Device>>;

impl Device {
    /// Device over initialised axes.
    pub fn new(axes: Vec<Axis>, params: Arc<dyn ParamSink>) -> Self {
        Self { axes, params }
    }

    /// Put the device behind the device lock.
    pub fn shared(self) -> SharedDevice {
        Arc::new(Mutex::new(self))
    }

    /// Sink every axis publishes to.
    pub fn params(&self) -> &dyn ParamSink {
        self.params.as_ref()
    }

    /// All axes in index order.
    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    /// Poll every axis in index order. Returns true if any axis is busy.
    pub fn poll_all(&mut self) -> bool {
        let params = self.params.as_ref();
        let mut busy = false;
        for axis in &mut self.axes {
            axis.poll(params);
            busy |= !axis.state().is_idle();
        }
        busy
    }

    /// Apply one interrupt snapshot, CSR values in axis order.
    pub fn apply_snapshot(&mut self, snapshot: &[u16]) {
        let params = self.params.as_ref();
        for (axis, csr) in self.axes.iter_mut().zip(snapshot) {
            axis.apply_status(params, Csr::from_bits_retain(*csr));
        }
    }

    /// Current state of every axis.
    pub fn states(&self) -> Vec<AxisState> {
        self.axes.iter().map(Axis::state).collect()
    }
}

impl AxisDirectory for Device {
    fn axis_count(&self) -> usize {
        self.axes.len()
    }

    fn axis_mut(&mut self, index: usize) -> Option<&mut Axis> {
        self.axes.get_mut(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::simulation::SimCard;
    use crate::params::ParamStore;
    use crate::registers::RegisterBank;
    use hy8601_common::hal::params::Param;
    use std::time::Duration;

    fn device(axes: usize) -> (Arc<SimCard>, Arc<ParamStore>, Device) {
        let card = Arc::new(SimCard::new());
        let params = Arc::new(ParamStore::new());
        let axes = (0..axes)
            .map(|i| {
                let mut axis = Axis::new(i, RegisterBank::new(card.clone(), i), 0x70, false, 1.0);
                axis.initialise(Duration::ZERO);
                axis
            })
            .collect();
        (card, params.clone(), Device::new(axes, params))
    }

    #[test]
    fn poll_all_reports_busy_axes() {
        let (card, params, mut dev) = device(2);
        assert!(!dev.poll_all());

        dev.axis_mut(1)
            .unwrap()
            .move_velocity(params.as_ref(), 0.0, 10.0, 0.0);
        assert!(dev.poll_all());
        assert_eq!(dev.states(), vec![AxisState::Idle, AxisState::Moving]);

        card.assert_done(1);
        assert!(!dev.poll_all());
    }

    #[test]
    fn snapshot_is_applied_in_axis_order() {
        let (_card, params, mut dev) = device(2);
        dev.apply_snapshot(&[Csr::MAXLMT.bits(), Csr::DONE.bits()]);
        assert_eq!(params.get_integer(0, Param::HighLimit), Some(1));
        assert_eq!(params.get_integer(0, Param::Done), Some(0));
        assert_eq!(params.get_integer(1, Param::Done), Some(1));
    }

    #[test]
    fn directory_lookup() {
        let (_card, _params, mut dev) = device(3);
        assert_eq!(dev.axis_count(), 3);
        assert_eq!(dev.axis_mut(2).map(|a| a.index()), Some(2));
        assert!(dev.axis_mut(3).is_none());
    }
}
