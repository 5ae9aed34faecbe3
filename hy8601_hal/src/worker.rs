//! Status worker (interrupt bottom half).
//!
//! Drains snapshots captured by the top half, publishes each axis's status
//! under the device lock, then re-enables the carrier interrupt line.

use crossbeam_channel::{Receiver, select};
use hy8601_common::hal::types::StatusSnapshot;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

use crate::carrier::Carrier;
use crate::device::SharedDevice;

/// Everything the worker thread needs.
pub struct StatusWorker {
    /// Device the snapshots are applied to.
    pub device: SharedDevice,
    /// Carrier whose interrupt line is re-enabled after each snapshot.
    pub carrier: Arc<dyn Carrier>,
    /// Slot of the card.
    pub slot: u32,
    /// Snapshots queued by the top half.
    pub snapshots: Receiver<StatusSnapshot>,
    /// Closed when the controller shuts down.
    pub shutdown: Receiver<()>,
}

impl StatusWorker {
    /// Handle one snapshot.
    pub fn process(&self, snapshot: &StatusSnapshot) {
        self.device.lock().apply_snapshot(snapshot);
        if let Err(e) = self.carrier.irq_enable(self.slot) {
            warn!("Failed to re-enable interrupts on slot {}: {}", self.slot, e);
        }
    }

    /// Run until the shutdown channel fires or disconnects.
    pub fn run(self) {
        info!("Status worker started");
        loop {
            select! {
                recv(self.snapshots) -> msg => match msg {
                    Ok(snapshot) => {
                        debug!(axes = snapshot.len(), "interrupt snapshot");
                        self.process(&snapshot);
                    }
                    Err(_) => break,
                },
                recv(self.shutdown) -> _ => break,
            }
        }
        info!("Status worker stopped");
    }

    /// Start the worker on its own thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("hy8601-status".into())
            .spawn(move || self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::Axis;
    use crate::device::Device;
    use crate::drivers::simulation::SimCarrier;
    use crate::params::ParamStore;
    use crate::registers::RegisterBank;
    use hy8601_common::hal::params::{Param, ParamSink};
    use hy8601_common::hal::regs::Csr;
    use std::time::Duration;

    #[test]
    fn snapshot_published_and_line_reenabled() {
        let carrier = Arc::new(SimCarrier::new(1));
        let window = carrier.map_window(0).unwrap();
        let params = Arc::new(ParamStore::new());
        let mut axis = Axis::new(0, RegisterBank::new(window, 0), 0x70, false, 0.0);
        axis.initialise(Duration::ZERO);
        let device = Device::new(vec![axis], params.clone()).shared();

        let (snap_tx, snap_rx) = crossbeam_channel::bounded(4);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let worker = StatusWorker {
            device,
            carrier: carrier.clone(),
            slot: 0,
            snapshots: snap_rx,
            shutdown: shutdown_rx,
        };
        let handle = worker.spawn().unwrap();

        let mut snapshot = StatusSnapshot::new();
        snapshot.push((Csr::DONE | Csr::HOMELMT).bits()).unwrap();
        snap_tx.send(snapshot).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !carrier.line_enabled(0) && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(carrier.line_enabled(0));
        assert_eq!(params.get_integer(0, Param::Done), Some(1));
        assert_eq!(params.get_integer(0, Param::Home), Some(1));

        drop(shutdown_tx);
        handle.join().unwrap();
    }

    #[test]
    fn process_is_synchronous() {
        let carrier = Arc::new(SimCarrier::new(1));
        let window = carrier.map_window(0).unwrap();
        let params = Arc::new(ParamStore::new());
        let axis = Axis::new(0, RegisterBank::new(window, 0), 0x70, false, 0.0);
        let device = Device::new(vec![axis], params.clone()).shared();
        let (_tx, snapshots) = crossbeam_channel::bounded(1);
        let (_stx, shutdown) = crossbeam_channel::bounded(1);
        let worker = StatusWorker {
            device,
            carrier: carrier.clone(),
            slot: 0,
            snapshots,
            shutdown,
        };

        let mut snapshot = StatusSnapshot::new();
        snapshot.push(Csr::MINLMT.bits()).unwrap();
        worker.process(&snapshot);

        assert_eq!(params.get_integer(0, Param::LowLimit), Some(1));
        assert!(carrier.line_enabled(0));
    }
}
