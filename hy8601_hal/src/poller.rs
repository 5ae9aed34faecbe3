//! Periodic poller.
//!
//! Polls every axis under the device lock, at the moving cadence while any
//! axis is busy and at the idle cadence otherwise. A wake message forces
//! an immediate poll, which is how commands get prompt feedback.

use crossbeam_channel::{Receiver, Sender, select};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, trace};

use crate::device::SharedDevice;

/// Poller thread configuration.
pub struct Poller {
    /// Device polled every cycle.
    pub device: SharedDevice,
    /// Period while any axis is busy.
    pub moving_period: Duration,
    /// Period while every axis is idle.
    pub idle_period: Duration,
    /// Poll requests from commands.
    pub wake: Receiver<()>,
    /// Closed when the controller shuts down.
    pub shutdown: Receiver<()>,
}

/// Handle used by commands to force a poll.
#[derive(Clone)]
pub struct PollerWaker(Sender<()>);

impl PollerWaker {
    /// Waker over the sending side of the poller's wake channel.
    pub fn new(tx: Sender<()>) -> Self {
        Self(tx)
    }

    /// Request a poll. A request already pending is enough.
    pub fn wake(&self) {
        let _ = self.0.try_send(());
    }
}

impl Poller {
    /// Period to wait after a poll that found `busy`.
    pub fn period(&self, busy: bool) -> Duration {
        if busy {
            self.moving_period
        } else {
            self.idle_period
        }
    }

    /// Run until the shutdown channel fires or disconnects.
    pub fn run(self) {
        info!(
            "Poller started (moving {:?}, idle {:?})",
            self.moving_period, self.idle_period
        );
        loop {
            let busy = self.device.lock().poll_all();
            let period = self.period(busy);
            trace!(busy, ?period, "poll cycle");

            select! {
                recv(self.shutdown) -> _ => break,
                recv(self.wake) -> msg => {
                    if msg.is_err() {
                        break;
                    }
                }
                default(period) => {}
            }
        }
        info!("Poller stopped");
    }

    /// Start the poller on its own thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("hy8601-poller".into())
            .spawn(move || self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::Axis;
    use crate::device::Device;
    use crate::drivers::simulation::SimCard;
    use crate::params::ParamStore;
    use crate::registers::RegisterBank;
    use hy8601_common::hal::params::{Param, ParamSink};
    use std::sync::Arc;
    use std::time::Instant;

    type Fixture = (Arc<SimCard>, Arc<ParamStore>, Poller, Sender<()>, Sender<()>);

    fn poller(moving: u64, idle: u64) -> Fixture {
        let card = Arc::new(SimCard::new());
        let params = Arc::new(ParamStore::new());
        let axis = Axis::new(0, RegisterBank::new(card.clone(), 0), 0x70, false, 0.0);
        let device = Device::new(vec![axis], params.clone()).shared();
        let (wake_tx, wake) = crossbeam_channel::bounded(1);
        let (shutdown_tx, shutdown) = crossbeam_channel::bounded(0);
        let poller = Poller {
            device,
            moving_period: Duration::from_millis(moving),
            idle_period: Duration::from_millis(idle),
            wake,
            shutdown,
        };
        (card, params, poller, wake_tx, shutdown_tx)
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn cadence_follows_busy_state() {
        let (_card, _params, poller, _wake, _shutdown) = poller(100, 1000);
        assert_eq!(poller.period(true), Duration::from_millis(100));
        assert_eq!(poller.period(false), Duration::from_millis(1000));
    }

    #[test]
    fn wake_forces_a_poll() {
        let (card, params, poller, wake_tx, shutdown_tx) = poller(60_000, 60_000);
        let handle = poller.spawn().unwrap();

        assert!(wait_for(|| params.get_double(0, Param::Position).is_some()));
        RegisterBank::new(card.clone(), 0).set_position(42);
        PollerWaker::new(wake_tx).wake();
        assert!(wait_for(|| params.get_double(0, Param::Position) == Some(42.0)));

        drop(shutdown_tx);
        handle.join().unwrap();
    }

    #[test]
    fn shutdown_interrupts_a_long_wait() {
        let (_card, _params, poller, _wake_tx, shutdown_tx) = poller(60_000, 60_000);
        let handle = poller.spawn().unwrap();
        drop(shutdown_tx);
        handle.join().unwrap();
    }
}
