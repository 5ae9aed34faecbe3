//! Status and command types shared by the driver and its consumers.
//!
//! - `StatusSnapshot` - CSR values captured by the interrupt top half
//! - `AxisState` - Derived motion state of one axis
//! - `MotionPhase` - Whether the completion of the current move was applied
//! - `AuxOutput` - Auxiliary outputs driven through the CSR
//! - `InterruptStats` - Queue delivery counters

use crate::consts::MAX_AXES;
use crate::hal::regs::Csr;
use serde::{Deserialize, Serialize};

/// One CSR value per axis, in axis order.
pub type StatusSnapshot = heapless::Vec<u16, MAX_AXES>;

/// Motion state of an axis, derived from the CSR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisState {
    #[default]
    Idle,
    /// GO or JOG asserted.
    Moving,
    /// HOMESTOP and JOG asserted.
    Homing,
    /// Stop requested, DONE not yet observed.
    Stopping,
}

impl AxisState {
    /// Derive the state from a CSR value and the pending-stop flag.
    pub fn from_csr(csr: Csr, stopping: bool) -> Self {
        if stopping {
            AxisState::Stopping
        } else if csr.contains(Csr::HOMESTOP | Csr::JOG) {
            AxisState::Homing
        } else if csr.is_busy() {
            AxisState::Moving
        } else {
            AxisState::Idle
        }
    }

    pub fn is_idle(self) -> bool {
        self == AxisState::Idle
    }
}

/// Completion bookkeeping of the current move.
///
/// The step delta observed when DONE is first seen is applied once; later
/// polls with DONE still asserted apply nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MotionPhase {
    #[default]
    InProgress,
    DoneUnconsumed,
    DoneConsumed,
}

/// Auxiliary outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuxOutput {
    /// AUX1, active high.
    Power,
    /// AUX2, active low.
    Brake,
}

/// Interrupt queue counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InterruptStats {
    /// Snapshots enqueued.
    pub delivered: u64,
    /// Snapshots discarded on a full queue.
    pub dropped: u64,
}
