//! Simulated card and carrier.
//!
//! Used by the test suite and by `hy8601 --simulate` to run the full
//! interrupt and polling pipeline without hardware.

mod card;
mod carrier;

pub use card::{SimCard, SimProm};
pub use carrier::SimCarrier;
