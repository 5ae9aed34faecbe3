//! Carrier implementations.
//!
//! - [`simulation`] - Software card and carrier for development and testing
//! - [`uio`] - Linux UIO devices for real hardware
//!
//! [`default_registry`] registers both under their carrier names.

pub mod simulation;
pub mod uio;

use crate::carrier_registry::{CarrierOptions, CarrierRegistry};
use crate::carrier::Carrier;
use hy8601_common::hal::error::HalError;
use std::sync::Arc;

fn create_simulation(options: &CarrierOptions) -> Result<Arc<dyn Carrier>, HalError> {
    let carrier = Arc::new(simulation::SimCarrier::new(options.sim_slots.max(1)));
    if let Some(period) = options.sim_clock {
        carrier
            .start_clock(period, options.sim_steps_per_tick)
            .map_err(|e| HalError::InitFailed(format!("cannot start simulation clock: {e}")))?;
    }
    Ok(carrier)
}

fn create_uio(options: &CarrierOptions) -> Result<Arc<dyn Carrier>, HalError> {
    if options.uio_devices.is_empty() {
        return Err(HalError::ConfigError(
            "uio carrier needs at least one device".to_string(),
        ));
    }
    Ok(Arc::new(uio::UioCarrier::open(&options.uio_devices)?))
}

/// Registry with every built-in carrier.
pub fn default_registry() -> CarrierRegistry {
    let mut registry = CarrierRegistry::new();
    registry.register("simulation", create_simulation);
    registry.register("uio", create_uio);
    registry
}
