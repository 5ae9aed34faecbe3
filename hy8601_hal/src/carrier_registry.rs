//! Carrier registry.
//!
//! Provides a `CarrierRegistry` struct for registering and creating carriers
//! by name. Constructed at startup and passed by value, no global state.

use hy8601_common::hal::error::HalError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::carrier::Carrier;

/// Inputs a carrier factory may need.
#[derive(Debug, Clone)]
pub struct CarrierOptions {
    /// UIO device per slot.
    pub uio_devices: Vec<PathBuf>,
    /// Number of simulated slots.
    pub sim_slots: usize,
    /// Clock period of the simulated carrier, `None` for manual ticking.
    pub sim_clock: Option<Duration>,
    /// Steps each simulated axis advances per clock tick.
    pub sim_steps_per_tick: u32,
}

impl Default for CarrierOptions {
    fn default() -> Self {
        Self {
            uio_devices: Vec::new(),
            sim_slots: 1,
            sim_clock: None,
            sim_steps_per_tick: 10,
        }
    }
}

/// Factory function creating a carrier.
pub type CarrierFactory = fn(&CarrierOptions) -> Result<Arc<dyn Carrier>, HalError>;

/// Registry of available carriers.
pub struct CarrierRegistry {
    factories: HashMap<&'static str, CarrierFactory>,
}

impl CarrierRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a carrier factory.
    ///
    /// # Panics
    /// Panics if a carrier with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: CarrierFactory) {
        if self.factories.contains_key(name) {
            panic!("Carrier '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Get a carrier factory by name.
    pub fn get_factory(&self, name: &str) -> Option<CarrierFactory> {
        self.factories.get(name).copied()
    }

    /// Create a carrier by name.
    ///
    /// # Errors
    /// Returns `HalError::CarrierNotFound` if no carrier with the given name
    /// is registered, or the factory's own error.
    pub fn create(&self, name: &str, options: &CarrierOptions) -> Result<Arc<dyn Carrier>, HalError> {
        let factory = self
            .get_factory(name)
            .ok_or_else(|| HalError::CarrierNotFound(name.to_string()))?;
        factory(options)
    }

    /// List all registered carrier names.
    pub fn list(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl Default for CarrierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::default_registry;
    use crate::drivers::simulation::SimCarrier;

    fn create_test_carrier(_options: &CarrierOptions) -> Result<Arc<dyn Carrier>, HalError> {
        Ok(Arc::new(SimCarrier::new(2)))
    }

    #[test]
    fn registry_register_and_create() {
        let mut reg = CarrierRegistry::new();
        reg.register("test_carrier", create_test_carrier);

        let carrier = reg
            .create("test_carrier", &CarrierOptions::default())
            .expect("should create");
        assert_eq!(carrier.name(), "simulation");
        assert!(carrier.map_window(1).is_ok());
    }

    #[test]
    fn registry_carrier_not_found() {
        let reg = CarrierRegistry::new();
        let result = reg.create("nonexistent", &CarrierOptions::default());
        assert!(matches!(result, Err(HalError::CarrierNotFound(_))));
    }

    #[test]
    fn default_registry_lists_builtins() {
        let mut names = default_registry().list();
        names.sort();
        assert_eq!(names, vec!["simulation", "uio"]);
    }

    #[test]
    fn uio_without_devices_is_a_config_error() {
        let result = default_registry().create("uio", &CarrierOptions::default());
        assert!(matches!(result, Err(HalError::ConfigError(_))));
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn registry_duplicate_panics() {
        let mut reg = CarrierRegistry::new();
        reg.register("dup", create_test_carrier);
        reg.register("dup", create_test_carrier);
    }
}
