//! Card configuration.
//!
//! `CardConfig` carries everything needed to bring up one Hy8601 card:
//! carrier/slot placement, interrupt vector, encoder usage and the poller
//! cadence.

use crate::config::ConfigError;
use crate::consts::{
    DEFAULT_IDLE_POLL_MS, DEFAULT_MOVING_POLL_MS, DEFAULT_QUEUE_CAPACITY, DEFAULT_RESET_SETTLE_MS,
    MAX_AXES,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_num_axes() -> usize {
    MAX_AXES
}

fn default_moving_poll_ms() -> u64 {
    DEFAULT_MOVING_POLL_MS
}

fn default_idle_poll_ms() -> u64 {
    DEFAULT_IDLE_POLL_MS
}

fn default_vector() -> i32 {
    0x70
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_reset_settle_ms() -> u64 {
    DEFAULT_RESET_SETTLE_MS
}

/// Configuration of one card.
///
/// # TOML Example
///
/// ```toml
/// [card]
/// port_name = "HY8601_1"
/// carrier = 0
/// slot = 1
/// num_axes = 4
/// vector = 0x70
/// use_encoder = 0b0011
/// encoder_ratios = [1.0, 1.0]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardConfig {
    /// Name the controller is registered under.
    pub port_name: String,

    /// Card number, informational.
    #[serde(default)]
    pub card: u32,

    /// Carrier board number.
    #[serde(default)]
    pub carrier: u32,

    /// IP slot on the carrier.
    #[serde(default)]
    pub slot: u32,

    /// Number of axes to drive. Clamped to `1..=4` at configure time.
    #[serde(default = "default_num_axes")]
    pub num_axes: usize,

    /// Poll period while any axis is busy.
    #[serde(default = "default_moving_poll_ms")]
    pub moving_poll_ms: u64,

    /// Poll period while every axis is idle.
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,

    /// Interrupt vector. Values outside `1..=255` are reported and masked to
    /// eight bits.
    #[serde(default = "default_vector")]
    pub vector: i32,

    /// Bit `n` set means axis `n` uses its encoder.
    #[serde(default)]
    pub use_encoder: u8,

    /// Encoder ratio per axis, reported only.
    #[serde(default)]
    pub encoder_ratios: Vec<f64>,

    /// Depth of the interrupt snapshot queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Settle time of the CRASHSTOP pulse during axis initialisation.
    #[serde(default = "default_reset_settle_ms")]
    pub reset_settle_ms: u64,
}

impl CardConfig {
    /// Configuration with defaults for the given port name.
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            card: 0,
            carrier: 0,
            slot: 0,
            num_axes: default_num_axes(),
            moving_poll_ms: default_moving_poll_ms(),
            idle_poll_ms: default_idle_poll_ms(),
            vector: default_vector(),
            use_encoder: 0,
            encoder_ratios: Vec::new(),
            queue_capacity: default_queue_capacity(),
            reset_settle_ms: default_reset_settle_ms(),
        }
    }

    /// Validate the card configuration.
    ///
    /// # Validation Rules
    /// 1. Both poll periods > 0
    /// 2. `num_axes` in `1..=MAX_AXES`
    /// 3. At most `MAX_AXES` encoder ratios
    /// 4. `queue_capacity` > 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.moving_poll_ms == 0 || self.idle_poll_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poll periods must be greater than 0".to_string(),
            ));
        }

        if self.num_axes == 0 || self.num_axes > MAX_AXES {
            return Err(ConfigError::ValidationError(format!(
                "num_axes must be in 1..={} (got {})",
                MAX_AXES, self.num_axes
            )));
        }

        if self.encoder_ratios.len() > MAX_AXES {
            return Err(ConfigError::ValidationError(format!(
                "Too many encoder ratios: {} (max {})",
                self.encoder_ratios.len(),
                MAX_AXES
            )));
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "queue_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Axis count clamped to what the card provides.
    pub fn clamped_axes(&self) -> usize {
        self.num_axes.clamp(1, MAX_AXES)
    }

    /// Whether `axis` is configured to use its encoder.
    pub fn uses_encoder(&self, axis: usize) -> bool {
        axis < MAX_AXES && self.use_encoder & (1 << axis) != 0
    }

    /// Encoder ratio for `axis`, 0.0 when not configured.
    pub fn encoder_ratio(&self, axis: usize) -> f64 {
        self.encoder_ratios.get(axis).copied().unwrap_or(0.0)
    }

    /// Vector limited to the eight bits the card register holds.
    pub fn masked_vector(&self) -> u8 {
        (self.vector & 0xFF) as u8
    }

    /// Whether the configured vector lies in `1..=255`.
    pub fn vector_in_range(&self) -> bool {
        (1..=255).contains(&self.vector)
    }

    pub fn moving_poll(&self) -> Duration {
        Duration::from_millis(self.moving_poll_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn reset_settle(&self) -> Duration {
        Duration::from_millis(self.reset_settle_ms)
    }
}
