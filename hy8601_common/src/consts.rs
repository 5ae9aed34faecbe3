//! Card-wide constants.
//!
//! Single source of truth for axis limits and configuration defaults.

/// Number of axes on one Hy8601 card.
pub const MAX_AXES: usize = 4;

/// Default depth of the interrupt status queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default poll period while any axis is moving (milliseconds).
pub const DEFAULT_MOVING_POLL_MS: u64 = 100;

/// Default poll period while every axis is idle (milliseconds).
pub const DEFAULT_IDLE_POLL_MS: u64 = 1000;

/// Default settle time between setting and clearing CRASHSTOP on axis reset.
pub const DEFAULT_RESET_SETTLE_MS: u64 = 100;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/hy8601/config.toml";
