//! Prelude module for common re-exports.
//!
//! `use hy8601_common::prelude::*;` brings in the types most consumers of
//! the controller need.
//!
//! # Usage
//!
//! ```rust
//! use hy8601_common::prelude::*;
//!
//! let config = CardConfig::new("HY8601_1");
//! assert!(config.num_axes <= MAX_AXES);
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, Hy8601Config, SharedConfig};
pub use crate::hal::config::CardConfig;

// ─── Card Constants ─────────────────────────────────────────────────
pub use crate::consts::{DEFAULT_CONFIG_PATH, MAX_AXES};
pub use crate::hal::regs::Csr;

// ─── Driver Types ───────────────────────────────────────────────────
pub use crate::hal::error::HalError;
pub use crate::hal::params::{Param, ParamSink};
pub use crate::hal::types::{AuxOutput, AxisState, InterruptStats, MotionPhase, StatusSnapshot};
