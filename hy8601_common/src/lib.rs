//! Hy8601 Common Library
//!
//! Shared constants, register layout and configuration types for the
//! Hy8601 stepper-motor IP card workspace.
//!
//! # Module Structure
//!
//! - [`consts`] - Card-wide limits and defaults
//! - [`hal`] - Register map, configuration, parameter sink and status types
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use hy8601_common::hal::regs::Csr;
//!
//! let csr = Csr::GO | Csr::DIRECTION;
//! assert!(csr.contains(Csr::GO));
//! ```

pub mod config;
pub mod consts;
pub mod hal;
pub mod prelude;
