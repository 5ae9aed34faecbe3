//! Hardware-facing types for the Hy8601 card.
//!
//! This module contains the register map, card configuration, the error
//! type, the parameter sink capability and the status types shared between
//! the driver and its consumers.

pub mod config;
pub mod error;
pub mod params;
pub mod regs;
pub mod types;
