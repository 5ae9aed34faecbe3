//! # Hy8601 Driver Library
//!
//! Controller for the Hytec 8601 four-axis stepper-motor IP card.
//!
//! # Module Structure
//!
//! - [`registers`] - Register window access and per-axis banks
//! - [`prom`] - Identification PROM decoding
//! - [`axis`] - Motion commands and position reconciliation for one axis
//! - [`device`] - Axes and parameter sink behind the device lock
//! - [`isr`] - Interrupt top half
//! - [`worker`] - Interrupt bottom half
//! - [`poller`] - Periodic status poller
//! - [`controller`] - Card bring-up and command surface
//! - [`carrier`] / [`carrier_registry`] - IP carrier abstraction and factories
//! - [`drivers`] - Simulated and UIO carriers
//! - [`params`] - In-memory parameter store
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         hy8601_hal                               │
//! │  ┌─────────────┐    ┌──────────────┐    ┌─────────────────────┐  │
//! │  │  Carrier    │───►│  TopHalf     │───►│  StatusWorker       │  │
//! │  │ (sim / uio) │    │  (IRQ ctx)   │    │  (bottom half)      │  │
//! │  └─────────────┘    └──────────────┘    └──────────┬──────────┘  │
//! │                                                    ▼             │
//! │  ┌─────────────┐                         ┌─────────────────────┐ │
//! │  │ Controller  │────────────────────────►│ Device (Mutex)      │ │
//! │  │ commands    │──wake──► Poller ───────►│ axes + ParamSink    │ │
//! │  └─────────────┘                         └─────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod axis;
pub mod carrier;
pub mod carrier_registry;
pub mod controller;
pub mod device;
pub mod drivers;
pub mod isr;
pub mod params;
pub mod poller;
pub mod prom;
pub mod registers;
pub mod worker;

pub use crate::carrier::{Carrier, InterruptHandler};
pub use crate::carrier_registry::{CarrierOptions, CarrierRegistry};
pub use crate::controller::{Controller, ControllerReport};
pub use crate::drivers::default_registry;
pub use crate::params::{ParamStore, ParamValue};
