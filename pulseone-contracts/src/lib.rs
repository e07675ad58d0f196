//! Trait surface and wire contracts for PulseOne protocol drivers.
//!
//! Depends only on `pulseone-model`; knows nothing about scheduling, the
//! pipeline, or persistence (§4.1).
#![allow(missing_docs)]

pub mod driver;
pub mod error;
pub mod factory;
pub mod sample;
pub mod state;
pub mod statistics;

pub use driver::{Driver, RawReading, ReadOutcome, WireValue};
pub use error::{DriverError, DriverErrorKind, ErrorClass, Result};
pub use factory::{DriverConstructor, DriverFactory};
pub use sample::Sample;
pub use state::{ConnectionState, LifecycleState};
pub use statistics::{DriverStatistics, StatisticsSnapshot};
