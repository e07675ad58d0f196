//! Runtime core for the PulseOne collector.
//!
//! Wires the protocol drivers (§4.1), the per-device poll loop (§4.2), the
//! fan-out pipeline (§4.3), the rule engine (§4.4-4.5), and the supervised
//! worker registry (§5) into a single [`registry::Runtime`] root assembled
//! by explicit dependency injection (§9) rather than any global singleton.

pub mod drivers;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod rules;
pub mod worker;

pub use error::{CoreError, Result};
pub use registry::{Runtime, WorkerRegistry};
pub use rules::RuleEngine;
