//! tether-core — shared types, line protocol, and configuration.
//! All other Tether crates depend on this one.

pub mod config;
pub mod model;
pub mod protocol;

pub use model::{Peripheral, Route, UNKNOWN_NAME};
pub use protocol::{Command, RoutesAction, PROBE_TOKEN, RESPONSE_END_MARKER};
