//! tether-services — the orchestration core.
//!
//! State stores for the peripheral registry and the route table, the
//! discovery scanner, the registration service, the routing engine, and the
//! background port synchronizer. The daemon binary wires these together.

pub mod activity;
pub mod discovery;
pub mod registration;
pub mod registry;
pub mod routes;
pub mod routing;
pub mod sync;

pub use activity::{ActivityLog, ChangeSignal};
pub use registry::{RegistryStore, UpsertOutcome};
pub use routes::RouteStore;
