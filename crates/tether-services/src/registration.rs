//! Registration service — explicit self-announcement by peripherals.
//!
//! The counterpart of passive discovery: a peripheral volunteers
//! `/register <name> <uuid> <port>` on a control connection and receives
//! `/ack <data_port>` carrying its assigned data port.

use anyhow::Result;

use crate::activity::ActivityLog;
use crate::registry::RegistryStore;

/// Register a peripheral and allocate its data port.
///
/// Allocation is round-robin over the configured data-port range, indexed by
/// the current registry size. The allocator does NOT check whether the port
/// is already held by another live peripheral — duplicate assignment after
/// removals is possible and preserved deliberately.
pub async fn register(
    registry: &RegistryStore,
    activity: &ActivityLog,
    name: &str,
    uuid: &str,
    control_port: u16,
) -> Result<u16> {
    let data_port = registry
        .upsert_registered(name, uuid, control_port)
        .await?;
    tracing::info!(name, uuid, control_port, data_port, "registered peripheral");
    activity.push(format!(
        "Registered peripheral: {name} on port {control_port}, assigned data port {data_port}"
    ));
    Ok(data_port)
}
