//! Port synchronizer — periodic reconciliation of cached route ports.
//!
//! Builds a UUID → current-port map from the registry file (without
//! replacing the registry store's in-memory document), re-reads the route
//! table, and rewrites any route whose cached endpoint port diverged.
//! Belt-and-suspenders against a peripheral re-registering on a new port
//! while routes still hold the old cache; coexists with the eager reload the
//! routing engine performs on every forward.

use std::time::Duration;

use anyhow::Result;

use crate::registry::RegistryStore;
use crate::routes::RouteStore;

/// One reconciliation pass. Returns true when any route was repaired.
/// Lock order: registry before routes.
pub async fn sync_once(registry: &RegistryStore, routes: &RouteStore) -> Result<bool> {
    let ports = registry.port_map().await?;
    routes.reload().await?;
    let updated = routes.sync_ports(&ports).await?;
    if updated {
        tracing::info!("synchronized cached route ports with registry");
    }
    Ok(updated)
}

/// Periodic synchronizer loop. Fixed sleep, no overlap protection.
/// Runs forever; cancel by dropping the task handle.
pub async fn sync_loop(registry: RegistryStore, routes: RouteStore) {
    loop {
        let interval = registry.doc_snapshot().await.sync_interval_secs;
        if let Err(e) = sync_once(&registry, &routes).await {
            tracing::warn!(error = %e, "synchronizer pass failed");
        }
        tokio::time::sleep(Duration::from_secs(interval)).await;
    }
}
