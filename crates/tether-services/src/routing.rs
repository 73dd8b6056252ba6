//! Routing engine — forwards inbound peripheral data lines.
//!
//! Every forward starts by reloading the route table from disk so operator
//! edits take effect without a restart. Matching is by source UUID; a source
//! may fan out to several routes. A down destination drops that copy of the
//! message — no retry, no queue — and does not abort the remaining routes.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::activity::ActivityLog;
use crate::discovery::PROBE_HOST;
use crate::registry::RegistryStore;
use crate::routes::RouteStore;

/// Forward `payload` on behalf of the peripheral identified by `uuid`.
///
/// No matching route is not an error to the caller — it is logged and
/// nothing is sent. Lock order: registry is read before the route table.
pub async fn forward(
    registry: &RegistryStore,
    routes: &RouteStore,
    activity: &ActivityLog,
    uuid: &str,
    payload: &str,
) {
    let timeout = Duration::from_secs(registry.doc_snapshot().await.socket_timeout_secs);

    if let Err(e) = routes.reload().await {
        tracing::warn!(error = %e, "route table reload failed, using cached routes");
    }

    let matching = routes.matching_source(uuid).await;
    if matching.is_empty() {
        tracing::info!(uuid, "no routes found for peripheral");
        activity.push(format!("No routes found for peripheral UUID {uuid}"));
        return;
    }

    for route in matching {
        match send_line(route.destination_port, payload, timeout).await {
            Ok(()) => {
                if let Err(e) = routes.stamp_last_used(&route.name).await {
                    tracing::warn!(route = route.name, error = %e, "failed to stamp route");
                }
                let source_name = registry.name_by_uuid(&route.source).await;
                let destination_name = registry.name_by_uuid(&route.destination).await;
                tracing::info!(
                    route = route.name,
                    from = source_name,
                    to = destination_name,
                    "forwarded data line"
                );
                activity.push(format!(
                    "{source_name} sent data to {destination_name} via route '{}'",
                    route.name
                ));
            }
            Err(e) => {
                tracing::warn!(
                    route = route.name,
                    port = route.destination_port,
                    error = %e,
                    "forward failed"
                );
                activity.push(format!("Error forwarding data on route '{}'", route.name));
            }
        }
    }
}

/// Short-lived outbound connection: connect, write one line, done.
async fn send_line(port: u16, payload: &str, timeout: Duration) -> anyhow::Result<()> {
    let fut = async {
        let mut stream = TcpStream::connect((PROBE_HOST, port)).await?;
        stream.write_all(format!("{payload}\n").as_bytes()).await?;
        stream.flush().await?;
        Ok::<(), anyhow::Error>(())
    };
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| anyhow::anyhow!("connection to port {port} timed out"))?
}
