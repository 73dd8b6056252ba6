//! Discovery engine — active probing of the configured port range.
//!
//! Each pass walks every configured port, sends the probe token, and
//! accumulates the reply until the peer closes or the end marker appears,
//! bounded by the socket timeout. Valid replies are upserted into the
//! registry; connection failures are logged and skipped — consistency comes
//! from the next scheduled pass, not from retries.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use tether_core::config::parse_port_range;
use tether_core::protocol::{parse_probe_response, PROBE_TOKEN, RESPONSE_END_MARKER};

use crate::activity::ActivityLog;
use crate::registry::{RegistryStore, UpsertOutcome};

/// Probe target host. Peripherals live on the local network segment and are
/// addressed by port alone.
pub const PROBE_HOST: &str = "127.0.0.1";

/// Probe one port: connect, send the token, accumulate until close or the
/// end marker, all bounded by `timeout`.
pub async fn probe_port(port: u16, timeout: Duration) -> Result<String> {
    let fut = async {
        let mut stream = TcpStream::connect((PROBE_HOST, port))
            .await
            .with_context(|| format!("connect to port {port}"))?;
        stream
            .write_all(format!("{PROBE_TOKEN}\n").as_bytes())
            .await
            .context("send probe token")?;

        let mut response = String::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = stream.read(&mut buf).await.context("read probe reply")?;
            if n == 0 {
                break;
            }
            response.push_str(&String::from_utf8_lossy(&buf[..n]));
            if response.contains(RESPONSE_END_MARKER) {
                break;
            }
        }
        Ok(response)
    };
    tokio::time::timeout(timeout, fut)
        .await
        .with_context(|| format!("probe of port {port} timed out"))?
}

/// One discovery pass over the configured port list.
pub async fn scan(registry: &RegistryStore, activity: &ActivityLog) {
    let doc = registry.doc_snapshot().await;
    let ports = parse_port_range(&doc.known_ports);
    let timeout = Duration::from_secs(doc.socket_timeout_secs);

    for port in ports {
        let response = match probe_port(port, timeout).await {
            Ok(r) if !r.is_empty() => r,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(port, error = %e, "probe failed");
                continue;
            }
        };

        let parsed = match parse_probe_response(&response) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(port, error = %e, "discarding probe response");
                continue;
            }
        };

        match registry.upsert_discovered(&parsed, port).await {
            Ok(UpsertOutcome::Added { name }) => {
                tracing::info!(name, port, "discovered new peripheral");
                activity.push(format!("Discovered new peripheral: {name} on port {port}"));
            }
            Ok(UpsertOutcome::Updated { name }) => {
                tracing::debug!(name, port, "refreshed peripheral");
            }
            Err(e) => {
                tracing::warn!(port, error = %e, "failed to persist discovery result");
            }
        }
    }
}

/// Periodic scan loop. Fixed sleep between passes — no drift compensation,
/// no overlap guard. Runs forever; cancel by dropping the task handle.
pub async fn scan_loop(registry: RegistryStore, activity: ActivityLog) {
    loop {
        scan(&registry, &activity).await;
        let interval = registry.doc_snapshot().await.scan_interval_secs;
        tokio::time::sleep(Duration::from_secs(interval)).await;
    }
}
