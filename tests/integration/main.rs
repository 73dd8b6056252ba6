//! Tether integration test harness.
//!
//! Tests here exercise the orchestration core end-to-end over real TCP on
//! ephemeral localhost ports: fake peripherals answer discovery probes and
//! receive forwarded data lines, and state files live in per-test temp
//! paths. No external environment is required.

use std::path::PathBuf;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use tether_core::config::RegistryDoc;
use tether_core::Peripheral;
use tether_services::{ActivityLog, ChangeSignal, RegistryStore, RouteStore};

mod discovery;
mod routing;
mod state;
mod synchronizer;

// ── Harness ───────────────────────────────────────────────────────────────────

/// A unique temp path for one state file.
pub fn temp_state_path(kind: &str, tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "tether-it-{kind}-{tag}-{}-{}.json",
        std::process::id(),
        uuid::Uuid::new_v4()
    ))
}

/// Freshly opened stores plus their file paths, on a shared change signal.
pub struct TestCore {
    pub registry: RegistryStore,
    pub routes: RouteStore,
    pub activity: ActivityLog,
    pub signal: ChangeSignal,
    pub registry_file: PathBuf,
    pub routes_file: PathBuf,
}

impl TestCore {
    pub async fn open(tag: &str) -> Self {
        Self::open_with(tag, RegistryDoc::default()).await
    }

    /// Open stores against a pre-seeded registry document.
    pub async fn open_with(tag: &str, seed: RegistryDoc) -> Self {
        let registry_file = temp_state_path("registry", tag);
        let routes_file = temp_state_path("routes", tag);
        std::fs::write(
            &registry_file,
            serde_json::to_string_pretty(&seed).unwrap(),
        )
        .unwrap();

        let signal = ChangeSignal::new();
        let registry = RegistryStore::open(registry_file.clone(), signal.clone())
            .await
            .expect("open registry");
        let routes = RouteStore::open(routes_file.clone()).await.expect("open routes");
        let activity = ActivityLog::new(signal.clone());
        Self {
            registry,
            routes,
            activity,
            signal,
            registry_file,
            routes_file,
        }
    }

    pub fn cleanup(&self) {
        let _ = std::fs::remove_file(&self.registry_file);
        let _ = std::fs::remove_file(&self.routes_file);
    }
}

/// Spawn a fake peripheral that answers one probe with the canonical
/// name/UUID/config/EOF reply. Returns its port.
pub async fn fake_peripheral(name: &'static str, uuid: &'static str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 128];
            let _ = stream.read(&mut buf).await;
            let reply = format!("{name}\n{uuid}\nmode=test\nEOF\n");
            let _ = stream.write_all(reply.as_bytes()).await;
        }
    });
    port
}

/// Spawn a line sink that records everything written to it.
/// Returns the port and a join handle resolving to the received text after
/// the first connection closes.
pub async fn line_sink() -> (u16, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut text = String::new();
        let _ = stream.read_to_string(&mut text).await;
        text
    });
    (port, handle)
}

/// Shorthand peripheral for direct store calls.
pub fn peripheral(name: &str, uuid: &str, port: u16) -> Peripheral {
    Peripheral {
        name: name.to_string(),
        uuid: uuid.to_string(),
        config: String::new(),
        port,
        data_port: None,
        last_seen: 0,
    }
}
