//! Orchestrator configuration and the persisted registry document.
//!
//! Tether keeps two whole-file JSON snapshots: the registry document
//! (configuration + peripheral list + orchestrator identity) and the route
//! table. The registry document defined here is rewritten in full on every
//! mutation; partial updates do not exist.
//!
//! State file locations:
//!   1. $TETHER_STATE_DIR (explicit override)
//!   2. current working directory

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Registry file name inside the state directory.
pub const REGISTRY_FILE: &str = "tether.json";

/// Route table file name inside the state directory.
pub const ROUTES_FILE: &str = "routes.json";

/// The persisted registry document: tunables, identity, and the fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryDoc {
    /// Ports probed by the discovery scan, e.g. "6200-6300" or "6200,6210".
    pub known_ports: String,

    /// Seconds between discovery passes. No drift compensation.
    pub scan_interval_secs: u64,

    /// Ports accepting command-protocol connections.
    pub command_ports: String,

    /// Range data ports are allocated from at registration.
    pub data_port_range: String,

    /// Seconds between synchronizer passes.
    pub sync_interval_secs: u64,

    /// Socket timeout for probes, forwards, and connection reads.
    pub socket_timeout_secs: u64,

    /// Cap on concurrent connection workers across all listeners.
    pub max_workers: usize,

    /// This orchestrator's identity, generated on first run.
    pub orchestrator_uuid: String,

    /// The peripheral registry.
    pub peripherals: Vec<crate::Peripheral>,
}

impl Default for RegistryDoc {
    fn default() -> Self {
        Self {
            known_ports: "6200-6300".to_string(),
            scan_interval_secs: 5,
            command_ports: "6000-6005".to_string(),
            data_port_range: "6001-6099".to_string(),
            sync_interval_secs: 5,
            socket_timeout_secs: 5,
            max_workers: 256,
            orchestrator_uuid: Uuid::new_v4().to_string(),
            peripherals: Vec::new(),
        }
    }
}

impl RegistryDoc {
    /// Apply TETHER_* env var overrides to the tunable fields.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TETHER_KNOWN_PORTS") {
            self.known_ports = v;
        }
        if let Ok(v) = std::env::var("TETHER_COMMAND_PORTS") {
            self.command_ports = v;
        }
        if let Ok(v) = std::env::var("TETHER_DATA_PORT_RANGE") {
            self.data_port_range = v;
        }
        if let Ok(v) = std::env::var("TETHER_SCAN_INTERVAL_SECS") {
            if let Ok(n) = v.parse() {
                self.scan_interval_secs = n;
            }
        }
        if let Ok(v) = std::env::var("TETHER_SYNC_INTERVAL_SECS") {
            if let Ok(n) = v.parse() {
                self.sync_interval_secs = n;
            }
        }
        if let Ok(v) = std::env::var("TETHER_MAX_WORKERS") {
            if let Ok(n) = v.parse() {
                self.max_workers = n;
            }
        }
    }
}

/// Directory holding both state files.
pub fn state_dir() -> PathBuf {
    std::env::var("TETHER_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Path of the registry document.
pub fn registry_path() -> PathBuf {
    state_dir().join(REGISTRY_FILE)
}

/// Path of the route table.
pub fn routes_path() -> PathBuf {
    state_dir().join(ROUTES_FILE)
}

/// Parse a port spec like "6000-6005" or "6000,6010-6012" into a list.
/// Malformed entries are skipped.
pub fn parse_port_range(spec: &str) -> Vec<u16> {
    let mut ports = Vec::new();
    for part in spec.split(',') {
        let part = part.trim();
        if let Some((start, end)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start.parse::<u16>(), end.parse::<u16>()) {
                ports.extend(start..=end);
            }
        } else if let Ok(port) = part.parse::<u16>() {
            ports.push(port);
        }
    }
    ports
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, serde_json::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
}
