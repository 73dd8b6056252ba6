//! Peripheral registry store.
//!
//! Exclusive owner of the registry collection. Every mutation happens under
//! the single registry lock and rewrites the whole backing file before the
//! lock is released. Readers take the same lock; nothing else touches the
//! file except the synchronizer's re-read.
//!
//! Lock order invariant: operations that also touch the route table acquire
//! the registry lock FIRST.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use tether_core::config::{parse_port_range, ConfigError, RegistryDoc};
use tether_core::model::epoch_secs;
use tether_core::protocol::ProbeResponse;
use tether_core::{Peripheral, UNKNOWN_NAME};

use crate::activity::ChangeSignal;

/// Result of a discovery upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// New entry created, possibly under a deduplicated name.
    Added { name: String },
    /// Existing entry refreshed.
    Updated { name: String },
}

/// Shared handle to the registry. Cheap to clone.
#[derive(Clone)]
pub struct RegistryStore {
    doc: Arc<Mutex<RegistryDoc>>,
    path: PathBuf,
    colors: Arc<DashMap<String, u8>>,
    signal: ChangeSignal,
}

impl RegistryStore {
    /// Open the registry at `path`, creating it with defaults if missing.
    ///
    /// An unreadable or structurally invalid file is reset to defaults and
    /// rewritten — state self-heals rather than refusing to start.
    pub async fn open(path: PathBuf, signal: ChangeSignal) -> Result<Self, ConfigError> {
        let mut doc = match tokio::fs::read_to_string(&path).await {
            Ok(text) => match serde_json::from_str::<RegistryDoc>(&text) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "invalid registry file, resetting to defaults");
                    RegistryDoc::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RegistryDoc::default(),
            Err(e) => return Err(ConfigError::ReadFailed(path, e)),
        };
        doc.apply_env_overrides();

        let store = Self {
            doc: Arc::new(Mutex::new(doc)),
            path,
            colors: Arc::new(DashMap::new()),
            signal,
        };
        store.persist().await?;
        store.assign_colors().await;
        Ok(store)
    }

    /// Rewrite the whole backing file from the current in-memory document.
    pub async fn persist(&self) -> Result<(), ConfigError> {
        let doc = self.doc.lock().await;
        self.write_doc(&doc).await
    }

    async fn write_doc(&self, doc: &RegistryDoc) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(doc).expect("registry doc serializes");
        tokio::fs::write(&self.path, text)
            .await
            .map_err(|e| ConfigError::WriteFailed(self.path.clone(), e))
    }

    /// UUID → control-port map read from the backing file, taken under the
    /// lock so it cannot interleave with a rewrite. The in-memory document
    /// is left untouched; out-of-band file edits still surface here. Used by
    /// the synchronizer.
    pub async fn port_map(&self) -> Result<HashMap<String, u16>, ConfigError> {
        let doc = self.doc.lock().await;
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(doc
                    .peripherals
                    .iter()
                    .map(|p| (p.uuid.clone(), p.port))
                    .collect())
            }
            Err(e) => return Err(ConfigError::ReadFailed(self.path.clone(), e)),
        };
        let on_disk = serde_json::from_str::<RegistryDoc>(&text)
            .map_err(|e| ConfigError::ParseFailed(self.path.clone(), e))?;
        Ok(on_disk
            .peripherals
            .into_iter()
            .map(|p| (p.uuid, p.port))
            .collect())
    }

    /// Snapshot of the tunables and identity (not the fleet).
    pub async fn doc_snapshot(&self) -> RegistryDoc {
        self.doc.lock().await.clone()
    }

    /// Snapshot of the fleet, in insertion order.
    pub async fn snapshot(&self) -> Vec<Peripheral> {
        self.doc.lock().await.peripherals.clone()
    }

    pub async fn len(&self) -> usize {
        self.doc.lock().await.peripherals.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Upsert from a discovery probe reply seen on `port`.
    ///
    /// New UUIDs get an entry under a collision-suffixed name; known UUIDs
    /// keep their deduplicated name and refresh port, config, and last-seen.
    /// The last-seen stamp is kept strictly monotonic so repeated probes
    /// within one second still advance it.
    pub async fn upsert_discovered(
        &self,
        resp: &ProbeResponse,
        port: u16,
    ) -> Result<UpsertOutcome, ConfigError> {
        let outcome;
        {
            let mut doc = self.doc.lock().await;
            if let Some(existing) = doc.peripherals.iter_mut().find(|p| p.uuid == resp.uuid) {
                existing.port = port;
                existing.config = resp.config.clone();
                existing.last_seen = epoch_secs().max(existing.last_seen + 1);
                outcome = UpsertOutcome::Updated {
                    name: existing.name.clone(),
                };
            } else {
                let same_name = doc
                    .peripherals
                    .iter()
                    .filter(|p| {
                        p.name == resp.name || p.name.starts_with(&format!("{}_", resp.name))
                    })
                    .count();
                let name = if same_name > 0 {
                    format!("{}_{}", resp.name, same_name + 1)
                } else {
                    resp.name.clone()
                };
                doc.peripherals.push(Peripheral {
                    name: name.clone(),
                    uuid: resp.uuid.clone(),
                    config: resp.config.clone(),
                    port,
                    data_port: None,
                    last_seen: epoch_secs(),
                });
                outcome = UpsertOutcome::Added { name };
            }
            self.write_doc(&doc).await?;
        }
        self.assign_colors().await;
        self.signal.notify();
        Ok(outcome)
    }

    /// Upsert from an explicit `/register`, replacing all fields.
    ///
    /// The data port is drawn from `data_port_range` by indexing with the
    /// current registry size — round-robin with no liveness check. Duplicate
    /// assignment after removals is a documented limitation, kept verbatim.
    pub async fn upsert_registered(
        &self,
        name: &str,
        uuid: &str,
        control_port: u16,
    ) -> Result<u16, ConfigError> {
        let data_port;
        {
            let mut doc = self.doc.lock().await;
            let data_ports = parse_port_range(&doc.data_port_range);
            if data_ports.is_empty() {
                return Err(ConfigError::WriteFailed(
                    self.path.clone(),
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "data_port_range is empty",
                    ),
                ));
            }
            data_port = data_ports[doc.peripherals.len() % data_ports.len()];
            let fresh = Peripheral {
                name: name.to_string(),
                uuid: uuid.to_string(),
                config: String::new(),
                port: control_port,
                data_port: Some(data_port),
                last_seen: epoch_secs(),
            };
            if let Some(existing) = doc.peripherals.iter_mut().find(|p| p.uuid == uuid) {
                *existing = fresh;
            } else {
                doc.peripherals.push(fresh);
            }
            self.write_doc(&doc).await?;
        }
        self.assign_colors().await;
        self.signal.notify();
        Ok(data_port)
    }

    /// Remove one peripheral by UUID. Returns false if it was not present.
    pub async fn remove(&self, uuid: &str) -> Result<bool, ConfigError> {
        let removed;
        {
            let mut doc = self.doc.lock().await;
            let before = doc.peripherals.len();
            doc.peripherals.retain(|p| p.uuid != uuid);
            removed = doc.peripherals.len() != before;
            if removed {
                self.write_doc(&doc).await?;
            }
        }
        if removed {
            self.signal.notify();
        }
        Ok(removed)
    }

    /// Clear the fleet and delete the backing file. Used by `/reset`.
    pub async fn clear_and_delete(&self) -> Result<(), ConfigError> {
        let mut doc = self.doc.lock().await;
        doc.peripherals.clear();
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ConfigError::WriteFailed(self.path.clone(), e)),
        }
    }

    /// Display name for a UUID, degrading to "Unknown" for removed peripherals.
    pub async fn name_by_uuid(&self, uuid: &str) -> String {
        self.doc
            .lock()
            .await
            .peripherals
            .iter()
            .find(|p| p.uuid == uuid)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| UNKNOWN_NAME.to_string())
    }

    pub async fn by_name(&self, name: &str) -> Option<Peripheral> {
        self.doc
            .lock()
            .await
            .peripherals
            .iter()
            .find(|p| p.name == name)
            .cloned()
    }

    pub async fn by_port(&self, port: u16) -> Option<Peripheral> {
        self.doc
            .lock()
            .await
            .peripherals
            .iter()
            .find(|p| p.port == port)
            .cloned()
    }

    /// Cosmetic name-stem → color index (1–6) grouping for the display layer.
    pub fn color_of(&self, stem: &str) -> Option<u8> {
        self.colors.get(stem).map(|c| *c)
    }

    async fn assign_colors(&self) {
        let doc = self.doc.lock().await;
        let mut stems: Vec<&str> = Vec::new();
        for p in &doc.peripherals {
            let stem = p.name_stem();
            if !stems.contains(&stem) {
                stems.push(stem);
            }
        }
        for (idx, stem) in stems.iter().enumerate() {
            self.colors.insert(stem.to_string(), (idx % 6) as u8 + 1);
        }
    }
}
