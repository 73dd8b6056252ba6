//! Route table store.
//!
//! Exclusive owner of the route collection. Same discipline as the registry
//! store: mutate under the lock, rewrite the whole file before releasing it.
//! The cached endpoint ports are repaired by the synchronizer and refreshed
//! on every successful forward.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use tether_core::config::ConfigError;
use tether_core::model::epoch_secs;
use tether_core::{Peripheral, Route};

/// Shared handle to the route table. Cheap to clone.
#[derive(Clone)]
pub struct RouteStore {
    routes: Arc<Mutex<Vec<Route>>>,
    path: PathBuf,
}

/// Route management failures, reported verbatim on the command channel.
#[derive(Debug, PartialEq, Eq)]
pub enum RouteOpError {
    NameExists(String),
    NotFound(String),
}

impl std::fmt::Display for RouteOpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteOpError::NameExists(name) => write!(f, "Route '{name}' already exists."),
            RouteOpError::NotFound(name) => write!(f, "Route '{name}' not found."),
        }
    }
}

impl std::error::Error for RouteOpError {}

impl RouteStore {
    /// Open the route table at `path`. Missing or invalid files start empty.
    pub async fn open(path: PathBuf) -> Result<Self, ConfigError> {
        let routes = match tokio::fs::read_to_string(&path).await {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "invalid routes file, starting empty");
                Vec::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(ConfigError::ReadFailed(path, e)),
        };
        let store = Self {
            routes: Arc::new(Mutex::new(routes)),
            path,
        };
        store.persist().await?;
        Ok(store)
    }

    /// Rewrite the whole backing file from memory.
    pub async fn persist(&self) -> Result<(), ConfigError> {
        let routes = self.routes.lock().await;
        self.write_routes(&routes).await
    }

    async fn write_routes(&self, routes: &[Route]) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(routes).expect("routes serialize");
        tokio::fs::write(&self.path, text)
            .await
            .map_err(|e| ConfigError::WriteFailed(self.path.clone(), e))
    }

    /// Re-read the backing file so external edits take effect without a
    /// restart. Called at the start of every forward. The read happens under
    /// the collection lock so it cannot interleave with a writer's rewrite
    /// and swap a stale snapshot over a committed mutation. A file that no
    /// longer parses keeps the cached table rather than emptying it.
    pub async fn reload(&self) -> Result<(), ConfigError> {
        let mut routes = self.routes.lock().await;
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                routes.clear();
                return Ok(());
            }
            Err(e) => return Err(ConfigError::ReadFailed(self.path.clone(), e)),
        };
        match serde_json::from_str(&text) {
            Ok(fresh) => *routes = fresh,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "invalid routes file on reload, keeping cached table");
            }
        }
        Ok(())
    }

    /// Add a route binding `source` → `destination`, caching their ports.
    pub async fn add(
        &self,
        name: &str,
        source: &Peripheral,
        destination: &Peripheral,
    ) -> Result<(), anyhow::Error> {
        let mut routes = self.routes.lock().await;
        if routes.iter().any(|r| r.name == name) {
            return Err(RouteOpError::NameExists(name.to_string()).into());
        }
        routes.push(Route {
            name: name.to_string(),
            source: source.uuid.clone(),
            destination: destination.uuid.clone(),
            source_port: source.port,
            destination_port: destination.port,
            last_used: None,
        });
        self.write_routes(&routes).await?;
        Ok(())
    }

    /// Rebind an existing route's endpoints, refreshing the cached ports.
    pub async fn edit(
        &self,
        name: &str,
        source: &Peripheral,
        destination: &Peripheral,
    ) -> Result<(), anyhow::Error> {
        let mut routes = self.routes.lock().await;
        let route = routes
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or_else(|| RouteOpError::NotFound(name.to_string()))?;
        route.source = source.uuid.clone();
        route.destination = destination.uuid.clone();
        route.source_port = source.port;
        route.destination_port = destination.port;
        self.write_routes(&routes).await?;
        Ok(())
    }

    /// Remove a route by name.
    pub async fn remove(&self, name: &str) -> Result<(), anyhow::Error> {
        let mut routes = self.routes.lock().await;
        let before = routes.len();
        routes.retain(|r| r.name != name);
        if routes.len() == before {
            return Err(RouteOpError::NotFound(name.to_string()).into());
        }
        self.write_routes(&routes).await?;
        Ok(())
    }

    /// Snapshot of all routes.
    pub async fn list(&self) -> Vec<Route> {
        self.routes.lock().await.clone()
    }

    /// Routes whose source is `uuid`.
    pub async fn matching_source(&self, uuid: &str) -> Vec<Route> {
        self.routes
            .lock()
            .await
            .iter()
            .filter(|r| r.source == uuid)
            .cloned()
            .collect()
    }

    /// Stamp a route's last-used time after a successful forward and persist.
    pub async fn stamp_last_used(&self, name: &str) -> Result<(), ConfigError> {
        let mut routes = self.routes.lock().await;
        if let Some(route) = routes.iter_mut().find(|r| r.name == name) {
            route.last_used = Some(epoch_secs());
            self.write_routes(&routes).await?;
        }
        Ok(())
    }

    /// Repair cached ports against the registry's UUID→port map.
    /// Persists and returns true only when something diverged.
    pub async fn sync_ports(&self, ports: &HashMap<String, u16>) -> Result<bool, ConfigError> {
        let mut routes = self.routes.lock().await;
        let mut updated = false;
        for route in routes.iter_mut() {
            if let Some(&port) = ports.get(&route.source) {
                if route.source_port != port {
                    route.source_port = port;
                    updated = true;
                }
            }
            if let Some(&port) = ports.get(&route.destination) {
                if route.destination_port != port {
                    route.destination_port = port;
                    updated = true;
                }
            }
        }
        if updated {
            self.write_routes(&routes).await?;
        }
        Ok(updated)
    }

    /// Delete the backing file and clear memory. Used by `/reset`.
    pub async fn clear_and_delete(&self) -> Result<(), ConfigError> {
        let mut routes = self.routes.lock().await;
        routes.clear();
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ConfigError::WriteFailed(self.path.clone(), e)),
        }
    }
}
