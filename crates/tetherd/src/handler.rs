//! Command dispatch — turns parsed protocol lines into registry and route
//! operations. Responses always go back on the channel the command arrived
//! on; channels are never crossed.

use tokio::sync::mpsc;

use tether_core::model::format_epoch;
use tether_core::protocol::{help_text, routes_help_text, Command, RoutesAction};
use tether_services::{routing, ActivityLog, ChangeSignal, RegistryStore, RouteStore};

/// Which kind of channel a command arrived on. `/exit` semantics differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// A TCP control connection.
    Control,
    /// The local console REPL.
    Console,
}

/// Requested daemon teardown. The supervisor distinguishes the two by exit
/// code and restarts only after `Restart`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownKind {
    Exit,
    Restart,
}

/// What the connection worker should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    CloseSession,
}

/// Shared handles every connection worker needs. Cheap to clone.
#[derive(Clone)]
pub struct CommandContext {
    pub registry: RegistryStore,
    pub routes: RouteStore,
    pub activity: ActivityLog,
    pub signal: ChangeSignal,
    pub shutdown: mpsc::UnboundedSender<ShutdownKind>,
}

impl CommandContext {
    /// Handle one command line. Returns the response to write back (if any)
    /// and what the worker should do next.
    pub async fn handle_line(&self, line: &str, channel: Channel) -> (Option<String>, Disposition) {
        let command = match Command::parse(line) {
            Ok(c) => c,
            Err(e) => return (Some(e.to_string()), Disposition::Continue),
        };

        match command {
            Command::Data { uuid, payload } => {
                // No reply on success or miss: a missing route is logged, not reported.
                routing::forward(&self.registry, &self.routes, &self.activity, &uuid, &payload)
                    .await;
                (None, Disposition::Continue)
            }
            Command::Register { name, uuid, port } => {
                match tether_services::registration::register(
                    &self.registry,
                    &self.activity,
                    &name,
                    &uuid,
                    port,
                )
                .await
                {
                    Ok(data_port) => (Some(format!("/ack {data_port}")), Disposition::Continue),
                    Err(e) => (Some(format!("Registration failed: {e}")), Disposition::Continue),
                }
            }
            Command::Help => (Some(help_text().to_string()), Disposition::Continue),
            Command::List => (Some(self.list_peripherals().await), Disposition::Continue),
            Command::Routes(action) => (Some(self.handle_routes(action).await), Disposition::Continue),
            Command::Remove { uuid } => {
                let reply = match self.registry.remove(&uuid).await {
                    Ok(true) => {
                        self.activity.push(format!("Removed peripheral {uuid}"));
                        format!("Peripheral '{uuid}' removed successfully.")
                    }
                    Ok(false) => format!("Peripheral '{uuid}' not found."),
                    Err(e) => format!("Remove failed: {e}"),
                };
                (Some(reply), Disposition::Continue)
            }
            Command::Reset => (Some(self.reset().await), Disposition::CloseSession),
            Command::Exit => match channel {
                Channel::Control => {
                    (Some("Exiting command session.".to_string()), Disposition::CloseSession)
                }
                Channel::Console => {
                    let _ = self.shutdown.send(ShutdownKind::Exit);
                    (Some("Exiting orchestrator.".to_string()), Disposition::CloseSession)
                }
            },
        }
    }

    /// Formatted registry snapshot, 1-indexed.
    async fn list_peripherals(&self) -> String {
        let fleet = self.registry.snapshot().await;
        if fleet.is_empty() {
            return "No peripherals discovered.".to_string();
        }
        let mut out = String::from("Known peripherals:");
        for (idx, p) in fleet.iter().enumerate() {
            out.push_str(&format!(
                "\n{}. {} (UUID: {}, Port: {}, Last Seen: {})",
                idx + 1,
                p.name,
                p.uuid,
                p.port,
                format_epoch(p.last_seen)
            ));
        }
        out
    }

    async fn handle_routes(&self, action: RoutesAction) -> String {
        match action {
            RoutesAction::Help => routes_help_text().to_string(),
            RoutesAction::Info => self.list_routes().await,
            RoutesAction::Add {
                name,
                source,
                destination,
            } => {
                // Lock order: registry reads happen before the route mutation.
                let Some(src) = self.registry.by_name(&source).await else {
                    return format!("Source peripheral '{source}' not found.");
                };
                let Some(dst) = self.registry.by_name(&destination).await else {
                    return format!("Destination peripheral '{destination}' not found.");
                };
                match self.routes.add(&name, &src, &dst).await {
                    Ok(()) => {
                        self.activity.push(format!(
                            "Added route '{name}' from '{}' to '{}'",
                            src.name, dst.name
                        ));
                        format!("Route '{name}' added successfully.")
                    }
                    Err(e) => e.to_string(),
                }
            }
            RoutesAction::Edit {
                name,
                source,
                destination,
            } => {
                let Some(src) = self.registry.by_name(&source).await else {
                    return format!("Source peripheral '{source}' not found.");
                };
                let Some(dst) = self.registry.by_name(&destination).await else {
                    return format!("Destination peripheral '{destination}' not found.");
                };
                match self.routes.edit(&name, &src, &dst).await {
                    Ok(()) => format!("Route '{name}' updated successfully."),
                    Err(e) => e.to_string(),
                }
            }
            RoutesAction::Remove { name } => match self.routes.remove(&name).await {
                Ok(()) => {
                    self.activity.push(format!("Removed route '{name}'"));
                    format!("Route '{name}' removed successfully.")
                }
                Err(e) => e.to_string(),
            },
        }
    }

    async fn list_routes(&self) -> String {
        let routes = self.routes.list().await;
        if routes.is_empty() {
            return "No routes configured.".to_string();
        }
        let mut out = String::from("Configured routes:");
        for route in routes {
            let source_name = self.registry.name_by_uuid(&route.source).await;
            let destination_name = self.registry.name_by_uuid(&route.destination).await;
            let last_used = route
                .last_used
                .map(format_epoch)
                .unwrap_or_else(|| "Never".to_string());
            out.push_str(&format!(
                "\nRoute Name: {}\n  From: {source_name} (UUID: {}, Port: {})\n  To: {destination_name} (UUID: {}, Port: {})\n  Last Used: {last_used}",
                route.name, route.source, route.source_port, route.destination, route.destination_port
            ));
        }
        out
    }

    /// `/reset`: clear the registry, delete both state files, request a
    /// supervised restart. Intentionally ungated at this layer.
    /// Lock order: registry before routes.
    async fn reset(&self) -> String {
        if let Err(e) = self.registry.clear_and_delete().await {
            return format!("Reset failed: {e}");
        }
        if let Err(e) = self.routes.clear_and_delete().await {
            return format!("Reset failed: {e}");
        }
        self.activity.push("State files deleted, restart requested");
        tracing::warn!("reset requested, state cleared, restarting");
        let _ = self.shutdown.send(ShutdownKind::Restart);
        "State files deleted and peripherals cleared. Restarting orchestrator...".to_string()
    }
}
