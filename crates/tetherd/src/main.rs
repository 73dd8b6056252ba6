//! tetherd — Tether fleet orchestration daemon.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, Semaphore};

use tether_core::config::{parse_port_range, registry_path, routes_path};
use tether_services::{discovery, sync, ActivityLog, ChangeSignal, RegistryStore, RouteStore};

mod console;
mod handler;
mod listener;

use handler::{CommandContext, ShutdownKind};

/// Exit code telling the supervisor to restart the daemon.
/// Used by `/reset` and by the catastrophic-fault path.
const RESTART_EXIT_CODE: i32 = 75;

/// Delay before a fault-triggered restart, so a crash loop cannot spin hot.
const RESTART_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("tetherd starting");

    // Shared state. The change signal is shared by the registry and the
    // activity log; displays subscribe to it instead of polling.
    let signal = ChangeSignal::new();
    let registry = RegistryStore::open(registry_path(), signal.clone()).await?;
    let routes = RouteStore::open(routes_path()).await?;
    let activity = ActivityLog::new(signal.clone());

    let doc = registry.doc_snapshot().await;
    tracing::info!(
        orchestrator_uuid = %doc.orchestrator_uuid,
        known_ports = %doc.known_ports,
        command_ports = %doc.command_ports,
        data_port_range = %doc.data_port_range,
        "configuration loaded"
    );

    let (shutdown_tx, mut shutdown_rx) = mpsc::unbounded_channel::<ShutdownKind>();

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(ShutdownKind::Exit);
        });
    }

    let ctx = CommandContext {
        registry: registry.clone(),
        routes: routes.clone(),
        activity: activity.clone(),
        signal: signal.clone(),
        shutdown: shutdown_tx.clone(),
    };

    // One permit pool across every listener: a connection storm queues at
    // the accept loop instead of spawning workers without bound.
    let workers = Arc::new(Semaphore::new(doc.max_workers));

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    // Ports are bound here, not in the accept loops: a port that fails to
    // bind (the command and data ranges may overlap) is logged and left out
    // of service while every listener that did bind keeps serving.
    let mut listener_tasks = Vec::new();
    for port in parse_port_range(&doc.command_ports) {
        match listener::bind_reuse(port) {
            Ok(l) => listener_tasks.push(tokio::spawn(listener::control_listener(
                l,
                port,
                ctx.clone(),
                workers.clone(),
            ))),
            Err(e) => tracing::warn!(port, error = %e, "command port unavailable, continuing without it"),
        }
    }
    for port in parse_port_range(&doc.data_port_range) {
        match listener::bind_reuse(port) {
            Ok(l) => listener_tasks.push(tokio::spawn(listener::data_listener(
                l,
                port,
                ctx.clone(),
                workers.clone(),
            ))),
            Err(e) => tracing::warn!(port, error = %e, "data port unavailable, continuing without it"),
        }
    }

    let scan_task = tokio::spawn(discovery::scan_loop(registry.clone(), activity.clone()));
    let sync_task = tokio::spawn(sync::sync_loop(registry.clone(), routes.clone()));

    // The REPL ends quietly on stdin EOF; only an explicit `/exit` tears the
    // daemon down, via the shutdown channel.
    let _console_task = tokio::spawn(console::repl(ctx));

    // ── Wait for exit ────────────────────────────────────────────────────────

    let kind = tokio::select! {
        kind = shutdown_rx.recv() => kind.unwrap_or(ShutdownKind::Exit),
        r = first_listener_exit(listener_tasks) => {
            tracing::error!("listener task exited: {:?}", r);
            catastrophic().await
        }
        r = scan_task => {
            tracing::error!("discovery loop exited: {:?}", r);
            catastrophic().await
        }
        r = sync_task => {
            tracing::error!("synchronizer loop exited: {:?}", r);
            catastrophic().await
        }
    };

    match kind {
        ShutdownKind::Exit => {
            tracing::info!("tetherd shutting down");
            Ok(())
        }
        ShutdownKind::Restart => {
            tracing::warn!(code = RESTART_EXIT_CODE, "requesting supervised restart");
            std::process::exit(RESTART_EXIT_CODE);
        }
    }
}

/// Wait for the first listener task to finish (they never should).
async fn first_listener_exit(
    tasks: Vec<tokio::task::JoinHandle<Result<()>>>,
) -> Result<Result<()>, tokio::task::JoinError> {
    if tasks.is_empty() {
        // nothing to watch — park forever
        std::future::pending::<()>().await;
    }
    let (result, _, _) = futures::future::select_all(tasks).await;
    result
}

/// A top-level task died. Log, wait, and request a full restart — there is
/// no graceful degrade for a dead listener.
async fn catastrophic() -> ShutdownKind {
    tracing::error!(delay_secs = RESTART_DELAY.as_secs(), "fatal fault, restarting");
    tokio::time::sleep(RESTART_DELAY).await;
    ShutdownKind::Restart
}
