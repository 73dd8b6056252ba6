//! Connection listeners — control ports and data ports.
//!
//! One TCP acceptor per configured port, address-reuse enabled. Ports are
//! bound by the caller before the accept loops are spawned: a port that
//! fails to bind (already taken, including by our own other listener kind)
//! is logged and left out of service, it never takes the daemon down. Each
//! accepted connection runs on its own task, bounded by a shared semaphore
//! so a connection storm cannot spawn workers without limit. Reads use a
//! short timeout and loop, so an idle peer never wedges a worker.
//!
//! Control connections feed complete lines to the command handler and get
//! the response written back on the same socket. Data connections use a
//! two-phase handshake: the first line is the peripheral UUID for the
//! connection's lifetime, every later line goes straight to the routing
//! engine tagged with that UUID.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use tether_services::routing;

use crate::handler::{Channel, CommandContext, Disposition};

/// Build a listener with SO_REUSEADDR so restarts rebind immediately.
pub fn bind_reuse(port: u16) -> Result<TcpListener> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
        .context("create listener socket")?;
    socket
        .set_reuse_address(true)
        .context("set SO_REUSEADDR")?;
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    socket
        .bind(&addr.into())
        .with_context(|| format!("bind port {port}"))?;
    socket.listen(128).context("listen")?;
    socket.set_nonblocking(true).context("set nonblocking")?;
    TcpListener::from_std(socket.into()).context("convert to tokio listener")
}

/// Accept loop for one pre-bound control port.
/// Runs forever; cancel by dropping the task handle.
pub async fn control_listener(
    listener: TcpListener,
    port: u16,
    ctx: CommandContext,
    workers: Arc<Semaphore>,
) -> Result<()> {
    tracing::info!(port, "command listener started");
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(port, error = %e, "accept failed on command port");
                continue;
            }
        };
        tracing::debug!(port, peer = %addr, "control connection accepted");
        let permit = workers
            .clone()
            .acquire_owned()
            .await
            .context("worker semaphore closed")?;
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = handle_control_conn(stream, ctx).await {
                tracing::warn!(peer = %addr, error = %e, "control connection failed");
            }
        });
    }
}

/// Accept loop for one pre-bound data port.
/// Runs forever; cancel by dropping the task handle.
pub async fn data_listener(
    listener: TcpListener,
    port: u16,
    ctx: CommandContext,
    workers: Arc<Semaphore>,
) -> Result<()> {
    tracing::info!(port, "data listener started");
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(port, error = %e, "accept failed on data port");
                continue;
            }
        };
        tracing::debug!(port, peer = %addr, "data connection accepted");
        let permit = workers
            .clone()
            .acquire_owned()
            .await
            .context("worker semaphore closed")?;
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = handle_data_conn(stream, ctx).await {
                tracing::warn!(peer = %addr, error = %e, "data connection failed");
            }
        });
    }
}

/// Read loop shared by both connection kinds: returns the next complete
/// line, or None when the peer closed. Timeouts just retry the read.
async fn next_line(
    stream: &mut TcpStream,
    buffer: &mut String,
    timeout: Duration,
) -> Result<Option<String>> {
    loop {
        if let Some(idx) = buffer.find('\n') {
            let line = buffer[..idx].trim().to_string();
            buffer.drain(..=idx);
            if line.is_empty() {
                continue;
            }
            return Ok(Some(line));
        }
        let mut chunk = [0u8; 1024];
        match tokio::time::timeout(timeout, stream.read(&mut chunk)).await {
            Ok(Ok(0)) => return Ok(None),
            Ok(Ok(n)) => buffer.push_str(&String::from_utf8_lossy(&chunk[..n])),
            Ok(Err(e)) => return Err(e).context("read from connection"),
            // idle — keep waiting
            Err(_) => continue,
        }
    }
}

async fn handle_control_conn(mut stream: TcpStream, ctx: CommandContext) -> Result<()> {
    let timeout = Duration::from_secs(ctx.registry.doc_snapshot().await.socket_timeout_secs);
    let mut buffer = String::new();
    while let Some(line) = next_line(&mut stream, &mut buffer, timeout).await? {
        let (reply, disposition) = ctx.handle_line(&line, Channel::Control).await;
        if let Some(reply) = reply {
            stream
                .write_all(format!("{reply}\n").as_bytes())
                .await
                .context("write response")?;
        }
        if disposition == Disposition::CloseSession {
            break;
        }
    }
    Ok(())
}

async fn handle_data_conn(mut stream: TcpStream, ctx: CommandContext) -> Result<()> {
    let timeout = Duration::from_secs(ctx.registry.doc_snapshot().await.socket_timeout_secs);
    let mut buffer = String::new();
    let mut peripheral_uuid: Option<String> = None;

    while let Some(line) = next_line(&mut stream, &mut buffer, timeout).await? {
        match &peripheral_uuid {
            // first line names the peripheral for the connection's lifetime
            None => {
                tracing::debug!(uuid = %line, "data connection identified");
                peripheral_uuid = Some(line);
            }
            Some(uuid) => {
                routing::forward(&ctx.registry, &ctx.routes, &ctx.activity, uuid, &line).await;
            }
        }
    }
    Ok(())
}
