//! tether-ctl — command-line interface for the Tether daemon.
//!
//! Sends one protocol line to a control port and prints the reply:
//!
//!   tether-ctl list
//!   tether-ctl routes add cam-to-disk camera disk
//!   tether-ctl --port 6001 register cam 2b0c81a4-9d1e-4f6a-8c3d-5e7f90a1b2c3 6210

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const DEFAULT_PORT: u16 = 6000;

/// How long to wait for the daemon to finish its reply. The protocol has no
/// end-of-response framing, so the reply ends on close or quiet.
const REPLY_QUIET: Duration = Duration::from_millis(500);

fn usage() -> ! {
    eprintln!("Usage: tether-ctl [--port <port>] <command> [args...]");
    eprintln!();
    eprintln!("Commands are protocol commands without the leading slash:");
    eprintln!("  list                                  known peripherals");
    eprintln!("  routes info                           configured routes");
    eprintln!("  routes add <name> <src> <dst>         add a route");
    eprintln!("  routes remove <name>                  remove a route");
    eprintln!("  register <name> <uuid> <port>         register a peripheral");
    eprintln!("  remove <uuid>                         remove a peripheral");
    eprintln!("  data <uuid> <payload...>              submit a data line");
    eprintln!("  reset                                 wipe state and restart");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();

    let mut port = DEFAULT_PORT;
    if args.first().map(String::as_str) == Some("--port") {
        if args.len() < 2 {
            usage();
        }
        port = args[1].parse().context("--port takes an integer")?;
        args.drain(..2);
    }
    if args.is_empty() {
        usage();
    }

    let line = format!("/{}", args.join(" "));
    let reply = send_command(port, &line).await?;
    if reply.is_empty() {
        println!("(no reply)");
    } else {
        print!("{reply}");
    }
    Ok(())
}

/// Connect, send the line, collect the reply until close or quiet.
async fn send_command(port: u16, line: &str) -> Result<String> {
    let mut stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .with_context(|| format!("failed to connect to tetherd on port {port} — is it running?"))?;
    stream
        .write_all(format!("{line}\n").as_bytes())
        .await
        .context("failed to send command")?;

    let mut reply = String::new();
    let mut buf = [0u8; 1024];
    loop {
        match tokio::time::timeout(REPLY_QUIET, stream.read(&mut buf)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => reply.push_str(&String::from_utf8_lossy(&buf[..n])),
            Ok(Err(e)) => bail!("read failed: {e}"),
            Err(_) => break, // quiet — reply is complete
        }
    }
    Ok(reply)
}
