//! Console REPL — a stdin line loop speaking the same command protocol.
//!
//! The console is its own channel: `/exit` here terminates the daemon,
//! and display redraw signals are suppressed while a command is in flight.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::handler::{Channel, CommandContext, Disposition};

/// Read commands from stdin until EOF or `/exit`.
pub async fn repl(ctx: CommandContext) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        ctx.signal.set_command_session(true);
        let (reply, disposition) = ctx.handle_line(line, Channel::Console).await;
        ctx.signal.set_command_session(false);
        if let Some(reply) = reply {
            println!("{reply}");
        }
        if disposition == Disposition::CloseSession {
            break;
        }
    }
    Ok(())
}
