//! Tether line protocol — textual, `\n`-delimited, case-sensitive.
//!
//! Commands are `/`-prefixed lines arriving on a control connection or the
//! console. Discovery speaks the same framing: the orchestrator sends
//! [`PROBE_TOKEN`] and the peripheral answers with at least three lines
//! (name, UUID, config), terminated by connection close or
//! [`RESPONSE_END_MARKER`].

use thiserror::Error;

/// Fixed token sent to a candidate port during a discovery probe.
pub const PROBE_TOKEN: &str = "/info";

/// Literal end-of-response marker a peripheral may append to its probe reply
/// instead of closing the connection.
pub const RESPONSE_END_MARKER: &str = "EOF";

/// Registration acknowledgment prefix. Full reply: `/ack <data_port>`.
pub const ACK_PREFIX: &str = "/ack";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid data command format.")]
    BadDataFormat,
    #[error("Invalid register command format.")]
    BadRegisterFormat,
    #[error("Port must be an integer.")]
    PortNotInteger,
    #[error("Usage: /remove <uuid>")]
    BadRemoveFormat,
    #[error("Invalid routes command. Type '/routes help' for usage.")]
    BadRoutesFormat,
    #[error("Usage: /routes add <route-name> <source-peripheral> <destination-peripheral>")]
    BadRoutesAdd,
    #[error("Usage: /routes edit <route-name> <source-peripheral> <destination-peripheral>")]
    BadRoutesEdit,
    #[error("Usage: /routes remove <route-name>")]
    BadRoutesRemove,
    #[error("Unknown routes command. Type '/routes help' for usage.")]
    UnknownRoutesAction,
    #[error("Unknown command. Type '/help' for available commands.")]
    UnknownCommand,
    #[error("Incomplete probe response. Expected at least 3 lines.")]
    ShortProbeResponse,
    #[error("Invalid UUID format in probe response.")]
    BadProbeUuid,
}

/// A parsed control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/data <uuid> <payload>` — inbound peripheral data for routing.
    Data { uuid: String, payload: String },
    /// `/register <name> <uuid> <port>` — explicit self-announcement.
    Register {
        name: String,
        uuid: String,
        port: u16,
    },
    /// `/help`
    Help,
    /// `/list` or `/available`
    List,
    /// `/routes <action> ...`
    Routes(RoutesAction),
    /// `/remove <uuid>` — drop one peripheral from the registry.
    Remove { uuid: String },
    /// `/reset` — wipe state files and request a restart. Ungated here.
    Reset,
    /// `/exit` — channel-dependent: ends the session or the process.
    Exit,
}

/// `/routes` subcommands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutesAction {
    Help,
    Add {
        name: String,
        source: String,
        destination: String,
    },
    Edit {
        name: String,
        source: String,
        destination: String,
    },
    Remove { name: String },
    Info,
}

impl Command {
    /// Parse one trimmed command line. The error variant carries the exact
    /// response text to send back on the originating channel.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        if line.starts_with("/data") {
            // `/data <uuid> <payload>` — payload keeps its internal spaces.
            let mut tokens = line.splitn(3, ' ');
            tokens.next();
            match (tokens.next(), tokens.next()) {
                (Some(uuid), Some(payload)) if !uuid.is_empty() => Ok(Command::Data {
                    uuid: uuid.to_string(),
                    payload: payload.to_string(),
                }),
                _ => Err(ProtocolError::BadDataFormat),
            }
        } else if line.starts_with("/register") {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != 4 {
                return Err(ProtocolError::BadRegisterFormat);
            }
            let port: u16 = tokens[3]
                .parse()
                .map_err(|_| ProtocolError::PortNotInteger)?;
            Ok(Command::Register {
                name: tokens[1].to_string(),
                uuid: tokens[2].to_string(),
                port,
            })
        } else if line == "/help" {
            Ok(Command::Help)
        } else if line == "/list" || line == "/available" {
            Ok(Command::List)
        } else if line.starts_with("/routes") {
            parse_routes(line).map(Command::Routes)
        } else if line.starts_with("/remove") {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != 2 {
                return Err(ProtocolError::BadRemoveFormat);
            }
            Ok(Command::Remove {
                uuid: tokens[1].to_string(),
            })
        } else if line == "/reset" {
            Ok(Command::Reset)
        } else if line == "/exit" {
            Ok(Command::Exit)
        } else {
            Err(ProtocolError::UnknownCommand)
        }
    }
}

fn parse_routes(line: &str) -> Result<RoutesAction, ProtocolError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let action = tokens.get(1).ok_or(ProtocolError::BadRoutesFormat)?;
    match *action {
        "help" => Ok(RoutesAction::Help),
        "info" => Ok(RoutesAction::Info),
        "add" => {
            if tokens.len() != 5 {
                return Err(ProtocolError::BadRoutesAdd);
            }
            Ok(RoutesAction::Add {
                name: tokens[2].to_string(),
                source: tokens[3].to_string(),
                destination: tokens[4].to_string(),
            })
        }
        "edit" => {
            if tokens.len() != 5 {
                return Err(ProtocolError::BadRoutesEdit);
            }
            Ok(RoutesAction::Edit {
                name: tokens[2].to_string(),
                source: tokens[3].to_string(),
                destination: tokens[4].to_string(),
            })
        }
        "remove" => {
            if tokens.len() != 3 {
                return Err(ProtocolError::BadRoutesRemove);
            }
            Ok(RoutesAction::Remove {
                name: tokens[2].to_string(),
            })
        }
        _ => Err(ProtocolError::UnknownRoutesAction),
    }
}

/// Shape check for self-reported peripheral UUIDs: exactly 36 characters,
/// hex digits and dashes only. Deliberately looser than RFC 4122 parsing —
/// the original fleet accepts any dash placement.
pub fn is_uuid_shaped(s: &str) -> bool {
    s.len() == 36 && s.bytes().all(|b| b.is_ascii_hexdigit() || b == b'-')
}

/// A parsed discovery probe reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub name: String,
    pub uuid: String,
    pub config: String,
}

/// Parse the accumulated probe reply text.
///
/// Layout: line 1 name, line 2 UUID (shape-checked — a bad UUID discards the
/// whole response), lines 3..N opaque config. A trailing end-of-response
/// marker line is stripped before validation.
pub fn parse_probe_response(text: &str) -> Result<ProbeResponse, ProtocolError> {
    let mut lines: Vec<&str> = text.trim().lines().map(str::trim).collect();
    if lines.last() == Some(&RESPONSE_END_MARKER) {
        lines.pop();
    }
    if lines.len() < 3 {
        return Err(ProtocolError::ShortProbeResponse);
    }
    let name = lines[0].to_string();
    let uuid = lines[1].to_string();
    if !is_uuid_shaped(&uuid) {
        return Err(ProtocolError::BadProbeUuid);
    }
    Ok(ProbeResponse {
        name,
        uuid,
        config: lines[2..].join("\n"),
    })
}

/// Static `/help` response.
pub fn help_text() -> &'static str {
    "Available commands:\n\
     /help - Show this help message\n\
     /list or /available - List known peripherals\n\
     /register <name> <uuid> <port> - Register a peripheral\n\
     /data <uuid> <payload> - Submit a data line for routing\n\
     /routes - Manage routes ('/routes help' for usage)\n\
     /remove <uuid> - Remove a peripheral from the registry\n\
     /reset - Delete state files and restart the orchestrator\n\
     /exit - Exit the session or the orchestrator"
}

/// Static `/routes help` response.
pub fn routes_help_text() -> &'static str {
    "Routes command usage:\n\
     /routes add <route-name> <source-peripheral> <destination-peripheral> - Add a new route\n\
     /routes edit <route-name> <source-peripheral> <destination-peripheral> - Rebind a route\n\
     /routes remove <route-name> - Remove an existing route\n\
     /routes info - List all routes\n\
     /routes help - Show this help message"
}
