//! Registry and route table data model.
//!
//! Both collections are persisted as whole-file JSON snapshots. The fields
//! here ARE the on-disk format — renaming one is a breaking change for
//! existing state files.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Placeholder name reported for a route endpoint whose peripheral has been
/// removed from the registry. Lookups degrade to this rather than failing.
pub const UNKNOWN_NAME: &str = "Unknown";

/// A discovered or self-registered network peripheral.
///
/// Identity is the self-reported UUID and is immutable; the display name is
/// unique only after collision suffixing (`name_N`). At most one registry
/// entry exists per UUID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peripheral {
    /// Display name, unique post-dedup.
    pub name: String,

    /// Self-reported identity. 36 chars, hex-with-dashes.
    pub uuid: String,

    /// Opaque config text reported by the peripheral (probe lines 3..N).
    #[serde(default)]
    pub config: String,

    /// Control port the peripheral answers commands on.
    pub port: u16,

    /// Data port assigned at registration. Absent for peripherals that were
    /// only ever seen by passive discovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_port: Option<u16>,

    /// Unix seconds of the last successful probe or registration.
    pub last_seen: u64,
}

impl Peripheral {
    /// Name stem used for cosmetic grouping: everything before the first `_`.
    pub fn name_stem(&self) -> &str {
        self.name.split('_').next().unwrap_or(&self.name)
    }
}

/// A named directed binding from a source peripheral to a destination.
///
/// The embedded ports are a cache of the referenced peripherals' current
/// ports and may go stale between reconciliation passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Unique route name.
    pub name: String,

    /// Source peripheral UUID.
    pub source: String,

    /// Destination peripheral UUID.
    pub destination: String,

    /// Cached control port of the source peripheral.
    pub source_port: u16,

    /// Cached control port of the destination peripheral.
    pub destination_port: u16,

    /// Unix seconds of the last successful forward, absent if never used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<u64>,
}

/// Current wall-clock time as Unix seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Render stored Unix seconds as local wall-clock time for the operator
/// surface. Falls back to the raw number if the value is out of range.
pub fn format_epoch(secs: u64) -> String {
    chrono::DateTime::from_timestamp(secs as i64, 0)
        .map(|t| {
            t.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| secs.to_string())
}
