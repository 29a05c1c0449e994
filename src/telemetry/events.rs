//! Audit event types for structured logging.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Audit events for routing decisions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// CONNECT tunnel established.
    TunnelAllow {
        /// Correlates this event with the matching `TunnelClose`.
        tunnel_id: Uuid,
        /// Authority from the CONNECT request line.
        requested: String,
        /// Address that was dialed.
        upstream: String,
    },

    /// CONNECT request matched no rule.
    TunnelDeny {
        /// Authority from the CONNECT request line.
        requested: String,
    },

    /// CONNECT tunnel torn down.
    TunnelClose {
        /// Tunnel identifier from `TunnelAllow`.
        tunnel_id: Uuid,
        /// Direction whose copy finished first.
        closed_by: Direction,
        /// Bytes that direction copied before finishing.
        bytes: u64,
    },

    /// Forward-proxy request allowed.
    ForwardAllow {
        /// Request target as received.
        requested: String,
        /// Rewritten request target.
        upstream: String,
    },

    /// Forward-proxy request matched no rule.
    ForwardDeny {
        /// Request target as received.
        requested: String,
    },

    /// Whitelist reloaded.
    RulesReload {
        /// Number of rules now in effect.
        rules: usize,
    },

    /// Whitelist reload failed; the previous rules stay in effect.
    RulesReloadFailed {
        /// Why the reload failed.
        reason: String,
    },
}

/// One half of a tunnel's splice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Bytes flowing from the client to the upstream.
    ClientToUpstream,
    /// Bytes flowing from the upstream back to the client.
    UpstreamToClient,
}

/// Wrapper for serializing events with timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct TimestampedEvent<'a> {
    /// ISO8601 timestamp.
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,

    /// The actual event (flattened into this struct).
    #[serde(flatten)]
    pub event: &'a AuditEvent,
}

impl AuditEvent {
    /// Wrap this event with a timestamp for serialization.
    pub fn with_timestamp(&self) -> TimestampedEvent<'_> {
        TimestampedEvent {
            timestamp: Utc::now(),
            event: self,
        }
    }
}
