//! Audit logging for routing decisions.
//!
//! Every allow/deny decision, tunnel closure and whitelist reload is
//! recorded as a structured [`AuditEvent`]. Diagnostic logging stays on
//! plain `tracing` macros; audit events are a separate, stable record.
//!
//! # Event Format
//!
//! Events are logged as JSON with an ISO8601 timestamp:
//!
//! ```json
//! {"ts":"2026-01-07T14:32:01Z","event":"tunnel_allow","tunnel_id":"…","requested":"chain-x:30303","upstream":"localhost:30308"}
//! ```

mod error;
mod events;
mod logger;

pub use error::TelemetryError;
pub use events::{AuditEvent, Direction};
pub use logger::{AuditLogger, AUDIT_TARGET, SYSLOG_TAG};
