//! Audit logger and its sinks.
//!
//! By default events go through `tracing` under the [`AUDIT_TARGET`]
//! target, so they share the process log. With `--syslog` they are also
//! written to the local syslog daemon with the [`SYSLOG_TAG`] process tag.

use std::sync::Mutex;

use syslog::{Facility, Formatter3164};
use tracing::{debug, error, info};

use super::error::TelemetryError;
use super::events::AuditEvent;

/// Syslog tag for all audit events.
pub const SYSLOG_TAG: &str = "CHAINMUX";

/// `tracing` target for audit events.
pub const AUDIT_TARGET: &str = "chainmux::audit";

type SyslogWriter = syslog::Logger<syslog::LoggerBackend, Formatter3164>;

enum Sink {
    Tracing,
    Syslog(Mutex<SyslogWriter>),
    Null,
}

/// Audit logger that writes structured JSON events.
///
/// Uses interior mutability (Mutex) for the syslog writer so events can be
/// logged from shared references across connection tasks.
pub struct AuditLogger {
    sink: Sink,
}

impl AuditLogger {
    /// Create an audit logger that emits events through `tracing`.
    pub fn new() -> Self {
        Self { sink: Sink::Tracing }
    }

    /// Create an audit logger connected to the local syslog daemon.
    pub fn syslog() -> Result<Self, TelemetryError> {
        let formatter = Formatter3164 {
            facility: Facility::LOG_DAEMON,
            hostname: None,
            process: SYSLOG_TAG.to_string(),
            pid: std::process::id(),
        };

        let writer = syslog::unix(formatter)
            .map_err(|e| TelemetryError::SyslogConnection(e.to_string()))?;

        debug!("Connected to syslog with tag '{}'", SYSLOG_TAG);
        Ok(Self {
            sink: Sink::Syslog(Mutex::new(writer)),
        })
    }

    /// Create a null audit logger that discards all events.
    ///
    /// Useful for testing.
    pub fn new_null() -> Self {
        Self { sink: Sink::Null }
    }

    /// Log an audit event.
    ///
    /// The event is serialized to JSON with an ISO8601 timestamp. Failures
    /// are reported through `tracing` and otherwise ignored.
    pub fn log(&self, event: AuditEvent) {
        if self.is_null() {
            return;
        }

        let json = match serde_json::to_string(&event.with_timestamp()) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize audit event: {}", TelemetryError::from(e));
                return;
            }
        };

        match &self.sink {
            Sink::Tracing => info!(target: AUDIT_TARGET, "{}", json),
            Sink::Syslog(writer) => {
                match writer.lock() {
                    Ok(mut writer) => {
                        if let Err(e) = writer.info(&json) {
                            error!("Failed to write to syslog: {}", e);
                        }
                    }
                    Err(e) => {
                        error!("Failed to acquire syslog writer lock: {}", e);
                    }
                }
                debug!("Logged audit event: {}", json);
            }
            Sink::Null => {}
        }
    }

    /// Check if this is a null logger.
    pub fn is_null(&self) -> bool {
        matches!(self.sink, Sink::Null)
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}
