//! chainmux: HTTP-CONNECT based, whitelisted and rewritable HTTP & TCP proxy
//!
//! A single listening port multiplexes raw TCP tunnels (via `CONNECT`) and
//! plain HTTP forwarding. Every request is checked against an ordered
//! whitelist of glob patterns; a matching rule either lets the request
//! through unchanged or rewrites its destination. Anything unmatched is
//! refused.
//!
//! # Security Model
//!
//! The proxy is **fail-closed**: an empty or missing whitelist denies
//! everything. The whitelist can be reloaded at runtime, but only from the
//! loopback interface or by signal.
//!
//! # Architecture
//!
//! - **Rules**: Whitelist parsing, first-match resolution, atomic hot reload
//! - **Proxy**: hyper-based server with CONNECT tunneling and HTTP forwarding
//! - **Telemetry**: Structured audit events to `tracing` or syslog
//! - **CLI**: Command-line and environment configuration

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod cli;
pub mod proxy;
pub mod rules;
pub mod telemetry;
