//! Whitelisting multiplexing proxy.
//!
//! One listening port serves three kinds of requests:
//! - HTTP CONNECT, resolved under `conn://host:port` and spliced into a raw
//!   TCP tunnel to the resolved upstream
//! - Absolute-URI HTTP requests, resolved under `http://host:port` and
//!   forwarded with their authority rewritten
//! - The loopback-only reload endpoint, which re-reads the rules file
//!
//! Anything the whitelist does not match is refused with `503`.
//!
//! # Architecture
//!
//! ```text
//!   client ──CONNECT chain-x:30303──▶ ┌──────────┐ ──TCP──▶ localhost:30308
//!                                     │ chainmux │
//!   client ──GET http://a.b/foo─────▶ │  :5978   │ ──HTTP─▶ c.d:8080/foo
//!                                     └────┬─────┘
//!                                          │ snapshot per request
//!                                     ┌────▼─────┐
//!                                     │RuleStore │◀── reload (loopback / SIGHUP)
//!                                     └──────────┘
//! ```

mod connect;
mod error;
mod forward;
mod reload;
mod response;
mod server;

pub use connect::{dial, dial_target, splice, SpliceOutcome, DIAL_TIMEOUT};
pub use error::{ProxyError, ProxyResult};
pub use forward::{forward_key, rewrite_uri, upstream_authority, DEFAULT_HTTP_PORT};
pub use reload::{ReloadTrigger, RELOAD_PATH};
pub use response::{empty_response, text_response, ProxyBody};
pub use server::{ProxyConfig, ProxyServer, ProxyServerBuilder, DEFAULT_LISTEN_ADDR};
