//! Loopback-only whitelist reload endpoint.
//!
//! A request whose target is exactly `http://localhost:<port>/chainmux/reconf`
//! (compared case-insensitively, `<port>` being the port the proxy listens
//! on) and which comes from a loopback peer re-reads the rules file. The
//! same target from any other peer is treated as an ordinary forward.

use super::error::{ProxyError, ProxyResult};
use super::response::{text_response, ProxyBody};
use super::server::ProxyState;
use crate::telemetry::AuditEvent;
use hyper::{Response, StatusCode, Uri};
use std::net::{IpAddr, SocketAddr};
use tracing::{info, warn};

/// Path of the reload endpoint.
pub const RELOAD_PATH: &str = "/chainmux/reconf";

/// Recognizes reload requests.
#[derive(Debug, Clone)]
pub struct ReloadTrigger {
    endpoint: String,
}

impl ReloadTrigger {
    /// Trigger for a proxy listening on `port`.
    pub fn new(port: u16) -> Self {
        Self {
            endpoint: format!("http://localhost:{}{}", port, RELOAD_PATH),
        }
    }

    /// Whether a request for `uri` from `peer` asks for a reload.
    pub fn matches(&self, uri: &Uri, peer: SocketAddr) -> bool {
        is_loopback(peer.ip()) && uri.to_string().eq_ignore_ascii_case(&self.endpoint)
    }
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => {
            v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback())
        }
    }
}

/// Re-read the rules file and swap the table in.
///
/// On failure the previous table stays active.
pub(crate) async fn handle_reload(state: &ProxyState) -> ProxyResult<Response<ProxyBody>> {
    info!("reloading rewrite conf file");

    match state.rules.reload().await {
        Ok(rules) => {
            state.audit.log(AuditEvent::RulesReload { rules });
            Ok(text_response(StatusCode::OK, format!("reloaded {} rules", rules)))
        }
        Err(e) => {
            warn!("Reload failed, keeping previous rules: {}", e);
            state.audit.log(AuditEvent::RulesReloadFailed {
                reason: e.to_string(),
            });
            Err(ProxyError::Reload(e))
        }
    }
}
