//! HTTP CONNECT method handling for raw TCP tunneling.
//!
//! The flow is:
//!
//! 1. Client sends: `CONNECT chain-x:30303 HTTP/1.1`
//! 2. The key `conn://chain-x:30303` is resolved against the whitelist
//! 3. If denied: return `503` naming the requested authority
//! 4. Dial the resolved upstream (bounded by [`DIAL_TIMEOUT`])
//! 5. Return `200` and take over the client connection as a raw stream
//! 6. Splice bytes both ways until either direction finishes
//!
//! The proxy never looks inside the tunnel. When either copy finishes
//! (EOF or error) the whole tunnel is torn down; there is no half-close.

use super::error::{ProxyError, ProxyResult};
use super::response::{empty_response, ProxyBody};
use super::server::ProxyState;
use crate::rules::resolver::{self, CONN_SCHEME};
use crate::telemetry::{AuditEvent, Direction};
use hyper::body::Incoming;
use hyper::upgrade::OnUpgrade;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Timeout for upstream TCP connect.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle HTTP CONNECT request for tunneling.
pub(crate) async fn handle_connect(
    mut req: Request<Incoming>,
    state: &ProxyState,
) -> ProxyResult<Response<ProxyBody>> {
    // Keep the authority exactly as the client wrote it
    let requested = req
        .uri()
        .authority()
        .map(|authority| authority.as_str().to_string())
        .ok_or_else(|| ProxyError::InvalidRequest("Missing authority in CONNECT request".into()))?;

    let key = resolver::conn_key(&requested);
    let Some(resolved) = state.rules.resolve(&key) else {
        info!("CONN: requested {}, not allowed", requested);
        state.audit.log(AuditEvent::TunnelDeny {
            requested: requested.clone(),
        });
        return Err(ProxyError::Denied { requested });
    };

    let upstream_addr = dial_target(&resolved).to_string();
    info!("CONN: requested {}, redirected to: {}", requested, upstream_addr);

    let upstream = dial(&upstream_addr, DIAL_TIMEOUT).await?;

    let on_upgrade = req.extensions_mut().remove::<OnUpgrade>().ok_or_else(|| {
        ProxyError::UpgradeFailed(format!("connection for {} cannot be taken over", requested))
    })?;

    let tunnel_id = Uuid::new_v4();
    state.audit.log(AuditEvent::TunnelAllow {
        tunnel_id,
        requested: requested.clone(),
        upstream: upstream_addr.clone(),
    });

    let audit = state.audit.clone();
    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                let outcome = splice(TokioIo::new(upgraded), upstream).await;
                debug!(
                    "Tunnel {} ({} -> {}) closed by {:?}: {:?}",
                    tunnel_id, requested, upstream_addr, outcome.closed_by, outcome.result
                );
                audit.log(AuditEvent::TunnelClose {
                    tunnel_id,
                    closed_by: outcome.closed_by,
                    bytes: outcome.bytes(),
                });
            }
            Err(e) => {
                // The 200 is already on the wire; dropping upstream closes it
                warn!("HTTP upgrade failed for {}: {}", requested, e);
            }
        }
    });

    // Return 200 to initiate the upgrade
    Ok(empty_response(StatusCode::OK))
}

/// Address to dial for a resolved `conn` value.
///
/// Allow-as-is rules resolve to the `conn://host:port` key itself.
pub fn dial_target(resolved: &str) -> &str {
    resolver::strip_scheme(resolved.trim(), CONN_SCHEME)
}

/// Connect to the upstream, giving up after `timeout`.
pub async fn dial(addr: &str, timeout: Duration) -> ProxyResult<TcpStream> {
    bounded_connect(addr, timeout, TcpStream::connect(addr)).await
}

/// Drive `connect` for at most `timeout`, mapping failures for `addr`.
async fn bounded_connect<S>(
    addr: &str,
    timeout: Duration,
    connect: impl Future<Output = io::Result<S>>,
) -> ProxyResult<S> {
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(stream)) => {
            debug!("Connected to upstream {}", addr);
            Ok(stream)
        }
        Ok(Err(e)) => Err(ProxyError::UpstreamConnect {
            addr: addr.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Err(ProxyError::Timeout {
            addr: addr.to_string(),
        }),
    }
}

/// How a splice ended.
#[derive(Debug)]
pub struct SpliceOutcome {
    /// The copy direction that finished first.
    pub closed_by: Direction,
    /// Bytes copied by that direction, or the error that stopped it.
    pub result: io::Result<u64>,
}

impl SpliceOutcome {
    /// Bytes copied by the finishing direction (0 on error).
    pub fn bytes(&self) -> u64 {
        self.result.as_ref().map(|n| *n).unwrap_or(0)
    }
}

/// Copy bytes both ways between `client` and `upstream`.
///
/// Both copies run concurrently. The first one to finish, by EOF or
/// error, ends the splice: the other copy is dropped mid-flight and both
/// streams are dropped (closed) exactly once when this returns.
pub async fn splice<C, U>(client: C, upstream: U) -> SpliceOutcome
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut upstream_read, mut upstream_write) = tokio::io::split(upstream);

    let client_to_upstream = tokio::io::copy(&mut client_read, &mut upstream_write);
    let upstream_to_client = tokio::io::copy(&mut upstream_read, &mut client_write);

    tokio::select! {
        result = client_to_upstream => SpliceOutcome {
            closed_by: Direction::ClientToUpstream,
            result,
        },
        result = upstream_to_client => SpliceOutcome {
            closed_by: Direction::UpstreamToClient,
            result,
        },
    }
}
