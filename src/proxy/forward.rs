//! Plain HTTP forwarding.
//!
//! A proxied request arrives with an absolute-form target
//! (`GET http://a.b/foo HTTP/1.1`). The key `http://host:port` is resolved
//! against the whitelist, the authority of the target is replaced with the
//! resolved one, and the request goes out with method, headers, path, query
//! and body untouched. The upstream response is relayed back as-is with its
//! body streamed.

use super::error::{ProxyError, ProxyResult};
use super::response::ProxyBody;
use super::server::ProxyState;
use crate::rules::resolver::{self, HTTP_SCHEME};
use crate::telemetry::AuditEvent;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::http::uri::{Authority, PathAndQuery, Scheme};
use hyper::{Request, Response, Uri};
use tracing::info;

/// Port assumed when the request target carries none.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Handle a non-CONNECT proxy request.
pub(crate) async fn handle_forward(
    mut req: Request<Incoming>,
    state: &ProxyState,
) -> ProxyResult<Response<ProxyBody>> {
    let requested = req.uri().to_string();
    let key = forward_key(req.uri())?;

    let Some(resolved) = state.rules.resolve(&key) else {
        info!("HTTP: requested {}, not allowed", requested);
        state.audit.log(AuditEvent::ForwardDeny {
            requested: requested.clone(),
        });
        return Err(ProxyError::Denied { requested });
    };

    let authority = upstream_authority(&resolved)?;
    let outbound = rewrite_uri(req.uri(), authority)?;
    info!("HTTP: requested {}, redirected to: {}", requested, outbound);

    state.audit.log(AuditEvent::ForwardAllow {
        requested,
        upstream: outbound.to_string(),
    });
    *req.uri_mut() = outbound;

    let response = state
        .client
        .request(req)
        .await
        .map_err(|e| ProxyError::UpstreamTransport(e.to_string()))?;

    // Status and headers are relayed verbatim, the body is streamed
    Ok(response.map(|body| body.boxed()))
}

/// Canonical whitelist key for a forwarded request target.
///
/// Origin-form targets (`GET /foo`) carry no host and are rejected.
pub fn forward_key(uri: &Uri) -> ProxyResult<String> {
    let host = uri.host().ok_or_else(|| {
        ProxyError::InvalidRequest(format!("{} has no host to proxy to", uri))
    })?;
    let port = uri.port_u16().unwrap_or(DEFAULT_HTTP_PORT);
    Ok(resolver::http_key(host, port))
}

/// Authority to send a forwarded request to.
///
/// Accepts `host:port`, `http://host:port` and `http://host:port/...`; any
/// path on the resolved value is ignored.
pub fn upstream_authority(resolved: &str) -> ProxyResult<Authority> {
    let stripped = resolver::strip_scheme(resolved.trim(), HTTP_SCHEME);
    let authority = stripped.split('/').next().unwrap_or_default();

    authority
        .parse::<Authority>()
        .map_err(|e| ProxyError::InvalidTarget {
            target: resolved.to_string(),
            message: e.to_string(),
        })
}

/// Swap the authority of `uri`, keeping scheme, path and query.
pub fn rewrite_uri(uri: &Uri, authority: Authority) -> ProxyResult<Uri> {
    let scheme = uri.scheme().cloned().unwrap_or(Scheme::HTTP);
    let path_and_query = uri
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));

    Uri::builder()
        .scheme(scheme)
        .authority(authority)
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| ProxyError::InvalidRequest(e.to_string()))
}
