//! HTTP proxy server implementation.
//!
//! This module provides the main proxy server that:
//! - Listens for TCP connections on a single port
//! - Handles HTTP CONNECT by splicing a raw tunnel to the resolved upstream
//! - Forwards absolute-URI HTTP requests to the resolved upstream
//! - Serves the loopback-only whitelist reload endpoint
//!
//! # Architecture
//!
//! The proxy uses hyper's HTTP/1.1 server with upgrade support for CONNECT.
//! Each connection is handled in a separate Tokio task, and every request
//! resolves against a fresh snapshot of the shared [`RuleStore`].
//!
//! # Example
//!
//! ```ignore
//! use chainmux::proxy::ProxyServerBuilder;
//! use chainmux::rules::RuleStore;
//! use std::sync::Arc;
//!
//! let rules = Arc::new(RuleStore::with_source("/etc/chainmux.conf"));
//! rules.reload().await?;
//!
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let server = ProxyServerBuilder::new(rules)
//!     .listen_addr(":5978")
//!     .bind(shutdown_rx)
//!     .await?;
//! server.run().await?;
//!
//! // To shutdown:
//! shutdown_tx.send(true)?;
//! ```

use super::connect::handle_connect;
use super::error::ProxyError;
use super::forward::handle_forward;
use super::reload::{handle_reload, ReloadTrigger};
use super::response::ProxyBody;
use crate::rules::RuleStore;
use crate::telemetry::AuditLogger;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Default listening address.
pub const DEFAULT_LISTEN_ADDR: &str = ":5978";

/// Configuration for the proxy server.
#[derive(Clone)]
pub struct ProxyConfig {
    /// Address to listen on, `[host]:port`. An empty host binds all
    /// interfaces.
    pub listen_addr: String,
    /// Shared whitelist.
    pub rules: Arc<RuleStore>,
    /// Reference to the audit logger.
    pub audit: Arc<AuditLogger>,
}

/// State shared by every connection task.
pub(crate) struct ProxyState {
    pub(crate) rules: Arc<RuleStore>,
    pub(crate) client: Client<HttpConnector, Incoming>,
    pub(crate) reload: ReloadTrigger,
    pub(crate) audit: Arc<AuditLogger>,
}

/// The main proxy server.
pub struct ProxyServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: Arc<ProxyState>,
    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,
}

impl ProxyServer {
    /// Bind the listening socket.
    ///
    /// # Arguments
    ///
    /// * `config` - Proxy configuration.
    /// * `shutdown_rx` - Receiver for shutdown signal.
    pub async fn bind(
        config: ProxyConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Self, ProxyError> {
        let addr = bind_target(&config.listen_addr);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ProxyError::Bind {
                addr: addr.clone(),
                source: e,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ProxyError::Bind { addr, source: e })?;

        // Requests are relayed one-shot; idle upstream connections are not kept
        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .build_http();

        let state = Arc::new(ProxyState {
            rules: config.rules,
            client,
            reload: ReloadTrigger::new(local_addr.port()),
            audit: config.audit,
        });

        Ok(Self {
            listener,
            local_addr,
            state,
            shutdown_rx,
        })
    }

    /// Address the server is actually listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get a reference to the shared whitelist.
    pub fn rules(&self) -> Arc<RuleStore> {
        self.state.rules.clone()
    }

    /// Run the accept loop.
    ///
    /// Returns when the shutdown signal is received. Connections already
    /// accepted keep running until they close on their own.
    pub async fn run(self) -> Result<(), ProxyError> {
        info!("Proxy listening on {}", self.local_addr);

        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            debug!("Accepted connection from {}", peer);
                            self.spawn_connection_handler(stream, peer);
                        }
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Proxy shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Spawn a task to handle a single connection.
    fn spawn_connection_handler(&self, stream: TcpStream, peer: SocketAddr) {
        let state = self.state.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, state).await {
                // Don't log connection resets as errors - they're common
                let err_str = e.to_string();
                if err_str.contains("connection reset")
                    || err_str.contains("broken pipe")
                    || err_str.contains("Connection reset")
                {
                    debug!("Connection from {} ended: {}", peer, e);
                } else {
                    warn!("Connection error from {}: {}", peer, e);
                }
            }
        });
    }
}

/// Handle a single client connection.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<ProxyState>,
) -> Result<(), ProxyError> {
    let io = TokioIo::new(stream);

    let service = service_fn(move |req: Request<Incoming>| {
        let state = state.clone();
        async move { Ok::<_, Infallible>(proxy_request(req, peer, &state).await) }
    });

    // Serve HTTP/1.1 with support for upgrades (needed for CONNECT)
    http1::Builder::new()
        .preserve_header_case(true)
        .title_case_headers(true)
        .serve_connection(io, service)
        .with_upgrades()
        .await
        .map_err(ProxyError::from)
}

/// Process a single proxy request, turning any failure into a response.
async fn proxy_request(
    req: Request<Incoming>,
    peer: SocketAddr,
    state: &ProxyState,
) -> Response<ProxyBody> {
    let method = req.method().clone();
    let target = req.uri().to_string();

    let result = if method == Method::CONNECT {
        handle_connect(req, state).await
    } else if state.reload.matches(req.uri(), peer) {
        handle_reload(state).await
    } else {
        handle_forward(req, state).await
    };

    result.unwrap_or_else(|e| {
        match e {
            ProxyError::Denied { .. } => info!("{} {} from {}: {}", method, target, peer, e),
            _ => warn!("{} {} from {} failed: {}", method, target, peer, e),
        }
        e.into_response()
    })
}

/// Turn a Go-style `:port` address into something bindable.
fn bind_target(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    }
}

/// Builder for ProxyServer configuration.
pub struct ProxyServerBuilder {
    listen_addr: String,
    rules: Arc<RuleStore>,
    audit: Option<Arc<AuditLogger>>,
}

impl ProxyServerBuilder {
    /// Create a new builder around the shared whitelist.
    pub fn new(rules: Arc<RuleStore>) -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            rules,
            audit: None,
        }
    }

    /// Set the listen address (`[host]:port`).
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    /// Set the audit logger. Defaults to logging through `tracing`.
    pub fn audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Build the configuration without binding.
    pub fn build(self) -> ProxyConfig {
        ProxyConfig {
            listen_addr: self.listen_addr,
            rules: self.rules,
            audit: self.audit.unwrap_or_default(),
        }
    }

    /// Build the configuration and bind the listening socket.
    ///
    /// # Arguments
    ///
    /// * `shutdown_rx` - Receiver for shutdown signal.
    pub async fn bind(self, shutdown_rx: watch::Receiver<bool>) -> Result<ProxyServer, ProxyError> {
        ProxyServer::bind(self.build(), shutdown_rx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_target() {
        assert_eq!(bind_target(":5978"), "0.0.0.0:5978");
        assert_eq!(bind_target("127.0.0.1:5978"), "127.0.0.1:5978");
        assert_eq!(bind_target("localhost:0"), "localhost:0");
    }

    #[test]
    fn test_builder_defaults() {
        let rules = Arc::new(RuleStore::new());
        let config = ProxyServerBuilder::new(rules.clone()).build();

        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert!(Arc::ptr_eq(&config.rules, &rules));
        assert!(!config.audit.is_null());
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let (_tx, rx) = watch::channel(false);
        let server = ProxyServerBuilder::new(Arc::new(RuleStore::new()))
            .listen_addr("127.0.0.1:0")
            .audit(Arc::new(AuditLogger::new_null()))
            .bind(rx)
            .await
            .unwrap();

        assert!(server.local_addr().port() > 0);
        assert!(server.local_addr().ip().is_loopback());
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let (_tx, rx) = watch::channel(false);
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let err = ProxyServerBuilder::new(Arc::new(RuleStore::new()))
            .listen_addr(addr)
            .bind(rx)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ProxyError::Bind { .. }));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let server = ProxyServerBuilder::new(Arc::new(RuleStore::new()))
            .listen_addr("127.0.0.1:0")
            .audit(Arc::new(AuditLogger::new_null()))
            .bind(rx)
            .await
            .unwrap();

        let handle = tokio::spawn(server.run());
        tx.send(true).unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
