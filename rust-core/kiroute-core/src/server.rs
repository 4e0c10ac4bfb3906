//! # HTTP Server
//!
//! Serves an [`App`] over HTTP/1.1 with Hyper and Tokio.
//!
//! ## Key Features
//!
//! - The router runs on the blocking pool, one task per request
//! - Read timeout on headers and body, write timeout on the router
//! - Body size limit answered with `413`
//! - `x-request-id` generated when missing and echoed back
//! - Graceful shutdown on Ctrl-C with a bounded drain

use crate::app::App;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::HeaderValue;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::StatusCode;
use hyper_util::rt::{TokioIo, TokioTimer};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Request id header
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// HTTP server for an [`App`]
#[derive(Debug, Clone)]
pub struct Server {
    app: App,
    config: ServerConfig,
}

impl Server {
    /// Create a server for `app`
    #[must_use]
    pub const fn new(app: App, config: ServerConfig) -> Self {
        Self { app, config }
    }

    /// The server configuration
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the configured address
    ///
    /// # Errors
    ///
    /// Returns `Error::BindError` when the socket cannot be bound.
    pub fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.address;
        let bind_error = |source| Error::BindError {
            address: addr.to_string(),
            source,
        };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_error)?;
        socket.set_reuseaddr(true).map_err(bind_error)?;
        socket.bind(addr).map_err(bind_error)?;
        socket.listen(1024).map_err(bind_error)
    }

    /// Serve until Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns `Error::BindError` when binding fails, `Error::Io` when
    /// accepting fails.
    pub async fn serve(&self) -> Result<()> {
        let listener = self.bind()?;
        self.serve_listener(listener, shutdown_signal()).await
    }

    /// Serve connections from `listener` until `shutdown` completes
    ///
    /// In-flight connections get `shutdown_timeout` to finish.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` when accepting fails.
    pub async fn serve_listener(&self, listener: TcpListener, shutdown: impl Future<Output = ()>) -> Result<()> {
        info!("Server listening on http://{}", listener.local_addr()?);

        let active = Arc::new(AtomicUsize::new(0));
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, remote_addr) = accept_result?;
                    let io = TokioIo::new(stream);
                    let app = self.app.clone();
                    let config = self.config.clone();
                    let active = Arc::clone(&active);
                    active.fetch_add(1, Ordering::Relaxed);

                    tokio::task::spawn(async move {

                        let mut builder = http1::Builder::new();
                        builder
                            .timer(TokioTimer::new())
                            .header_read_timeout(config.read_timeout)
                            .keep_alive(config.keep_alive);

                        let service = service_fn(move |req| {
                            let app = app.clone();
                            let config = config.clone();
                            async move {
                                let method = req.method().clone();
                                let path = req.uri().path().to_string();
                                let version = req.version();

                                let response = respond(app, req, remote_addr, &config).await;

                                info!("    {} - \"{} {} {:?}\" {}",
                                    remote_addr,
                                    method,
                                    path,
                                    version,
                                    response.status()
                                );
                                Ok::<_, Infallible>(response)
                            }
                        });

                        if let Err(err) = builder.serve_connection(io, service).await {
                            error!("Error serving connection: {:?}", err);
                        }
                        active.fetch_sub(1, Ordering::Relaxed);
                    });
                }
                () = &mut shutdown => {
                    info!("Shutdown signal received, stopping server...");
                    break;
                }
            }
        }

        let drain = async {
            while active.load(Ordering::Relaxed) > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        if tokio::time::timeout(self.config.shutdown_timeout, drain).await.is_err() {
            warn!(active = active.load(Ordering::Relaxed), "Shutdown timeout reached with open connections");
        }
        Ok(())
    }
}

/// Serve `app` with the configuration from the environment
///
/// # Errors
///
/// Same as [`Server::serve`].
pub async fn listen_and_serve(app: App) -> Result<()> {
    let config = ServerConfig::from_env();
    info!("go to http://localhost:{}", config.address.port());
    Server::new(app, config).serve().await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Read the request, run the router off the async threads, build the reply
async fn respond(
    app: App,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
    config: &ServerConfig,
) -> hyper::Response<Full<Bytes>> {
    let read = Request::from_hyper_with_limit(req, Some(remote_addr), config.max_body_size);
    let mut request = match tokio::time::timeout(config.read_timeout, read).await {
        Ok(Ok(request)) => request,
        Ok(Err(Error::PayloadTooLarge { limit, actual })) => {
            warn!(limit, actual, "Request body too large");
            return Response::text(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large").into_hyper();
        }
        Ok(Err(e)) => {
            error!("Failed to parse request: {}", e);
            return Response::text(StatusCode::BAD_REQUEST, "Bad Request").into_hyper();
        }
        Err(_) => {
            warn!(remote = %remote_addr, "Request body read timed out");
            return Response::text(StatusCode::REQUEST_TIMEOUT, "Request Timeout").into_hyper();
        }
    };

    let request_id = request
        .header(REQUEST_ID_HEADER)
        .map_or_else(generate_request_id, str::to_string);
    request.set_header(REQUEST_ID_HEADER, &request_id);

    let cancel = CancellationToken::new();
    let task = tokio::task::spawn_blocking({
        let cancel = cancel.clone();
        move || app.handle_with_cancellation(request, cancel)
    });

    let mut response = match tokio::time::timeout(config.write_timeout, task).await {
        Ok(Ok(response)) => response,
        Ok(Err(join_error)) => {
            error!("Router task failed: {}", join_error);
            Response::text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
        Err(_) => {
            cancel.cancel();
            warn!(request_id = %request_id, "Write timeout reached, request cancelled");
            Response::text(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable")
        }
    };

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers.insert(REQUEST_ID_HEADER, value);
    }
    response.into_hyper()
}

fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}
