// Application bootstrapper and HTTP server

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, body::Incoming as IncomingBody};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::http::{HttpRequest, HttpResponse};
use crate::logging::{debug, error, info};
use crate::registry::Registry;
use crate::routing::{RoutePattern, Router, error_response};
use crate::{providers, render};

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Base URL all routes live under (e.g. `/api/v1`)
    pub base_url: Option<String>,
    /// Largest request body accepted, in bytes
    pub max_body_size: usize,
    /// Verbose per-request logging
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            base_url: None,
            max_body_size: 10 * 1024 * 1024,
            debug: false,
        }
    }
}

/// The main application struct: a registry, a router, and the server glue
/// connecting them to a socket.
pub struct Application {
    registry: Registry,
    router: Router,
    config: ServerConfig,
}

impl Application {
    /// Create an application and register the built-in bindings
    /// (`json_renderer`, `basic_auth`, `payload`).
    pub fn new(config: ServerConfig) -> Result<Self, Error> {
        let registry = Registry::new();
        render::register(&registry, false)?;
        providers::basic_auth::register(&registry)?;
        providers::payload::register(&registry)?;

        let router = Router::with_prefix(config.base_url.clone());
        Ok(Self {
            registry,
            router,
            config,
        })
    }

    /// The application's registry, for registering further bindings.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Add a route from a path spec.
    pub fn at(&mut self, spec: &str, endpoint: Endpoint) -> Result<(), Error> {
        self.router.at(spec, endpoint)
    }

    /// Add a route from a regular expression.
    pub fn at_regex(&mut self, pattern: &str, endpoint: Endpoint) -> Result<(), Error> {
        self.router.at_regex(pattern, endpoint)
    }

    /// Add a route with an already-compiled pattern.
    pub fn route(&mut self, pattern: RoutePattern, endpoint: Endpoint) {
        self.router.route(pattern, endpoint);
    }

    /// Dispatch one request through the router. This is the same path the
    /// server takes; tests drive it directly without a socket.
    pub async fn dispatch(&self, request: HttpRequest) -> HttpResponse {
        if self.config.debug {
            info!(method = %request.method, path = %request.path, "dispatching request");
        }
        self.router.dispatch(&self.registry, request).await
    }

    /// Start the HTTP server and serve until the process ends.
    pub async fn listen(self) -> Result<(), Error> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "server listening");

        let app = Arc::new(self);
        loop {
            let (stream, peer) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let app = app.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<IncomingBody>| {
                    let app = app.clone();
                    async move { app.handle(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(%peer, error = %err, "connection error");
                }
            });
        }
    }

    /// Handle one hyper request: convert, dispatch, convert back.
    async fn handle(
        &self,
        req: Request<IncomingBody>,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        let (parts, body) = req.into_parts();

        let path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());
        let mut request = HttpRequest::new(parts.method.to_string(), path);

        for (name, value) in &parts.headers {
            if let Ok(value) = value.to_str() {
                request.headers.insert(name.to_string(), value.to_string());
            }
        }

        let limited = Limited::new(body, self.config.max_body_size);
        match limited.collect().await {
            Ok(collected) => request.body = collected.to_bytes().to_vec(),
            Err(_) => {
                let response = error_response(
                    &self.registry,
                    &Error::PayloadTooLarge(format!(
                        "Request body exceeds {} bytes.",
                        self.config.max_body_size
                    )),
                );
                return Ok(into_hyper(response));
            }
        }

        let response = self.dispatch(request).await;
        Ok(into_hyper(response))
    }
}

fn into_hyper(response: HttpResponse) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(response.status);
    for (name, value) in &response.headers {
        builder = builder.header(name, value);
    }
    match builder.body(Full::new(Bytes::from(response.body))) {
        Ok(response) => response,
        Err(err) => {
            error!(%err, "failed to build response");
            let mut fallback = Response::new(Full::new(Bytes::new()));
            *fallback.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        }
    }
}
