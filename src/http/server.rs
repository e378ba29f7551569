//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router and middleware layers (tracing, request ID, timeout)
//! - Assemble the handler pipeline from configuration
//! - Run each request's pipeline on its own task with a [`HyperChannel`]
//! - Turn handler errors into responses while nothing is committed

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use hyper::upgrade::OnUpgrade;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::Instrument;

use crate::config::TunnelConfig;
use crate::handshake::{AcceptAlphabet, WssHandshakeTunnel};
use crate::http::channel::ResponseChannel;
use crate::http::connect::ConnectHandler;
use crate::http::handler::{HandlerError, Pipeline};
use crate::http::hyper_channel::HyperChannel;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

/// HTTP server fronting the tunnel pipeline.
pub struct HttpServer {
    router: Router,
    config: TunnelConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: TunnelConfig) -> Self {
        let pipeline = Self::build_pipeline(&config);
        Self::with_pipeline(config, pipeline)
    }

    /// Create a server around an already assembled pipeline.
    pub fn with_pipeline(config: TunnelConfig, pipeline: Pipeline) -> Self {
        let state = AppState {
            pipeline: Arc::new(pipeline),
        };
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Composition root: the tunnel middleware (if enabled) in front of the
    /// CONNECT handler.
    pub fn build_pipeline(config: &TunnelConfig) -> Pipeline {
        let connect = ConnectHandler::new(Duration::from_secs(config.timeouts.connect_secs));
        let mut pipeline = Pipeline::new(Arc::new(connect));

        if config.handshake.enabled {
            if config.handshake.accept_alphabet == AcceptAlphabet::UrlSafe {
                tracing::warn!(
                    "{} uses the URL-safe accept alphabet; RFC 6455 clients will reject most handshakes",
                    WssHandshakeTunnel::NAME
                );
            }
            let tunnel = WssHandshakeTunnel::new().with_alphabet(config.handshake.accept_alphabet);
            pipeline = pipeline.with(Arc::new(tunnel));
        }

        pipeline
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &TunnelConfig, state: AppState) -> Router {
        Router::new()
            .fallback(pipeline_handler)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
            )
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }
}

/// Runs the pipeline for one request and returns the head it commits.
async fn pipeline_handler(State(state): State<AppState>, mut request: Request<Body>) -> Response {
    let upgrade = request.extensions_mut().remove::<OnUpgrade>();
    let (mut channel, head) = HyperChannel::new(upgrade);

    tracing::debug!(
        method = %request.method(),
        uri = %request.uri(),
        upgradable = channel.capabilities().hijack,
        "Dispatching request"
    );

    // The pipeline outlives this handler once it hijacks the connection.
    tokio::spawn(
        async move {
            let result = state.pipeline.serve(request, &mut channel).await;
            finish(&mut channel, result).await;
        }
        .in_current_span(),
    );

    match head.await {
        Ok(response) => response,
        Err(_) => {
            tracing::error!("Pipeline ended without a response");
            (StatusCode::INTERNAL_SERVER_ERROR, "Pipeline ended without a response").into_response()
        }
    }
}

/// Settle the response once the pipeline has returned.
async fn finish(channel: &mut HyperChannel, result: Result<(), HandlerError>) {
    match result {
        Ok(()) if !channel.is_committed() => channel.write_status(StatusCode::OK),
        Ok(()) => {}
        Err(e) if channel.is_committed() => {
            tracing::warn!(error = %e, status = ?channel.status(), "Handler failed after response head was sent");
        }
        Err(e) => {
            let status = e.status_code();
            if status.is_server_error() {
                tracing::error!(error = %e, status = status.as_u16(), "Request failed");
            } else {
                tracing::warn!(error = %e, status = status.as_u16(), "Request rejected");
            }
            channel.write_status(status);
            if let Err(write_err) = channel.write(format!("{e}\n").as_bytes()).await {
                tracing::debug!(error = %write_err, "Could not write error body");
            }
        }
    }
}
