//! Handler pipeline.
//!
//! # Data Flow
//! ```text
//! Request + ResponseChannel
//!     → Middleware[0].serve(req, resp, next)
//!     → Middleware[1].serve(req, resp, next)
//!     → ...
//!     → Handler.serve(req, resp)
//! ```
//!
//! # Design Decisions
//! - Middleware receive `next` explicitly and may wrap the response channel
//!   before calling it
//! - Errors carry their own HTTP status; the server turns an error into a
//!   response only if nothing was committed yet
//! - The pipeline is assembled by the composition root, there is no registry

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};

use crate::http::channel::{Capability, ChannelError, ResponseChannel};

/// Errors surfaced by handlers and middleware.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("response channel does not support {0}")]
    CapabilityMissing(Capability),

    #[error("invalid tunnel host {0:?}")]
    InvalidRoutingHost(String),

    #[error("failed to connect to {host}: {source}")]
    UpstreamConnect {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out connecting to {host}")]
    UpstreamTimeout { host: String },

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl HandlerError {
    /// HTTP status reported to the client for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            HandlerError::CapabilityMissing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            HandlerError::InvalidRoutingHost(_) => StatusCode::BAD_REQUEST,
            HandlerError::UpstreamConnect { .. } => StatusCode::BAD_GATEWAY,
            HandlerError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            HandlerError::Channel(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Terminal request handler.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve(
        &self,
        req: Request<Body>,
        resp: &mut dyn ResponseChannel,
    ) -> Result<(), HandlerError>;
}

/// A pipeline stage that decides whether and how to call `next`.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn serve(
        &self,
        req: Request<Body>,
        resp: &mut dyn ResponseChannel,
        next: &dyn Handler,
    ) -> Result<(), HandlerError>;
}

/// Ordered middleware in front of a terminal handler.
#[derive(Clone)]
pub struct Pipeline {
    middleware: Vec<Arc<dyn Middleware>>,
    handler: Arc<dyn Handler>,
}

impl Pipeline {
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self {
            middleware: Vec::new(),
            handler,
        }
    }

    /// Append a middleware; it runs after the ones already added.
    pub fn with(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    pub async fn serve(
        &self,
        req: Request<Body>,
        resp: &mut dyn ResponseChannel,
    ) -> Result<(), HandlerError> {
        let chain = Chain {
            middleware: &self.middleware,
            handler: self.handler.as_ref(),
        };
        chain.serve(req, resp).await
    }
}

/// The remainder of a pipeline, seen as a single handler.
struct Chain<'a> {
    middleware: &'a [Arc<dyn Middleware>],
    handler: &'a dyn Handler,
}

#[async_trait]
impl<'a> Handler for Chain<'a> {
    async fn serve(
        &self,
        req: Request<Body>,
        resp: &mut dyn ResponseChannel,
    ) -> Result<(), HandlerError> {
        match self.middleware.split_first() {
            Some((first, rest)) => {
                let next = Chain {
                    middleware: rest,
                    handler: self.handler,
                };
                first.serve(req, resp, &next).await
            }
            None => self.handler.serve(req, resp).await,
        }
    }
}
