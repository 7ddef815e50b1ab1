//! Error types for the routing core
//!
//! Every failure a proxied request or an address update can hit is a
//! [`ProxyError`]. Each kind maps to exactly one client-visible status code,
//! and none of them is retried.

use crate::http::response::StatusCode;

/// Errors raised while resolving, forwarding, rewriting or updating.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// No routing entry is configured for the requested host
    #[error("no route for host {0}")]
    NotFound(String),

    /// The entry's target is itself a managed virtual host
    #[error("recursive target {target} for host {host}")]
    RecursiveTarget { host: String, target: String },

    /// The entry's target does not form a valid backend URL
    #[error("invalid target {target}: {reason}")]
    InvalidTarget { target: String, reason: String },

    /// Malformed or unauthenticated address update
    #[error("invalid request")]
    BadRequest,

    /// Reading or decompressing a proxied body failed
    #[error("failed to read response body: {0}")]
    BodyRead(#[source] std::io::Error),

    /// Recompressing a rewritten body failed
    #[error("failed to write response body: {0}")]
    BodyWrite(#[source] std::io::Error),

    /// The record store refused a save
    #[error("failed to persist entry {id}: {source}")]
    Persistence {
        id: String,
        #[source]
        source: crate::store::StoreError,
    },

    /// Connecting to or talking with the backend failed
    #[error("upstream error: {0}")]
    Upstream(String),

    /// The backend did not answer in time
    #[error("upstream timed out: {0}")]
    Timeout(String),
}

impl ProxyError {
    pub fn upstream(msg: impl Into<String>) -> Self {
        ProxyError::Upstream(msg.into())
    }

    /// The status code a client sees for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::NotFound(_) => StatusCode::NotFound,
            ProxyError::RecursiveTarget { .. }
            | ProxyError::InvalidTarget { .. }
            | ProxyError::Persistence { .. } => StatusCode::InternalServerError,
            ProxyError::BadRequest => StatusCode::BadRequest,
            ProxyError::BodyRead(_) | ProxyError::BodyWrite(_) | ProxyError::Upstream(_) => {
                StatusCode::BadGateway
            }
            ProxyError::Timeout(_) => StatusCode::GatewayTimeout,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
