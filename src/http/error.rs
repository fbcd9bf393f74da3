//! Errors on the proxying path.

use std::time::Duration;

/// Failures of an outbound fetch or tunnel connect, plus malformed inbound
/// requests.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid wayback directive {header}: {value:?}")]
    InvalidDirective { header: &'static str, value: String },

    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("origin did not respond within {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("failed to read origin response: {0}")]
    Body(axum::Error),

    #[error("could not connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid request: {0}")]
    Http(#[from] axum::http::Error),
}

impl ProxyError {
    /// True for problems with the client's request rather than the origin.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ProxyError::BadRequest(_) | ProxyError::InvalidDirective { .. } | ProxyError::BodyTooLarge(_)
        )
    }
}
