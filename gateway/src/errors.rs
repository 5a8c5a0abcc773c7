use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

/// Errors surfaced to callers of gateway operations.
///
/// Transport problems and backend failure statuses are kept apart: a
/// transport failure means the backend may never have seen the request,
/// while `UpstreamStatus` means the exchange completed and the backend
/// rejected it.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("timeout contacting {0}")]
    UpstreamTimeout(&'static str),

    #[error("request to {0} failed: {1}")]
    UpstreamRequestFailed(&'static str, String),

    #[error("{service} responded with {status}: {body}")]
    UpstreamStatus {
        service: &'static str,
        status: http::StatusCode,
        body: String,
    },

    #[error("could not decode response from {0}: {1}")]
    InvalidResponse(&'static str, String),

    /// The user record was committed but the follow-up payment call failed.
    /// Callers can retry just the payment step.
    #[error("user {user_id} created but payment setup failed: {source}")]
    PaymentSetupFailed {
        user_id: i64,
        #[source]
        source: Box<GatewayError>,
    },
}
