/// Errors produced by the admission-control middleware.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DripError {
    /// The request was rejected by the admission gate.
    ///
    /// The gate's contract is a bare boolean, so no retry hint is available.
    /// When the `axum` feature is enabled, this converts to
    /// `429 Too Many Requests`.
    #[error("Admission rejected; bucket at capacity")]
    RateLimited,

    /// An unexpected error occurred in the inner service.
    ///
    /// The string contains the `Display` representation of the inner error.
    /// When the `axum` feature is enabled, this converts to
    /// `500 Internal Server Error`.
    #[error("Internal service error: {0}")]
    Inner(String),
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for DripError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match self {
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Inner(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}
