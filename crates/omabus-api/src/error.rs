use thiserror::Error;

/// Omada error codes that mean the access token is no longer usable.
const ACCESS_TOKEN_EXPIRED: i32 = -44112;
const ACCESS_TOKEN_INVALID: i32 = -44113;

/// Top-level error type for the `omabus-api` crate.
///
/// Covers every failure mode of the OpenAPI surface: token grants,
/// transport, the `{errorCode, msg, result}` envelope, and body decoding.
/// `omabus-core` maps these into its own taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Token grant rejected, or the response carried no token.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Non-success HTTP status with no parseable envelope.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    // ── Envelope ────────────────────────────────────────────────────
    /// Non-zero `errorCode` in an otherwise successful response.
    #[error("Omada API error {code}: {message}")]
    Api { code: i32, message: String },

    /// The envelope reported success but carried no `result`.
    #[error("Response for {path} carried no result")]
    MissingResult { path: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this error indicates the access token has expired
    /// or been revoked and renewing it might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        match self {
            Self::Authentication { .. } | Self::Http { status: 401, .. } => true,
            Self::Api { code, .. } => matches!(*code, ACCESS_TOKEN_EXPIRED | ACCESS_TOKEN_INVALID),
            _ => false,
        }
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Extract the application-level error code, if available.
    pub fn api_error_code(&self) -> Option<i32> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }
}
