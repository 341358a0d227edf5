// ── Core error types ──
//
// Errors surfaced by the sync engine. Consumers never match on HTTP
// status codes or envelope details directly; the `From<omabus_api::Error>`
// impl folds transport-layer failures into these variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Session errors ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Controller unreachable: {message}")]
    Transport { message: String },

    // ── Controller errors ────────────────────────────────────────────
    #[error("Controller rejected the request ({code}): {message}")]
    Api { code: i32, message: String },

    #[error("Malformed controller response: {message}")]
    Malformed { message: String },

    // ── Lookup errors ────────────────────────────────────────────────
    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Not ready: {reason}")]
    NotReady { reason: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn not_ready_no_site() -> Self {
        Self::NotReady {
            reason: "site id is not resolved".into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<omabus_api::Error> for CoreError {
    fn from(err: omabus_api::Error) -> Self {
        match err {
            omabus_api::Error::Authentication { message } => CoreError::Auth { message },
            omabus_api::Error::Http { status: 401, body } => CoreError::Auth {
                message: format!("HTTP 401: {body}"),
            },
            omabus_api::Error::Transport(e) => CoreError::Transport {
                message: e.to_string(),
            },
            omabus_api::Error::Http { status, body } => CoreError::Transport {
                message: format!("HTTP {status}: {body}"),
            },
            omabus_api::Error::Tls(msg) => CoreError::Transport {
                message: format!("TLS error: {msg}"),
            },
            omabus_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            omabus_api::Error::Api { code, message } => CoreError::Api { code, message },
            omabus_api::Error::MissingResult { path } => {
                CoreError::Internal(format!("Controller returned no result for {path}"))
            }
            omabus_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CoreError;

    #[test]
    fn api_error_keeps_code() {
        let err: CoreError = omabus_api::Error::Api {
            code: -1001,
            message: "bad request".into(),
        }
        .into();
        assert!(matches!(err, CoreError::Api { code: -1001, .. }));
    }

    #[test]
    fn unauthorized_status_maps_to_auth() {
        let err: CoreError = omabus_api::Error::Http {
            status: 401,
            body: String::new(),
        }
        .into();
        assert!(matches!(err, CoreError::Auth { .. }));
    }
}
