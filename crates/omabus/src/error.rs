//! CLI error types with miette diagnostics.
//!
//! Maps core and config errors into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use omabus_config::ConfigError;
use omabus_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const NOT_READY: i32 = 5;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach the controller: {message}")]
    #[diagnostic(
        code(omabus::connection_failed),
        help(
            "Check that the controller URL is reachable from this host.\n\
             Self-signed certificates need `insecure = true` or `ca_cert` under [controller]."
        )
    )]
    ConnectionFailed { message: String },

    #[error("MQTT broker error: {message}")]
    #[diagnostic(
        code(omabus::mqtt),
        help("Check [mqtt] host, port and credentials.")
    )]
    Mqtt { message: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(omabus::auth_failed),
        help(
            "Verify client_id and client_secret of the OpenAPI application\n\
             (Global View > Settings > Platform Integration on the controller)."
        )
    )]
    AuthFailed { message: String },

    #[error("Session failed permanently")]
    #[diagnostic(
        code(omabus::session_failed),
        help("Token renewal was exhausted. Restart the bridge once the controller is reachable.")
    )]
    SessionFailed,

    #[error("No client secret configured for controller '{omadac_id}'")]
    #[diagnostic(
        code(omabus::no_credentials),
        help(
            "Set controller.client_secret, point controller.client_secret_env at an\n\
             environment variable, or store it in the system keyring under\n\
             service 'omabus', account '{omadac_id}/client-secret'."
        )
    )]
    NoCredentials { omadac_id: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("{what} not found")]
    #[diagnostic(
        code(omabus::not_found),
        help("Run: omabus snapshot --ports to see known devices and ports")
    )]
    NotFound { what: String },

    #[error("Controller not ready: {reason}")]
    #[diagnostic(
        code(omabus::not_ready),
        help("Check that controller.site names an existing site.")
    )]
    NotReady { reason: String },

    // ── API ──────────────────────────────────────────────────────────

    #[error("API error ({code}): {message}")]
    #[diagnostic(code(omabus::api_error))]
    ApiError { code: i32, message: String },

    #[error("Command failed at {step}: {message}")]
    #[diagnostic(code(omabus::command_failed))]
    CommandFailed { step: String, message: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(
        code(omabus::validation),
        help("Expected config at: {path}")
    )]
    Validation {
        field: String,
        reason: String,
        path: String,
    },

    #[error(transparent)]
    #[diagnostic(code(omabus::config))]
    Config(Box<ConfigError>),

    #[error("{0}")]
    #[diagnostic(code(omabus::internal))]
    Internal(String),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to encode output: {0}")]
    #[diagnostic(code(omabus::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Mqtt { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } | Self::SessionFailed => {
                exit_code::AUTH
            }
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::NotReady { .. } => exit_code::NOT_READY,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Auth { message } => Self::AuthFailed { message },
            CoreError::Transport { message } => Self::ConnectionFailed { message },
            CoreError::Api { code, message } => Self::ApiError { code, message },
            CoreError::Malformed { message } | CoreError::Internal(message) => {
                Self::Internal(message)
            }
            CoreError::NotFound { what } => Self::NotFound { what },
            CoreError::NotReady { reason } => Self::NotReady { reason },
            CoreError::Config { message } => Self::Validation {
                field: "controller".into(),
                reason: message,
                path: omabus_config::config_path().display().to_string(),
            },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation {
                field,
                reason,
                path: omabus_config::config_path().display().to_string(),
            },
            ConfigError::NoCredentials { omadac_id } => Self::NoCredentials { omadac_id },
            other => Self::Config(Box::new(other)),
        }
    }
}
