//! Error types for cipower operations
//!
//! Each layer has its own error so callers can tell "the command was
//! rejected" apart from "the command went through but status is unknown".

use crate::instance::{Command, LifecycleState};
use std::path::PathBuf;
use std::time::Duration;

/// Errors raised by the OCI REST layer
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request could not be sent or the body could not be read
    #[error("Failed to send request: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("API request failed: {status}")]
    Status {
        status: reqwest::StatusCode,
        /// Sanitized, truncated response body
        body: String,
    },

    /// Response body was not the JSON we expected
    #[error("Failed to parse response JSON: {0}")]
    Decode(#[from] serde_json::Error),

    /// Could not load signing credentials
    #[error("Authentication failed: {0}")]
    Credentials(#[from] CredentialError),

    /// Request could not be signed
    #[error("Failed to sign request: {0}")]
    Signing(String),

    /// Endpoint could not be built
    #[error("Invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    /// Response parsed but lacked a required field
    #[error("Unexpected response: {0}")]
    Unexpected(String),
}

impl ApiError {
    /// HTTP status code, when the provider answered at all
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(status.as_u16()),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Errors raised while resolving provider credentials
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Resource principal environment is absent or incomplete
    #[error("Resource principal unavailable: {0}")]
    ResourcePrincipal(String),

    /// Profile file is missing, unreadable or lacks a key
    #[error("Profile '{profile}' in {path:?} unusable: {reason}")]
    Profile {
        path: PathBuf,
        profile: String,
        reason: String,
    },

    /// Session token or private key file could not be read
    #[error("Failed to read {path:?}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Private key is not an unencrypted RSA PEM
    #[error("Invalid private key: {0}")]
    PrivateKey(String),

    /// Every provider in the chain failed
    #[error("No credential provider could be resolved (tried: {tried})")]
    NoProvider { tried: String },
}

/// Status query failed (transport, auth or decode)
#[derive(Debug, thiserror::Error)]
#[error("Failed to get status of container instance {resource_id}: {source}")]
pub struct StatusError {
    pub resource_id: String,
    #[source]
    pub source: ApiError,
}

/// Start or stop request was not accepted
#[derive(Debug, thiserror::Error)]
#[error("Failed to {command} container instance {resource_id}: {source}")]
pub struct CommandError {
    pub command: Command,
    pub resource_id: String,
    #[source]
    pub source: ApiError,
}

/// Why waiting for a target lifecycle state ended without reaching it
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error(
        "Instance did not reach {target} within {}. Last state: {}",
        format_wait(*max_wait),
        last_state(last)
    )]
    Timeout {
        target: LifecycleState,
        max_wait: Duration,
        last: Option<LifecycleState>,
    },

    #[error("Wait for {target} was cancelled. Last state: {}", last_state(last))]
    Cancelled {
        target: LifecycleState,
        last: Option<LifecycleState>,
    },

    #[error(transparent)]
    Status(#[from] StatusError),
}

/// Caller input errors, reported as 400 by the HTTP adapter
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    #[error("Invalid action '{0}'. Must be 'start', 'stop', or 'toggle'.")]
    InvalidAction(String),

    #[error("Missing required field 'ocid' and no secret configured to resolve it.")]
    MissingIdentifier,
}

fn last_state(last: &Option<LifecycleState>) -> String {
    last.as_ref()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "UNKNOWN".to_string())
}

/// Whole seconds print as "240s", anything finer as milliseconds
pub fn format_wait(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}
