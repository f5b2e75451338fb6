//! Function-style HTTP adapter
//!
//! Decodes `{"action"?, "ocid"?}` invocations, runs the reconciler and
//! encodes the outcome as `{"message": ...}` (200) or `{"error": ...}`
//! (400 for caller mistakes, 500 for internal failures).

use crate::error::AdapterError;
use crate::reconciler::{Action, ReconcileRequest, Reconciler};
use crate::secrets::SecretReader;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outcome text when the OCID secret cannot be read
pub const SECRET_UNAVAILABLE: &str = "Failed to retrieve the OCID from the vault secret.";

/// Raw invocation body
#[derive(Debug, Default, Deserialize)]
struct InvocationBody {
    action: Option<String>,
    ocid: Option<String>,
}

/// Decoded invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub action: Action,
    pub ocid: Option<String>,
}

/// Decode a request body. An empty or unparsable body means "toggle, no
/// OCID"; only an unknown action is rejected.
pub fn decode_request(body: &[u8]) -> Result<Invocation, AdapterError> {
    let parsed: InvocationBody = if body.iter().all(u8::is_ascii_whitespace) {
        InvocationBody::default()
    } else {
        serde_json::from_slice(body).unwrap_or_else(|e| {
            tracing::debug!("Ignoring unparsable request body: {}", e);
            InvocationBody::default()
        })
    };

    let action = match parsed.action {
        Some(raw) => raw.parse()?,
        None => Action::default(),
    };

    let ocid = parsed
        .ocid
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty());

    Ok(Invocation { action, ocid })
}

/// Where the resource identifier came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Resolved(String),
    /// A secret was configured but could not be read
    SecretUnavailable,
}

/// Use the explicit OCID, else read it from the configured secret
pub async fn resolve_identifier(
    explicit: Option<String>,
    secret_id: Option<&str>,
    secrets: &dyn SecretReader,
) -> Result<Identifier, AdapterError> {
    if let Some(ocid) = explicit {
        return Ok(Identifier::Resolved(ocid));
    }

    let secret_id = secret_id.ok_or(AdapterError::MissingIdentifier)?;
    Ok(match secrets.secret_value(secret_id).await {
        Some(ocid) => Identifier::Resolved(ocid),
        None => Identifier::SecretUnavailable,
    })
}

impl IntoResponse for AdapterError {
    fn into_response(self) -> Response {
        error_response(StatusCode::BAD_REQUEST, self.to_string())
    }
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(json!({ "error": error }))).into_response()
}

fn message_response(message: String) -> Response {
    (StatusCode::OK, Json(json!({ "message": message }))).into_response()
}

/// Shared adapter state
#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<Reconciler>,
    pub secrets: Arc<dyn SecretReader>,
    pub secret_id: Option<String>,
    pub channel: Option<String>,
    /// Cancelled on shutdown; aborts in-flight waits
    pub shutdown: CancellationToken,
}

/// Build the adapter router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(invoke))
        .route("/invoke", post(invoke))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn invoke(State(state): State<AppState>, body: Bytes) -> Response {
    tracing::info!("Invoking container instance reconciliation");

    let invocation = match decode_request(&body) {
        Ok(invocation) => invocation,
        Err(e) => {
            tracing::warn!("Rejected invocation: {}", e);
            return e.into_response();
        }
    };
    tracing::info!("Action requested: {}", invocation.action);

    let resource_id = match resolve_identifier(
        invocation.ocid,
        state.secret_id.as_deref(),
        state.secrets.as_ref(),
    )
    .await
    {
        Ok(Identifier::Resolved(id)) => id,
        Ok(Identifier::SecretUnavailable) => {
            tracing::error!("{}", SECRET_UNAVAILABLE);
            return message_response(SECRET_UNAVAILABLE.to_string());
        }
        Err(e) => return e.into_response(),
    };

    let request = ReconcileRequest {
        resource_id,
        action: invocation.action,
        channel: state.channel.clone(),
    };

    let reconciler = state.reconciler.clone();
    let cancel = state.shutdown.child_token();
    let task = tokio::spawn(async move { reconciler.reconcile(&request, &cancel).await });

    match task.await {
        Ok(outcome) => message_response(outcome.message),
        Err(e) => {
            tracing::error!("Error in handler: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("An error occurred: {}\n{:?}", e, e),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct OneSecret(Option<&'static str>);

    #[async_trait]
    impl SecretReader for OneSecret {
        async fn secret_value(&self, _secret_id: &str) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    #[test]
    fn test_decode_defaults_to_toggle() {
        let inv = decode_request(b"").unwrap();
        assert_eq!(inv.action, Action::Toggle);
        assert_eq!(inv.ocid, None);

        let inv = decode_request(b"{not json").unwrap();
        assert_eq!(inv.action, Action::Toggle);
    }

    #[test]
    fn test_decode_lowercases_action_and_trims_ocid() {
        let inv = decode_request(br#"{"action": "STOP", "ocid": " ocid1.ci "}"#).unwrap();
        assert_eq!(inv.action, Action::Stop);
        assert_eq!(inv.ocid.as_deref(), Some("ocid1.ci"));

        let inv = decode_request(br#"{"ocid": ""}"#).unwrap();
        assert_eq!(inv.ocid, None);
    }

    #[test]
    fn test_decode_rejects_padded_action() {
        let err = decode_request(br#"{"action": " start "}"#).unwrap_err();
        assert_eq!(err, AdapterError::InvalidAction(" start ".to_string()));
    }

    #[test]
    fn test_decode_rejects_unknown_action() {
        let err = decode_request(br#"{"action": "Reboot"}"#).unwrap_err();
        assert_eq!(err, AdapterError::InvalidAction("reboot".to_string()));
    }

    #[tokio::test]
    async fn test_resolve_prefers_explicit_ocid() {
        let id = resolve_identifier(Some("a".into()), Some("s"), &OneSecret(Some("b")))
            .await
            .unwrap();
        assert_eq!(id, Identifier::Resolved("a".to_string()));
    }

    #[tokio::test]
    async fn test_resolve_from_secret() {
        let id = resolve_identifier(None, Some("s"), &OneSecret(Some("b")))
            .await
            .unwrap();
        assert_eq!(id, Identifier::Resolved("b".to_string()));

        let id = resolve_identifier(None, Some("s"), &OneSecret(None))
            .await
            .unwrap();
        assert_eq!(id, Identifier::SecretUnavailable);
    }

    #[tokio::test]
    async fn test_resolve_without_any_source() {
        let err = resolve_identifier(None, None, &OneSecret(Some("b")))
            .await
            .unwrap_err();
        assert_eq!(err, AdapterError::MissingIdentifier);
    }
}
