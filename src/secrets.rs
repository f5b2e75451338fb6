//! Vault secret lookup
//!
//! Used by the variant that reads the container instance OCID from a
//! secret instead of taking it as an argument.

use crate::error::ApiError;
use crate::oci::client::OciClient;
use async_trait::async_trait;
use base64::Engine;
use serde_json::Value;

/// Reads a secret's current value. `None` means "not available"; callers
/// report it as an ordinary failure.
#[async_trait]
pub trait SecretReader: Send + Sync {
    async fn secret_value(&self, secret_id: &str) -> Option<String>;
}

/// Decode the content of a GetSecretBundle response
fn decode_bundle(body: &Value) -> Result<String, ApiError> {
    let content = body
        .pointer("/secretBundleContent/content")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ApiError::Unexpected("secret bundle has no content".to_string()))?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(content.trim())
        .map_err(|e| ApiError::Unexpected(format!("secret content is not base64: {}", e)))?;

    let value = String::from_utf8(bytes)
        .map_err(|_| ApiError::Unexpected("secret content is not UTF-8".to_string()))?;

    Ok(value.trim().to_string())
}

#[async_trait]
impl SecretReader for OciClient {
    async fn secret_value(&self, secret_id: &str) -> Option<String> {
        let url = self.secret_bundle_url(secret_id);

        let result = match self.get(&url).await {
            Ok(body) => decode_bundle(&body),
            Err(e) => Err(e),
        };

        match result {
            Ok(value) if !value.is_empty() => Some(value),
            Ok(_) => {
                tracing::error!("Secret {} is empty", secret_id);
                None
            }
            Err(e) => {
                tracing::error!("Failed to retrieve secret value: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_bundle_trims_value() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("ocid1.ci.oc1..abc\n");
        let body = json!({
            "secretId": "ocid1.vaultsecret.oc1..s",
            "secretBundleContent": {"contentType": "BASE64", "content": encoded}
        });
        assert_eq!(decode_bundle(&body).unwrap(), "ocid1.ci.oc1..abc");
    }

    #[test]
    fn test_decode_bundle_rejects_garbage() {
        let body = json!({"secretBundleContent": {"content": "%%%"}});
        assert!(decode_bundle(&body).is_err());
        assert!(decode_bundle(&json!({})).is_err());
    }
}
