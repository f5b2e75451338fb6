//! OCI request signing
//!
//! OCI REST endpoints authenticate each request with an HTTP signature
//! (`rsa-sha256`). GET requests sign `date (request-target) host`; requests
//! with a body additionally sign `content-length content-type
//! x-content-sha256`.

use crate::error::{ApiError, CredentialError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// RFC 7231 date, as OCI expects in the `date` header
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Signs requests with one API key or session key
#[derive(Clone)]
pub struct RequestSigner {
    key_id: String,
    key: RsaPrivateKey,
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner")
            .field("key_id", &redact_key_id(&self.key_id))
            .finish_non_exhaustive()
    }
}

impl RequestSigner {
    pub fn new(key_id: impl Into<String>, key: RsaPrivateKey) -> Self {
        Self {
            key_id: key_id.into(),
            key,
        }
    }

    /// Parse a PEM private key (PKCS#8 or PKCS#1)
    pub fn from_pem(key_id: impl Into<String>, pem: &str) -> Result<Self, CredentialError> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| CredentialError::PrivateKey(e.to_string()))?;
        Ok(Self::new(key_id, key))
    }

    /// keyId for a session token (resource principal or `oci session`)
    pub fn session_key_id(token: &str) -> String {
        format!("ST${}", token)
    }

    /// keyId for a user API key
    pub fn api_key_id(tenancy: &str, user: &str, fingerprint: &str) -> String {
        format!("{}/{}/{}", tenancy, user, fingerprint)
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Headers to attach to a request: `date`, `host`, `authorization`, and
    /// the body headers when `body` is present
    pub fn sign(&self, method: &Method, url: &Url, body: Option<&[u8]>) -> Result<HeaderMap, ApiError> {
        let date = chrono::Utc::now().format(HTTP_DATE_FORMAT).to_string();
        self.sign_at(method, url, body, &date)
    }

    fn sign_at(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&[u8]>,
        date: &str,
    ) -> Result<HeaderMap, ApiError> {
        let host = url
            .host_str()
            .ok_or_else(|| ApiError::Signing(format!("URL has no host: {}", url)))?;
        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let mut target = format!("{} {}", method.as_str().to_lowercase(), url.path());
        if let Some(query) = url.query() {
            target.push('?');
            target.push_str(query);
        }

        let mut signed: Vec<(&'static str, String)> = vec![
            ("date", date.to_string()),
            ("(request-target)", target),
            ("host", host),
        ];
        if let Some(body) = body {
            signed.push(("content-length", body.len().to_string()));
            signed.push(("content-type", JSON_CONTENT_TYPE.to_string()));
            signed.push(("x-content-sha256", STANDARD.encode(Sha256::digest(body))));
        }

        let signing_string = signed
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect::<Vec<_>>()
            .join("\n");

        let signature = SigningKey::<Sha256>::new(self.key.clone())
            .try_sign(signing_string.as_bytes())
            .map_err(|e| ApiError::Signing(e.to_string()))?;

        let names = signed
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(" ");
        let authorization = format!(
            "Signature version=\"1\",keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{}\"",
            self.key_id,
            names,
            STANDARD.encode(signature.to_bytes())
        );

        let mut headers = HeaderMap::new();
        for (name, value) in signed {
            if name == "(request-target)" {
                continue;
            }
            headers.insert(HeaderName::from_static(name), header_value(&value)?);
        }
        headers.insert(AUTHORIZATION, header_value(&authorization)?);

        Ok(headers)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value).map_err(|e| ApiError::Signing(e.to_string()))
}

/// Session tokens are bearer secrets; only keep their head for logs
fn redact_key_id(key_id: &str) -> String {
    match key_id.strip_prefix("ST$") {
        Some(token) => format!("ST${}...", token.chars().take(8).collect::<String>()),
        None => key_id.to_string(),
    }
}
