//! OCI Authentication
//!
//! Resolves signing credentials either from the resource principal
//! environment (inside OCI Functions and other OCI compute) or from a
//! profile in the local `~/.oci/config` file.

use super::signer::RequestSigner;
use crate::error::CredentialError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Default profile section in the OCI config file
pub const DEFAULT_PROFILE: &str = "DEFAULT";

const RP_VERSION_ENV: &str = "OCI_RESOURCE_PRINCIPAL_VERSION";
const RP_TOKEN_ENV: &str = "OCI_RESOURCE_PRINCIPAL_RPST";
const RP_PRIVATE_PEM_ENV: &str = "OCI_RESOURCE_PRINCIPAL_PRIVATE_PEM";
const RP_REGION_ENV: &str = "OCI_RESOURCE_PRINCIPAL_REGION";

/// Re-read credentials this long before the assumed expiry
const SIGNER_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Resource principal tokens are rotated by the platform well within this
const DEFAULT_SIGNER_TTL: Duration = Duration::from_secs(15 * 60);

/// A source of request-signing credentials
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Region the credentials belong to, if the source knows it
    fn region(&self) -> Option<String>;

    /// Load the current key material and build a signer
    async fn signer(&self) -> Result<RequestSigner, CredentialError>;
}

/// Where credential material lives: inline or in a file the platform rotates
#[derive(Debug, Clone, PartialEq, Eq)]
enum Material {
    Inline(String),
    File(PathBuf),
}

impl Material {
    /// Resource principal variables hold either the value or an absolute path to it
    fn from_env_value(raw: &str) -> Self {
        if raw.starts_with('/') {
            Material::File(PathBuf::from(raw))
        } else {
            Material::Inline(raw.trim().to_string())
        }
    }

    async fn read(&self) -> Result<String, CredentialError> {
        match self {
            Material::Inline(value) => Ok(value.clone()),
            Material::File(path) => read_file(path).await,
        }
    }
}

async fn read_file(path: &Path) -> Result<String, CredentialError> {
    tokio::fs::read_to_string(path)
        .await
        .map(|t| t.trim().to_string())
        .map_err(|source| CredentialError::File {
            path: path.to_path_buf(),
            source,
        })
}

/// Credentials injected by the OCI runtime (resource principal v2.2)
#[derive(Debug, Clone)]
pub struct ResourcePrincipal {
    token: Material,
    private_key: Material,
    region: Option<String>,
}

impl ResourcePrincipal {
    /// Build from the process environment
    pub fn from_env() -> Result<Self, CredentialError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CredentialError> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| CredentialError::ResourcePrincipal(format!("{} is not set", key)))
        };

        required(RP_VERSION_ENV)?;
        let token = Material::from_env_value(&required(RP_TOKEN_ENV)?);
        let private_key = Material::from_env_value(&required(RP_PRIVATE_PEM_ENV)?);

        Ok(Self {
            token,
            private_key,
            region: lookup(RP_REGION_ENV).filter(|r| !r.is_empty()),
        })
    }
}

#[async_trait]
impl CredentialProvider for ResourcePrincipal {
    fn name(&self) -> &'static str {
        "resource-principal"
    }

    fn region(&self) -> Option<String> {
        self.region.clone()
    }

    async fn signer(&self) -> Result<RequestSigner, CredentialError> {
        let token = self.token.read().await?;
        let pem = self.private_key.read().await?;
        RequestSigner::from_pem(RequestSigner::session_key_id(&token), &pem)
    }
}

/// Which identity a profile's `key_file` signs for
#[derive(Debug, Clone, PartialEq, Eq)]
enum KeyIdentity {
    /// Token written by `oci session authenticate`
    Session(PathBuf),
    /// API key registered for a user
    ApiKey {
        tenancy: String,
        user: String,
        fingerprint: String,
    },
}

/// Credentials from a profile in the OCI CLI config file
#[derive(Debug, Clone)]
pub struct ProfileCredentials {
    key_file: PathBuf,
    identity: KeyIdentity,
    region: Option<String>,
}

impl ProfileCredentials {
    /// Load `profile` from the config file at `path`
    pub fn from_file(path: &Path, profile: &str) -> Result<Self, CredentialError> {
        let fail = |reason: String| CredentialError::Profile {
            path: path.to_path_buf(),
            profile: profile.to_string(),
            reason,
        };

        if !validate_profile_name(profile) {
            return Err(fail("invalid profile name".to_string()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| fail(e.to_string()))?;
        let section =
            parse_profile(&content, profile).ok_or_else(|| fail("profile not found".to_string()))?;

        let key_file = section
            .get("key_file")
            .ok_or_else(|| fail("no key_file".to_string()))?;
        if section.get("pass_phrase").is_some_and(|p| !p.is_empty()) {
            return Err(fail("encrypted key_file (pass_phrase) is not supported".to_string()));
        }

        let identity = match section.get("security_token_file") {
            Some(token_file) => KeyIdentity::Session(expand_home(token_file)),
            None => {
                let field = |name: &str| {
                    section
                        .get(name)
                        .cloned()
                        .ok_or_else(|| fail(format!("missing '{}'", name)))
                };
                KeyIdentity::ApiKey {
                    tenancy: field("tenancy")?,
                    user: field("user")?,
                    fingerprint: field("fingerprint")?,
                }
            }
        };

        Ok(Self {
            key_file: expand_home(key_file),
            identity,
            region: section.get("region").cloned(),
        })
    }
}

#[async_trait]
impl CredentialProvider for ProfileCredentials {
    fn name(&self) -> &'static str {
        match self.identity {
            KeyIdentity::Session(_) => "session-token",
            KeyIdentity::ApiKey { .. } => "api-key",
        }
    }

    fn region(&self) -> Option<String> {
        self.region.clone()
    }

    async fn signer(&self) -> Result<RequestSigner, CredentialError> {
        let key_id = match &self.identity {
            KeyIdentity::Session(token_file) => {
                RequestSigner::session_key_id(&read_file(token_file).await?)
            }
            KeyIdentity::ApiKey {
                tenancy,
                user,
                fingerprint,
            } => RequestSigner::api_key_id(tenancy, user, fingerprint),
        };
        let pem = read_file(&self.key_file).await?;
        RequestSigner::from_pem(key_id, &pem)
    }
}

/// Fixed signer, for local endpoints and tests
#[derive(Debug, Clone)]
pub struct StaticSigner {
    signer: RequestSigner,
    region: Option<String>,
}

impl StaticSigner {
    pub fn new(signer: RequestSigner, region: Option<String>) -> Self {
        Self { signer, region }
    }
}

#[async_trait]
impl CredentialProvider for StaticSigner {
    fn name(&self) -> &'static str {
        "static"
    }

    fn region(&self) -> Option<String> {
        self.region.clone()
    }

    async fn signer(&self) -> Result<RequestSigner, CredentialError> {
        Ok(self.signer.clone())
    }
}

/// OCI credentials holder with signer caching
#[derive(Clone)]
pub struct OciCredentials {
    provider: Arc<dyn CredentialProvider>,
    signer_cache: Arc<RwLock<Option<CachedSigner>>>,
}

#[derive(Clone)]
struct CachedSigner {
    signer: Arc<RequestSigner>,
    /// When the key material should be re-read (with buffer applied)
    expires_at: Instant,
}

impl CachedSigner {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl OciCredentials {
    /// Wrap an already-built provider
    pub fn new(provider: Arc<dyn CredentialProvider>) -> Self {
        Self {
            provider,
            signer_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Resolve the provider chain: resource principal first, then the
    /// profile file
    pub fn resolve(config_file: &Path, profile: &str) -> Result<Self, CredentialError> {
        let mut tried = Vec::new();

        match ResourcePrincipal::from_env() {
            Ok(rp) => {
                tracing::info!("Using resource principal credentials");
                return Ok(Self::new(Arc::new(rp)));
            }
            Err(e) => {
                tracing::debug!("Resource principal not available: {}", e);
                tried.push(e.to_string());
            }
        }

        match ProfileCredentials::from_file(config_file, profile) {
            Ok(creds) => {
                tracing::info!("Using profile '{}' from {:?}", profile, config_file);
                return Ok(Self::new(Arc::new(creds)));
            }
            Err(e) => {
                tracing::debug!("Config file credentials not available: {}", e);
                tried.push(e.to_string());
            }
        }

        Err(CredentialError::NoProvider {
            tried: tried.join("; "),
        })
    }

    /// Name of the provider in use
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Region reported by the provider
    pub fn region(&self) -> Option<String> {
        self.provider.region()
    }

    /// Get a signer for API calls
    pub async fn get_signer(&self) -> Result<Arc<RequestSigner>, CredentialError> {
        {
            let cache = self.signer_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.signer.clone());
                }
                tracing::debug!("Cached signer stale, re-reading from {}", self.provider.name());
            }
        }

        let signer = Arc::new(self.provider.signer().await?);
        let expires_at = Instant::now() + DEFAULT_SIGNER_TTL - SIGNER_EXPIRY_BUFFER;

        {
            let mut cache = self.signer_cache.write().await;
            *cache = Some(CachedSigner {
                signer: signer.clone(),
                expires_at,
            });
        }

        Ok(signer)
    }
}

/// Default location of the OCI CLI config file
pub fn default_config_file() -> PathBuf {
    if let Ok(path) = std::env::var("OCI_CLI_CONFIG_FILE") {
        return PathBuf::from(path);
    }
    dirs::home_dir()
        .map(|h| h.join(".oci").join("config"))
        .unwrap_or_else(|| PathBuf::from(".oci/config"))
}

/// Profile names are section headers; keep them to a safe character set
fn validate_profile_name(profile: &str) -> bool {
    !profile.is_empty()
        && profile.len() <= 64
        && profile
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// Extract the key/value pairs of `[profile]` from an INI-style config.
/// Keys in `[DEFAULT]` apply to every profile unless overridden.
fn parse_profile(content: &str, profile: &str) -> Option<HashMap<String, String>> {
    let mut found = false;
    let mut current = String::new();
    let mut defaults = HashMap::new();
    let mut values = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = name.trim().to_string();
            found |= current == profile;
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let entry = (key.trim().to_string(), value.trim().to_string());
            if current == profile {
                values.insert(entry.0, entry.1);
            } else if current == DEFAULT_PROFILE {
                defaults.insert(entry.0, entry.1);
            }
        }
    }

    found.then(|| {
        defaults.extend(values);
        defaults
    })
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
