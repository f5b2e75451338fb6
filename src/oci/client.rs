//! OCI Client
//!
//! Main client for interacting with OCI APIs, combining authentication,
//! HTTP functionality and per-service endpoints.

use super::auth::OciCredentials;
use super::http::OciHttpClient;
use crate::config::Config;
use crate::error::ApiError;
use anyhow::{Context, Result};
use serde_json::Value;
use url::Url;

/// Container Instances API version
const CONTAINER_INSTANCES_API: &str = "20210415";
/// Vault Secrets API version
const SECRETS_API: &str = "20190301";
/// Notifications API version
const NOTIFICATIONS_API: &str = "20181201";

/// Base URLs of the services this tool talks to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub container_instances: String,
    pub secrets: String,
    pub notification: String,
}

impl Endpoints {
    /// Public endpoints for a region, e.g. `eu-frankfurt-1`
    pub fn for_region(region: &str) -> Result<Self, ApiError> {
        let build = |service: &str| -> Result<String, ApiError> {
            let url = Url::parse(&format!("https://{}.{}.oci.oraclecloud.com", service, region))?;
            Ok(trim_base(url.as_str()))
        };

        Ok(Self {
            container_instances: build("compute-containers")?,
            secrets: build("secrets.vaults")?,
            notification: build("notification")?,
        })
    }

    /// Route every service to one base URL (local proxies, mocks)
    pub fn single(base: &str) -> Result<Self, ApiError> {
        let url = Url::parse(base)?;
        let base = trim_base(url.as_str());
        Ok(Self {
            container_instances: base.clone(),
            secrets: base.clone(),
            notification: base,
        })
    }
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Main OCI client
#[derive(Clone)]
pub struct OciClient {
    pub credentials: OciCredentials,
    pub http: OciHttpClient,
    pub endpoints: Endpoints,
}

impl OciClient {
    /// Resolve credentials and endpoints from configuration
    pub fn connect(config: &Config) -> Result<Self> {
        let credentials =
            OciCredentials::resolve(&config.effective_oci_config_file(), &config.effective_profile())
                .context("Failed to resolve OCI credentials")?;

        let endpoints = match config.endpoint.as_deref() {
            Some(base) => Endpoints::single(base).context("Invalid endpoint override")?,
            None => {
                let region = config
                    .region
                    .clone()
                    .or_else(|| credentials.region())
                    .context("No OCI region configured. Set CIPOWER_REGION or use --region")?;
                Endpoints::for_region(&region)
                    .with_context(|| format!("Invalid region '{}'", region))?
            }
        };

        tracing::info!(
            "Connected via {} credentials to {}",
            credentials.provider_name(),
            endpoints.container_instances
        );

        Self::from_parts(credentials, endpoints)
    }

    /// Build from already-resolved parts
    pub fn from_parts(credentials: OciCredentials, endpoints: Endpoints) -> Result<Self> {
        let http = OciHttpClient::new().context("Failed to create HTTP client")?;
        Ok(Self {
            credentials,
            http,
            endpoints,
        })
    }

    /// Make a GET request to an OCI API
    pub async fn get(&self, url: &str) -> Result<Value, ApiError> {
        let signer = self.credentials.get_signer().await?;
        self.http.get(url, &signer).await
    }

    /// Make a POST request to an OCI API
    pub async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        let signer = self.credentials.get_signer().await?;
        self.http.post(url, &signer, body).await
    }

    // =========================================================================
    // Container Instances API helpers
    // =========================================================================

    /// URL of a single container instance
    pub fn container_instance_url(&self, ocid: &str) -> String {
        format!(
            "{}/{}/containerInstances/{}",
            self.endpoints.container_instances,
            CONTAINER_INSTANCES_API,
            urlencoding::encode(ocid)
        )
    }

    /// URL of a lifecycle action (`start`, `stop`) on a container instance
    pub fn container_instance_action_url(&self, ocid: &str, action: &str) -> String {
        format!("{}/actions/{}", self.container_instance_url(ocid), action)
    }

    // =========================================================================
    // Vault / Notifications API helpers
    // =========================================================================

    /// URL of the current bundle of a secret
    pub fn secret_bundle_url(&self, secret_id: &str) -> String {
        format!(
            "{}/{}/secretbundles/{}",
            self.endpoints.secrets,
            SECRETS_API,
            urlencoding::encode(secret_id)
        )
    }

    /// URL for publishing to a notification topic
    pub fn topic_messages_url(&self, topic_id: &str) -> String {
        format!(
            "{}/{}/topics/{}/messages",
            self.endpoints.notification,
            NOTIFICATIONS_API,
            urlencoding::encode(topic_id)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci::auth::StaticSigner;
    use crate::oci::signer::RequestSigner;
    use std::sync::Arc;

    fn client(base: &str) -> OciClient {
        let pem = include_str!("../../tests/fixtures/test_key.pem");
        let signer = RequestSigner::from_pem("t/u/f", pem).unwrap();
        let credentials = OciCredentials::new(Arc::new(StaticSigner::new(signer, None)));
        OciClient::from_parts(credentials, Endpoints::single(base).unwrap()).unwrap()
    }

    #[test]
    fn test_region_endpoints() {
        let endpoints = Endpoints::for_region("eu-frankfurt-1").unwrap();
        assert_eq!(
            endpoints.container_instances,
            "https://compute-containers.eu-frankfurt-1.oci.oraclecloud.com"
        );
        assert_eq!(
            endpoints.secrets,
            "https://secrets.vaults.eu-frankfurt-1.oci.oraclecloud.com"
        );
    }

    #[test]
    fn test_single_endpoint_trims_slash() {
        let endpoints = Endpoints::single("http://127.0.0.1:9000/").unwrap();
        assert_eq!(endpoints.notification, "http://127.0.0.1:9000");
        assert!(Endpoints::single("not a url").is_err());
    }

    #[test]
    fn test_container_instance_urls() {
        let c = client("http://localhost:1");
        assert_eq!(
            c.container_instance_action_url("ocid1.ci.oc1..x", "stop"),
            "http://localhost:1/20210415/containerInstances/ocid1.ci.oc1..x/actions/stop"
        );
        assert_eq!(
            c.topic_messages_url("ocid1.topic/x"),
            "http://localhost:1/20181201/topics/ocid1.topic%2Fx/messages"
        );
    }
}
