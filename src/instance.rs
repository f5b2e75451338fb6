//! Container instance status and lifecycle commands
//!
//! [`StatusClient`] and [`CommandClient`] are the only view the reconciler
//! has of the provider. [`OciClient`] implements both against the
//! Container Instances REST API.

use crate::error::{ApiError, CommandError, StatusError};
use crate::oci::client::OciClient;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// Provider-reported lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Active,
    Inactive,
    /// Transitional or failure states (`CREATING`, `STOPPING`, `FAILED`, ...)
    Other(String),
}

impl LifecycleState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Self::Active,
            "INACTIVE" => Self::Inactive,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle command the provider accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Start,
    Stop,
}

impl Command {
    /// State the instance settles in once the command completes
    pub fn target_state(self) -> LifecycleState {
        match self {
            Self::Start => LifecycleState::Active,
            Self::Stop => LifecycleState::Inactive,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::Stop => "Stop",
        }
    }

    pub fn past_tense(self) -> &'static str {
        match self {
            Self::Start => "started",
            Self::Stop => "stopped",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reads the current lifecycle state of a container instance
#[async_trait]
pub trait StatusClient: Send + Sync {
    async fn lifecycle_state(&self, resource_id: &str) -> Result<LifecycleState, StatusError>;
}

/// Issues start/stop without waiting for the instance to settle
#[async_trait]
pub trait CommandClient: Send + Sync {
    async fn issue(&self, resource_id: &str, command: Command) -> Result<(), CommandError>;

    async fn start(&self, resource_id: &str) -> Result<(), CommandError> {
        self.issue(resource_id, Command::Start).await
    }

    async fn stop(&self, resource_id: &str) -> Result<(), CommandError> {
        self.issue(resource_id, Command::Stop).await
    }
}

/// Pull `lifecycleState` out of a GetContainerInstance response
fn lifecycle_state_from(body: &Value) -> Result<LifecycleState, ApiError> {
    body.get("lifecycleState")
        .and_then(|v| v.as_str())
        .map(LifecycleState::parse)
        .ok_or_else(|| ApiError::Unexpected("response has no lifecycleState".to_string()))
}

#[async_trait]
impl StatusClient for OciClient {
    async fn lifecycle_state(&self, resource_id: &str) -> Result<LifecycleState, StatusError> {
        let url = self.container_instance_url(resource_id);
        let wrap = |source| StatusError {
            resource_id: resource_id.to_string(),
            source,
        };

        let body = self.get(&url).await.map_err(wrap)?;
        lifecycle_state_from(&body).map_err(wrap)
    }
}

#[async_trait]
impl CommandClient for OciClient {
    async fn issue(&self, resource_id: &str, command: Command) -> Result<(), CommandError> {
        let url = self.container_instance_action_url(resource_id, command.as_str());
        tracing::info!("Requesting {} of container instance {}", command, resource_id);

        self.post(&url, None).await.map(|_| ()).map_err(|source| {
            tracing::error!(
                "Failed to {} container instance {}: {}",
                command,
                resource_id,
                source
            );
            CommandError {
                command,
                resource_id: resource_id.to_string(),
                source,
            }
        })
    }
}
