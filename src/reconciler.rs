//! Reconciler
//!
//! Reads the current lifecycle state, decides whether a start or stop is
//! needed for the requested [`Action`], issues at most one command, waits
//! for the instance to settle, and notifies on every failure or skip path.
//!
//! | action | ACTIVE          | INACTIVE          | other        |
//! |--------|-----------------|-------------------|--------------|
//! | start  | already ACTIVE  | start, wait       | skip, notify |
//! | stop   | stop, wait      | already INACTIVE  | skip, notify |
//! | toggle | stop, wait      | start, wait       | skip, notify |

use crate::error::{format_wait, AdapterError, PollError};
use crate::instance::{Command, CommandClient, LifecycleState, StatusClient};
use crate::notification::{notification_body, notify, NotificationKind, Notifier};
use crate::oci::http::format_api_error;
use crate::poller::{PollConfig, StatePoller};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// What the caller asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Action {
    Start,
    Stop,
    #[default]
    Toggle,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Toggle => "toggle",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::Stop => "Stop",
            Self::Toggle => "Toggle",
        }
    }
}

impl FromStr for Action {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "toggle" => Ok(Self::Toggle),
            other => Err(AdapterError::InvalidAction(other.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of applying the decision table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Issue(Command),
    AlreadySatisfied(LifecycleState),
    Skip(LifecycleState),
}

/// Decide what to do for `action` given the observed `state`
pub fn decide(action: Action, state: &LifecycleState) -> Decision {
    match (action, state) {
        (_, LifecycleState::Other(_)) => Decision::Skip(state.clone()),
        (Action::Start, LifecycleState::Active) | (Action::Stop, LifecycleState::Inactive) => {
            Decision::AlreadySatisfied(state.clone())
        }
        (Action::Start | Action::Toggle, LifecycleState::Inactive) => Decision::Issue(Command::Start),
        (Action::Stop | Action::Toggle, LifecycleState::Active) => Decision::Issue(Command::Stop),
    }
}

/// Classification of an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// Command issued and target state observed
    Converged,
    /// Nothing to do
    AlreadySatisfied,
    /// State was neither ACTIVE nor INACTIVE
    Skipped,
    /// Start/stop was rejected
    CommandFailed,
    /// Status could not be read
    StatusUnavailable,
    /// Target state not observed within the wait budget
    TimedOut,
    /// Caller aborted the wait
    Cancelled,
}

/// Human-readable result of one reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub message: String,
}

impl Outcome {
    fn new(kind: OutcomeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.kind, OutcomeKind::Converged | OutcomeKind::AlreadySatisfied)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// One invocation's input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub resource_id: String,
    pub action: Action,
    /// Notification topic; `None` disables notifications
    pub channel: Option<String>,
}

/// The control loop
pub struct Reconciler {
    status: Arc<dyn StatusClient>,
    commands: Arc<dyn CommandClient>,
    notifier: Arc<dyn Notifier>,
    poll: PollConfig,
}

impl Reconciler {
    pub fn new(
        status: Arc<dyn StatusClient>,
        commands: Arc<dyn CommandClient>,
        notifier: Arc<dyn Notifier>,
        poll: PollConfig,
    ) -> Self {
        Self {
            status,
            commands,
            notifier,
            poll,
        }
    }

    /// Bring the instance to the state `request.action` implies
    pub async fn reconcile(&self, request: &ReconcileRequest, cancel: &CancellationToken) -> Outcome {
        let span = tracing::info_span!(
            "reconcile",
            invocation = %uuid::Uuid::new_v4(),
            resource = %request.resource_id,
            action = %request.action,
        );

        async {
            let outcome = self.run(request, cancel).await;
            if outcome.is_success() {
                tracing::info!("{}", outcome);
            } else {
                tracing::warn!(kind = ?outcome.kind, "{}", outcome);
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run(&self, request: &ReconcileRequest, cancel: &CancellationToken) -> Outcome {
        tracing::info!("Checking container instance status...");
        let state = match self.status.lifecycle_state(&request.resource_id).await {
            Ok(state) => state,
            Err(e) => {
                tracing::error!("{}", e);
                let message = format!(
                    "Failed to get container instance status: {}",
                    format_api_error(&e.source)
                );
                self.notify(request, NotificationKind::StatusCheckFailed, &message).await;
                return Outcome::new(OutcomeKind::StatusUnavailable, message);
            }
        };
        tracing::info!("Current container instance status: {}", state);

        match decide(request.action, &state) {
            Decision::AlreadySatisfied(state) => Outcome::new(
                OutcomeKind::AlreadySatisfied,
                format!("Container instance is already {}. No action taken.", state),
            ),
            Decision::Skip(state) => {
                let message = format!("Container instance is in {} state. No action taken.", state);
                self.notify(request, NotificationKind::Skipped(request.action), &message)
                    .await;
                Outcome::new(OutcomeKind::Skipped, message)
            }
            Decision::Issue(command) => self.run_command(request, command, cancel).await,
        }
    }

    async fn run_command(
        &self,
        request: &ReconcileRequest,
        command: Command,
        cancel: &CancellationToken,
    ) -> Outcome {
        let issued = match command {
            Command::Start => self.commands.start(&request.resource_id).await,
            Command::Stop => self.commands.stop(&request.resource_id).await,
        };
        if let Err(e) = issued {
            tracing::error!("{}", e);
            let message = format!(
                "Failed to {} container instance {}.",
                command, request.resource_id
            );
            self.notify(request, NotificationKind::CommandFailed(command), &message)
                .await;
            return Outcome::new(OutcomeKind::CommandFailed, message);
        }

        let target = command.target_state();
        tracing::info!(
            "{} requested. Waiting up to {} for instance to become {}...",
            command.display_name(),
            format_wait(self.poll.max_wait()),
            target
        );

        let poller = StatePoller::new(self.status.as_ref(), self.poll);
        match poller.wait_for(&request.resource_id, &target, cancel).await {
            Ok(_) => Outcome::new(
                OutcomeKind::Converged,
                format!("Container instance has been successfully {}.", command.past_tense()),
            ),
            Err(e @ PollError::Timeout { .. }) => {
                let message = e.to_string();
                self.notify(request, NotificationKind::TimedOut(command), &message)
                    .await;
                Outcome::new(OutcomeKind::TimedOut, message)
            }
            Err(e @ PollError::Cancelled { .. }) => Outcome::new(OutcomeKind::Cancelled, e.to_string()),
            Err(PollError::Status(e)) => {
                tracing::error!("{}", e);
                let message = format!(
                    "{} requested, but failed to get container instance status: {}",
                    command.display_name(),
                    format_api_error(&e.source)
                );
                self.notify(request, NotificationKind::StatusCheckFailed, &message)
                    .await;
                Outcome::new(OutcomeKind::StatusUnavailable, message)
            }
        }
    }

    async fn notify(&self, request: &ReconcileRequest, kind: NotificationKind, message: &str) {
        let body = notification_body(&request.resource_id, message);
        notify(
            self.notifier.as_ref(),
            request.channel.as_deref(),
            &kind.title(),
            &body,
        )
        .await;
    }
}
