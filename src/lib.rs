//! cipower
//!
//! Starts, stops or toggles a single OCI container instance and waits for
//! it to settle in the expected lifecycle state.
//!
//! - [`reconciler`] - decision table and command/wait control loop
//! - [`poller`] - fixed-interval, cancellable wait for a lifecycle state
//! - [`instance`] - status and command capabilities
//! - [`notification`] - best-effort failure notifications
//! - [`secrets`] - OCID lookup from a vault secret
//! - [`adapter`] - function-style HTTP entry point
//! - [`oci`] - credentials, HTTP and endpoints for the OCI REST APIs

pub mod adapter;
pub mod config;
pub mod error;
pub mod instance;
pub mod notification;
pub mod oci;
pub mod poller;
pub mod reconciler;
pub mod secrets;

pub use error::{AdapterError, ApiError, CommandError, CredentialError, PollError, StatusError};
pub use instance::{Command, CommandClient, LifecycleState, StatusClient};
pub use notification::Notifier;
pub use poller::{PollConfig, StatePoller};
pub use reconciler::{Action, Outcome, OutcomeKind, ReconcileRequest, Reconciler};
pub use secrets::SecretReader;
