//! OCI API interaction module
//!
//! Everything that talks to Oracle Cloud Infrastructure lives here:
//! credential resolution, the HTTP wrapper and the service client.
//!
//! # Module Structure
//!
//! - [`auth`] - Resource principal / config-file credential chain
//! - [`client`] - Main OCI client and per-service endpoint helpers
//! - [`http`] - HTTP utilities for REST API calls
//! - [`signer`] - `rsa-sha256` HTTP request signatures
//!
//! # Example
//!
//! ```ignore
//! use cipower::oci::client::OciClient;
//!
//! fn example(config: &cipower::config::Config) -> anyhow::Result<()> {
//!     let client = OciClient::connect(config)?;
//!     let url = client.container_instance_url("ocid1.computecontainerinstance.oc1..aaaa");
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod signer;
