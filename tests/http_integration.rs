//! Integration tests for the OCI clients using wiremock
//!
//! These tests run the concrete status, command, secret and notification
//! clients against mocked endpoints, and a full reconciliation on top.

use base64::Engine;
use cipower::oci::auth::{OciCredentials, StaticSigner};
use cipower::oci::client::{Endpoints, OciClient};
use cipower::oci::signer::RequestSigner;
use cipower::secrets::SecretReader;
use cipower::{
    Action, CommandClient, LifecycleState, Notifier, OutcomeKind, PollConfig, ReconcileRequest,
    Reconciler, StatusClient,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CI: &str = "ocid1.computecontainerinstance.oc1.eu-frankfurt-1.aaaa";
const CI_PATH: &str = "/20210415/containerInstances/ocid1.computecontainerinstance.oc1.eu-frankfurt-1.aaaa";
const TOPIC: &str = "ocid1.onstopic.oc1.eu-frankfurt-1.tttt";

const TEST_KEY: &str = include_str!("fixtures/test_key.pem");

/// SHA-256 of an empty body, base64
const EMPTY_BODY_SHA256: &str = "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=";

fn client_for(server: &MockServer) -> Arc<OciClient> {
    let signer = RequestSigner::from_pem(RequestSigner::session_key_id("test-token"), TEST_KEY)
        .expect("fixture key parses");
    let credentials = OciCredentials::new(Arc::new(StaticSigner::new(signer, None)));
    let endpoints = Endpoints::single(&server.uri()).expect("mock uri is a valid url");
    Arc::new(OciClient::from_parts(credentials, endpoints).expect("client builds"))
}

/// Authorization header of the only request the server saw
async fn authorization(server: &MockServer) -> String {
    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 1);
    requests[0]
        .headers
        .get("authorization")
        .expect("authorization header")
        .to_str()
        .expect("ascii header")
        .to_string()
}

fn instance(state: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": CI,
        "displayName": "worker",
        "lifecycleState": state
    }))
}

/// Test module for the status and command clients
mod instance_client_tests {
    use super::*;

    /// Status query is signed and parses lifecycleState
    #[tokio::test]
    async fn test_status_parses_lifecycle_state() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(CI_PATH))
            .and(header_exists("date"))
            .and(header_exists("opc-request-id"))
            .respond_with(instance("INACTIVE"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let state = client.lifecycle_state(CI).await.expect("status succeeds");

        assert_eq!(state, LifecycleState::Inactive);

        let authorization = authorization(&server).await;
        assert!(authorization.starts_with(
            r#"Signature version="1",keyId="ST$test-token",algorithm="rsa-sha256",headers="date (request-target) host",signature=""#
        ));
    }

    /// 404 becomes a StatusError carrying the HTTP status
    #[tokio::test]
    async fn test_status_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(CI_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "code": "NotAuthorizedOrNotFound",
                "message": "Authorization failed or requested resource not found."
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.lifecycle_state(CI).await.unwrap_err();

        assert_eq!(err.source.status_code(), Some(404));
        assert!(err.to_string().contains(CI));
    }

    /// Start posts to the start action and accepts an empty 202
    #[tokio::test]
    async fn test_start_accepts_empty_202() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("{}/actions/start", CI_PATH)))
            .and(header("content-length", "0"))
            .and(header("x-content-sha256", EMPTY_BODY_SHA256))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.start(CI).await.expect("start accepted");

        let authorization = authorization(&server).await;
        assert!(authorization.contains(
            r#"headers="date (request-target) host content-length content-type x-content-sha256""#
        ));
    }

    /// 409 on stop surfaces as a CommandError
    #[tokio::test]
    async fn test_stop_conflict() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("{}/actions/stop", CI_PATH)))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": "IncorrectState",
                "message": "Container instance is in STOPPING state"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.stop(CI).await.unwrap_err();

        assert_eq!(err.source.status_code(), Some(409));
        assert!(err.to_string().starts_with("Failed to stop container instance"));
    }
}

/// Test module for secrets and notifications
mod collaborator_tests {
    use super::*;

    #[tokio::test]
    async fn test_secret_value_is_decoded() {
        let server = MockServer::start().await;
        let content = base64::engine::general_purpose::STANDARD.encode(format!("{}\n", CI));

        Mock::given(method("GET"))
            .and(path("/20190301/secretbundles/ocid1.vaultsecret.oc1..s"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "secretId": "ocid1.vaultsecret.oc1..s",
                "secretBundleContent": {"contentType": "BASE64", "content": content}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(
            client.secret_value("ocid1.vaultsecret.oc1..s").await.as_deref(),
            Some(CI)
        );
    }

    #[tokio::test]
    async fn test_secret_failure_is_absent() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/20190301/secretbundles/ocid1.vaultsecret.oc1..s"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.secret_value("ocid1.vaultsecret.oc1..s").await, None);
    }

    #[tokio::test]
    async fn test_publish_posts_title_and_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("/20181201/topics/{}/messages", TOPIC)))
            .and(body_partial_json(json!({"title": "hello", "body": "world"})))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({
                "messageId": "m-1",
                "topicId": TOPIC
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.publish(TOPIC, "hello", "world").await.expect("publish succeeds");
    }
}

/// End-to-end reconciliation against the mock provider
mod reconcile_tests {
    use super::*;

    fn reconciler(client: &Arc<OciClient>) -> Reconciler {
        Reconciler::new(
            client.clone(),
            client.clone(),
            client.clone(),
            PollConfig::new(Duration::from_millis(10), Duration::from_millis(200)),
        )
    }

    fn request(action: Action) -> ReconcileRequest {
        ReconcileRequest {
            resource_id: CI.to_string(),
            action,
            channel: Some(TOPIC.to_string()),
        }
    }

    #[tokio::test]
    async fn test_toggle_active_stops_and_converges() {
        let server = MockServer::start().await;

        // Decision read, then one transitional poll
        Mock::given(method("GET"))
            .and(path(CI_PATH))
            .respond_with(instance("ACTIVE"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CI_PATH))
            .respond_with(instance("STOPPING"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CI_PATH))
            .respond_with(instance("INACTIVE"))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(format!("{}/actions/stop", CI_PATH)))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(format!("/20181201/topics/{}/messages", TOPIC)))
            .respond_with(ResponseTemplate::new(202))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let outcome = reconciler(&client)
            .reconcile(&request(Action::Toggle), &CancellationToken::new())
            .await;

        assert_eq!(outcome.kind, OutcomeKind::Converged);
        assert_eq!(outcome.message, "Container instance has been successfully stopped.");
    }

    #[tokio::test]
    async fn test_rejected_start_notifies_once() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(CI_PATH))
            .respond_with(instance("INACTIVE"))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(format!("{}/actions/start", CI_PATH)))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(format!("/20181201/topics/{}/messages", TOPIC)))
            .and(body_partial_json(json!({
                "title": "Container Instance Start Command Failed"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let outcome = reconciler(&client)
            .reconcile(&request(Action::Start), &CancellationToken::new())
            .await;

        assert_eq!(outcome.kind, OutcomeKind::CommandFailed);
        assert!(outcome.message.contains(CI));
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_mask_outcome() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(CI_PATH))
            .respond_with(instance("FAILED"))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(format!("/20181201/topics/{}/messages", TOPIC)))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let outcome = reconciler(&client)
            .reconcile(&request(Action::Stop), &CancellationToken::new())
            .await;

        assert_eq!(outcome.kind, OutcomeKind::Skipped);
        assert_eq!(outcome.message, "Container instance is in FAILED state. No action taken.");
    }

    #[tokio::test]
    async fn test_timeout_against_stuck_instance() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(CI_PATH))
            .respond_with(instance("INACTIVE"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CI_PATH))
            .respond_with(instance("CREATING"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{}/actions/start", CI_PATH)))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/20181201/topics/{}/messages", TOPIC)))
            .and(body_partial_json(json!({"title": "Container Instance Start Timed Out"})))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let outcome = reconciler(&client)
            .reconcile(&request(Action::Start), &CancellationToken::new())
            .await;

        assert_eq!(outcome.kind, OutcomeKind::TimedOut);
        assert_eq!(
            outcome.message,
            "Instance did not reach ACTIVE within 200ms. Last state: CREATING"
        );
    }
}
