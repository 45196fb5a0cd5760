//! Integration tests for the session lifecycle across restarts
//!
//! Each test drives several `SessionBootstrapper::run` calls against one
//! credential file, the way consecutive process starts would.

use serde_json::{json, Value};
use session_relay::session::{
    AckPolicy, AuthState, BootstrapError, BootstrapState, CallLog, CloseReason, CredentialStore,
    Event, InboundMessage, InboxRelay, MockProtocolClient, MockPublisher, MockQrEncoder, QrHandler,
    SessionBootstrapper, SessionBranch, SessionOutcome,
};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

struct Deployment {
    _dir: TempDir,
    store: CredentialStore,
    qr_path: PathBuf,
    publisher: MockPublisher,
    encoder: MockQrEncoder,
}

impl Deployment {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        Self {
            store: CredentialStore::new(dir.path().join("session.json")),
            qr_path: dir.path().join("qr.png"),
            publisher: MockPublisher::new(),
            encoder: MockQrEncoder::new(),
            _dir: dir,
        }
    }

    /// One process start against `client`
    async fn start(
        &self,
        client: &MockProtocolClient,
        ack_policy: AckPolicy,
    ) -> (Result<SessionOutcome, BootstrapError>, SessionBootstrapper<MockProtocolClient>) {
        let relay = InboxRelay::new(Arc::new(self.publisher.clone()), "wa.inbox")
            .with_ack_policy(ack_policy);
        let mut bootstrapper = SessionBootstrapper::new(
            client.clone(),
            self.store.clone(),
            QrHandler::new(self.encoder.clone(), &self.qr_path),
            relay,
        );
        let outcome = bootstrapper.run().await;
        (outcome, bootstrapper)
    }
}

fn identity() -> AuthState {
    AuthState::from_json(json!({
        "me": { "id": "15550001111:4@s.whatsapp.net", "name": "relay" },
        "registrationId": 4711
    }))
    .unwrap()
}

fn message(id: &str) -> Event {
    let Value::Object(attrs) = json!({ "id": id, "remoteJid": "1555@s.whatsapp.net" }) else {
        unreachable!()
    };
    Event::Inbox(InboundMessage::new(attrs))
}

#[tokio::test]
async fn test_pair_then_resume_then_logout_then_pair_again() {
    let deployment = Deployment::new();

    // First start: no file, pair via QR, relay one message, disconnect
    let client = MockProtocolClient::new();
    client.add_pairing_event(Event::Qr(vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]));
    client.set_state_after_authentication(identity());
    client.add_event(message("m1"));
    client.add_event(Event::Close(CloseReason::disconnected("connection lost")));

    let (outcome, bootstrapper) = deployment.start(&client, AckPolicy::Always).await;
    assert_eq!(outcome.unwrap(), SessionOutcome::Closed { logged_out: false });
    assert_eq!(bootstrapper.branch(), Some(SessionBranch::Fresh));
    assert_eq!(
        std::fs::read(&deployment.qr_path).unwrap(),
        MockQrEncoder::image_for(b"1,2,3")
    );
    assert_eq!(deployment.store.load().unwrap(), Some(identity()));

    // Second start: resume with stored credentials, then the phone logs out
    let client = MockProtocolClient::new();
    client.add_event(message("m2"));
    client.add_event(Event::Close(CloseReason::logged_out()));

    let (outcome, bootstrapper) = deployment.start(&client, AckPolicy::Always).await;
    assert_eq!(outcome.unwrap(), SessionOutcome::Closed { logged_out: true });
    assert_eq!(bootstrapper.branch(), Some(SessionBranch::Resume));
    assert_eq!(client.connect_seeds(), vec![Some(identity())]);
    assert!(!deployment.store.path().exists());

    // Third start: pairing again
    let client = MockProtocolClient::new();
    client.add_pairing_event(Event::Qr(vec![b"4".to_vec(), b"5".to_vec()]));
    client.add_event(Event::Close(CloseReason::disconnected("bye")));

    let (outcome, bootstrapper) = deployment.start(&client, AckPolicy::Always).await;
    assert_eq!(outcome.unwrap(), SessionOutcome::Closed { logged_out: false });
    assert_eq!(bootstrapper.branch(), Some(SessionBranch::Fresh));
    assert_eq!(client.connect_seeds(), vec![None]);

    let encoded: Vec<Vec<u8>> = deployment.encoder.calls().into_iter().map(|c| c.data).collect();
    assert_eq!(encoded, vec![b"1,2,3".to_vec(), b"4,5".to_vec()]);

    let published: Vec<String> = deployment
        .publisher
        .published()
        .into_iter()
        .map(|(key, payload)| format!("{}:{}", key, payload["id"].as_str().unwrap()))
        .collect();
    assert_eq!(published, ["wa.inbox:m1", "wa.inbox:m2"]);
}

#[tokio::test]
async fn test_relay_order_and_acknowledgments() {
    let deployment = Deployment::new();
    deployment.store.save(&identity()).unwrap();

    let log = CallLog::new();
    let client = MockProtocolClient::with_log(log.clone());
    let publisher = MockPublisher::with_log(log.clone());
    let deployment = Deployment {
        publisher,
        ..deployment
    };

    for id in ["a", "b", "c"] {
        client.add_event(message(id));
    }
    client.add_event(Event::Close(CloseReason::disconnected("done")));

    // The first publish fails; it is still acknowledged under `Always`
    deployment.publisher.fail_next(1);
    let (outcome, _) = deployment.start(&client, AckPolicy::Always).await;
    assert!(outcome.is_ok());

    assert_eq!(
        log.entries(),
        [
            "connect:seeded",
            "authenticate",
            "publish:a",
            "read_receipt:a",
            "publish:b",
            "read_receipt:b",
            "publish:c",
            "read_receipt:c",
        ]
    );
    let published: Vec<Value> = deployment
        .publisher
        .published()
        .into_iter()
        .map(|(_, payload)| payload["id"].clone())
        .collect();
    assert_eq!(published, [json!("b"), json!("c")]);
}

#[tokio::test]
async fn test_after_publish_policy_skips_failed_messages() {
    let deployment = Deployment::new();
    deployment.store.save(&identity()).unwrap();

    let client = MockProtocolClient::new();
    client.add_event(message("lost"));
    client.add_event(message("kept"));
    client.add_event(Event::Close(CloseReason::disconnected("done")));
    deployment.publisher.fail_next(1);

    let (outcome, _) = deployment.start(&client, AckPolicy::AfterPublish).await;
    assert!(outcome.is_ok());

    let receipts: Vec<String> = client.connections()[0]
        .receipts()
        .iter()
        .map(|m| m.id().unwrap().to_string())
        .collect();
    assert_eq!(receipts, ["kept"]);
}

#[tokio::test]
async fn test_failed_authentication_leaves_store_untouched() {
    let deployment = Deployment::new();
    let mut unpaired = AuthState::new();
    unpaired.insert("noiseKey", json!({ "private": "AAAA" }));
    deployment.store.save(&unpaired).unwrap();
    let before = std::fs::read(deployment.store.path()).unwrap();

    let client = MockProtocolClient::new();
    client.fail_authentication("stream errored out");
    client.add_event(message("ignored"));
    client.add_event(Event::Close(CloseReason::disconnected("done")));

    let (outcome, bootstrapper) = deployment.start(&client, AckPolicy::Always).await;
    assert!(matches!(
        outcome.unwrap(),
        SessionOutcome::AuthenticationFailed { .. }
    ));
    assert_eq!(bootstrapper.state(), BootstrapState::Failed);
    // Resume branch, but the seed has no identity, so pairing stays possible
    assert_eq!(bootstrapper.branch(), Some(SessionBranch::Resume));
    assert_eq!(std::fs::read(deployment.store.path()).unwrap(), before);
    assert!(deployment.publisher.published().is_empty());
}

#[tokio::test]
async fn test_corrupt_file_refuses_to_start() {
    let deployment = Deployment::new();
    std::fs::write(deployment.store.path(), b"{\"me\": ").unwrap();

    let client = MockProtocolClient::new();
    let (outcome, bootstrapper) = deployment.start(&client, AckPolicy::Always).await;

    assert!(matches!(outcome, Err(BootstrapError::CorruptState(_))));
    assert_eq!(bootstrapper.state(), BootstrapState::Idle);
    assert!(client.connect_seeds().is_empty());
    // The corrupt file is left for the operator to inspect
    assert!(deployment.store.path().exists());
}
