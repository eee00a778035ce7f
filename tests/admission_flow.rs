//! End-to-end admission tests for the upload gate.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use upload_gate::admission::{
    AdmissionService, Blacklist, PrivatePolicy, PublicPolicy, PRIVATE_POLICY_KEY,
    PUBLIC_POLICY_KEY,
};
use upload_gate::auth::CredentialVerifier;
use upload_gate::config::GateConfig;
use upload_gate::http::GateServer;
use upload_gate::lifecycle::Shutdown;
use upload_gate::store::SettingStore;

mod common;

struct TestGate {
    url: String,
    service: Arc<AdmissionService>,
    shutdown: Shutdown,
}

async fn start_gate(
    public: PublicPolicy,
    private: PrivatePolicy,
    upstream_delay: Duration,
) -> TestGate {
    let upstream = common::start_mock_upstream(upstream_delay, "stored").await;

    let settings = Arc::new(SettingStore::new(None));
    settings.put(PUBLIC_POLICY_KEY, &public).unwrap();
    settings.put(PRIVATE_POLICY_KEY, &private).unwrap();

    let service = Arc::new(AdmissionService::new(
        settings,
        Arc::new(Blacklist::new(None)),
        Arc::new(CredentialVerifier::new("integration-test-secret")),
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = GateConfig::default();
    config.listener.bind_address = addr.to_string();
    config.upstream.address = upstream.to_string();

    let shutdown = Shutdown::new();
    let (_config_tx, config_updates) = mpsc::unbounded_channel();
    let server = GateServer::new(config, Arc::clone(&service));
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    // Wait for the server to start accepting.
    tokio::time::sleep(Duration::from_millis(100)).await;

    TestGate {
        url: format!("http://{}", addr),
        service,
        shutdown,
    }
}

fn open_public() -> PublicPolicy {
    PublicPolicy {
        enabled: true,
        ..PublicPolicy::default()
    }
}

#[tokio::test]
async fn public_rate_limit_rejects_with_retry_after() {
    let gate = start_gate(
        PublicPolicy {
            enabled: true,
            rate_limit: 2,
            allow_concurrent: true,
            ..PublicPolicy::default()
        },
        PrivatePolicy::default(),
        Duration::ZERO,
    )
    .await;

    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/upload", gate.url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(
        res.headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok()),
        Some("1")
    );

    let res = client
        .post(format!("{}/api/upload", gate.url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let res = client
        .post(format!("{}/api/upload", gate.url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 429);
    let retry_after: u64 = res
        .headers()
        .get("retry-after")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 60);

    gate.shutdown.trigger();
}

#[tokio::test]
async fn blacklisted_ip_is_forbidden() {
    let gate = start_gate(open_public(), PrivatePolicy::default(), Duration::ZERO).await;
    gate.service.blacklist().add("198.51.100.7", "test ban").unwrap();

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/api/upload", gate.url))
        .header("x-forwarded-for", "198.51.100.7")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);

    // The same client from a clean address passes.
    let res = client
        .post(format!("{}/api/upload", gate.url))
        .header("x-forwarded-for", "198.51.100.8")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    gate.shutdown.trigger();
}

#[tokio::test]
async fn public_uploads_are_single_flight() {
    let gate = start_gate(
        PublicPolicy {
            enabled: true,
            rate_limit: 100,
            allow_concurrent: false,
            ..PublicPolicy::default()
        },
        PrivatePolicy::default(),
        Duration::from_millis(400),
    )
    .await;

    let client = reqwest::Client::new();
    let url = format!("{}/api/upload", gate.url);

    let first = tokio::spawn({
        let client = client.clone();
        let url = url.clone();
        async move { client.post(url).send().await }
    });

    // Give the first request time to claim its slot upstream.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = client.post(&url).send().await.unwrap();
    assert_eq!(second.status(), 409);

    let first = first.await.unwrap().unwrap();
    assert_eq!(first.status(), 200);

    // Slot released once the first upload finished.
    let third = client.post(&url).send().await.unwrap();
    assert_eq!(third.status(), 200);

    gate.shutdown.trigger();
}

#[tokio::test]
async fn keyed_clients_use_the_private_policy() {
    // Public uploads disabled entirely; a valid credential still passes.
    let gate = start_gate(
        PublicPolicy::default(),
        PrivatePolicy::default(),
        Duration::ZERO,
    )
    .await;
    let token = gate.service.issue_credential("u1", "tester").unwrap();

    let client = reqwest::Client::new();
    let url = format!("{}/api/upload", gate.url);

    let res = client.post(&url).send().await.unwrap();
    assert_eq!(res.status(), 403, "anonymous uploads should be disabled");

    let res = client
        .post(&url)
        .header("authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    // The key also works through the X-Api-Key header.
    let res = client
        .post(&url)
        .header("x-api-key", &token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    // A tampered credential downgrades to the (disabled) public mode.
    let res = client
        .post(&url)
        .header("authorization", format!("Bearer {}x", token))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);

    gate.shutdown.trigger();
}

#[tokio::test]
async fn oversized_upload_is_rejected_up_front() {
    let gate = start_gate(
        PublicPolicy {
            enabled: true,
            max_file_size: 1024,
            allow_concurrent: true,
            ..PublicPolicy::default()
        },
        PrivatePolicy::default(),
        Duration::ZERO,
    )
    .await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/api/upload", gate.url))
        .body(vec![0u8; 4096])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 413);

    gate.shutdown.trigger();
}

#[tokio::test]
async fn admin_api_requires_credential_and_manages_blacklist() {
    let gate = start_gate(open_public(), PrivatePolicy::default(), Duration::ZERO).await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/api/blacklist", gate.url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    let token = gate.service.issue_credential("admin", "admin").unwrap();
    let auth = format!("Bearer {}", token);

    let res = client
        .post(format!("{}/api/blacklist", gate.url))
        .header("authorization", &auth)
        .json(&serde_json::json!({ "ip": "203.0.113.9", "reason": "abuse" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
    let entry: serde_json::Value = res.json().await.unwrap();
    let id = entry["id"].as_str().unwrap().to_string();

    // Duplicate add conflicts.
    let res = client
        .post(format!("{}/api/blacklist", gate.url))
        .header("authorization", &auth)
        .json(&serde_json::json!({ "ip": "203.0.113.9", "reason": "again" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 409);

    let res = client
        .get(format!("{}/api/blacklist", gate.url))
        .header("authorization", &auth)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let page: serde_json::Value = res.json().await.unwrap();
    assert_eq!(page["total"], 1);

    // The gate now rejects that IP.
    let res = client
        .post(format!("{}/api/upload", gate.url))
        .header("x-forwarded-for", "203.0.113.9")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);

    // Removing the entry restores admission.
    let res = client
        .delete(format!("{}/api/blacklist/{}", gate.url, id))
        .header("authorization", &auth)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let res = client
        .post(format!("{}/api/upload", gate.url))
        .header("x-forwarded-for", "203.0.113.9")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    gate.shutdown.trigger();
}

#[tokio::test]
async fn credential_verify_endpoint_echoes_claims() {
    let gate = start_gate(open_public(), PrivatePolicy::default(), Duration::ZERO).await;
    let token = gate.service.issue_credential("u7", "carol").unwrap();

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/api/auth/verify", gate.url))
        .header("authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let claims: serde_json::Value = res.json().await.unwrap();
    assert_eq!(claims["userId"], "u7");
    assert_eq!(claims["username"], "carol");

    gate.shutdown.trigger();
}

#[tokio::test]
async fn policy_updates_take_effect_without_restart() {
    let gate = start_gate(open_public(), PrivatePolicy::default(), Duration::ZERO).await;
    let token = gate.service.issue_credential("admin", "admin").unwrap();
    let auth = format!("Bearer {}", token);

    let client = reqwest::Client::new();

    // Anonymous uploads pass while the public API is enabled.
    let res = client
        .post(format!("{}/api/upload", gate.url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    // Disable the public API through the admin endpoint.
    let mut disabled = open_public();
    disabled.enabled = false;
    let res = client
        .put(format!("{}/api/config/public", gate.url))
        .header("authorization", &auth)
        .json(&disabled)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 204);

    let res = client
        .post(format!("{}/api/upload", gate.url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);

    gate.shutdown.trigger();
}
