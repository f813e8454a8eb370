mod common;

use std::net::IpAddr;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{envelope, failure, mount_lookup, mount_zone, record_json, TOKEN, ZONE_ID};
use zonesyncd::dns::{CloudflareProvider, DesiredRecord, DnsProvider, RecordType, Zone};
use zonesyncd::error::ProviderError;

fn provider(server: &MockServer) -> CloudflareProvider {
    CloudflareProvider::new(TOKEN, &server.uri(), Duration::from_millis(500)).unwrap()
}

fn zone() -> Zone {
    Zone {
        id: ZONE_ID.to_string(),
        name: "example.com".to_string(),
    }
}

fn desired(hostname: &str) -> DesiredRecord {
    DesiredRecord {
        hostname: hostname.to_string(),
        record_type: RecordType::A,
        ttl: 120,
        proxied: false,
    }
}

fn ip() -> IpAddr {
    "203.0.113.9".parse().unwrap()
}

#[tokio::test]
async fn test_resolve_zone_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .and(query_param("name", "example.com"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([
            { "id": ZONE_ID, "name": "example.com" }
        ]))))
        .expect(1)
        .mount(&server)
        .await;

    let zone = provider(&server).resolve_zone("example.com").await.unwrap();
    assert_eq!(zone.id, ZONE_ID);
    assert_eq!(zone.name, "example.com");
}

#[tokio::test]
async fn test_resolve_zone_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([]))))
        .mount(&server)
        .await;

    let err = provider(&server).resolve_zone("example.com").await.unwrap_err();
    assert!(matches!(err, ProviderError::NotFound(_)), "{:?}", err);
}

#[tokio::test]
async fn test_rejected_token_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(failure(9109, "Invalid access token")),
        )
        .mount(&server)
        .await;

    let err = provider(&server).resolve_zone("example.com").await.unwrap_err();
    assert!(matches!(err, ProviderError::Auth(ref m) if m.contains("Invalid access token")));
}

#[tokio::test]
async fn test_server_error_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream connect error"))
        .mount(&server)
        .await;

    let err = provider(&server).resolve_zone("example.com").await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_slow_provider_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(envelope(json!([])))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let err = provider(&server).resolve_zone("example.com").await.unwrap_err();
    assert!(matches!(err, ProviderError::Unavailable(_)), "{:?}", err);
}

#[tokio::test]
async fn test_unsuccessful_envelope_is_validation_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(ResponseTemplate::new(200).set_body_json(failure(1001, "bad request")))
        .mount(&server)
        .await;

    let err = provider(&server).resolve_zone("example.com").await.unwrap_err();
    assert!(matches!(err, ProviderError::Validation(_)), "{:?}", err);
}

#[tokio::test]
async fn test_garbage_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = provider(&server).resolve_zone("example.com").await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidResponse(_)), "{:?}", err);
}

#[tokio::test]
async fn test_find_record_absent_is_none() {
    let server = MockServer::start().await;
    mount_lookup(&server, "vpn.example.com", vec![]).await;

    let found = provider(&server)
        .find_record(&zone(), "vpn.example.com", RecordType::A)
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_find_record_present() {
    let server = MockServer::start().await;
    mount_lookup(
        &server,
        "wg.example.com",
        vec![record_json("rec-1", "wg.example.com", "203.0.113.5", 300)],
    )
    .await;

    let found = provider(&server)
        .find_record(&zone(), "wg.example.com", RecordType::A)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, "rec-1");
    assert_eq!(found.content, "203.0.113.5");
    assert_eq!(found.ttl, 300);
}

#[tokio::test]
async fn test_find_record_multiple_matches_is_error() {
    let server = MockServer::start().await;
    mount_lookup(
        &server,
        "wg.example.com",
        vec![
            record_json("rec-1", "wg.example.com", "203.0.113.5", 300),
            record_json("rec-2", "wg.example.com", "203.0.113.6", 300),
        ],
    )
    .await;

    let err = provider(&server)
        .find_record(&zone(), "wg.example.com", RecordType::A)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProviderError::AmbiguousRecord {
            name: "wg.example.com".to_string(),
            count: 2
        }
    );
}

#[tokio::test]
async fn test_create_record_posts_full_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/zones/{}/dns_records", ZONE_ID)))
        .and(body_json(json!({
            "type": "A",
            "name": "vpn.example.com",
            "content": "203.0.113.9",
            "ttl": 120,
            "proxied": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(record_json(
            "rec-9",
            "vpn.example.com",
            "203.0.113.9",
            120,
        ))))
        .expect(1)
        .mount(&server)
        .await;

    let created = provider(&server)
        .create_record(&zone(), &desired("vpn.example.com"), ip())
        .await
        .unwrap();
    assert_eq!(created.id, "rec-9");
    assert_eq!(created.content, "203.0.113.9");
}

#[tokio::test]
async fn test_create_existing_record_is_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/zones/{}/dns_records", ZONE_ID)))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(failure(81057, "Record already exists.")),
        )
        .mount(&server)
        .await;

    let err = provider(&server)
        .create_record(&zone(), &desired("vpn.example.com"), ip())
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Conflict(_)), "{:?}", err);
}

#[tokio::test]
async fn test_create_invalid_record_is_validation_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/zones/{}/dns_records", ZONE_ID)))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(failure(9005, "Content for A record is invalid.")),
        )
        .mount(&server)
        .await;

    let err = provider(&server)
        .create_record(&zone(), &desired("vpn.example.com"), ip())
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Validation(_)), "{:?}", err);
}

#[tokio::test]
async fn test_update_record_puts_to_record_id() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(format!("/zones/{}/dns_records/rec-1", ZONE_ID)))
        .and(body_json(json!({
            "type": "A",
            "name": "wg.example.com",
            "content": "203.0.113.9",
            "ttl": 120,
            "proxied": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(record_json(
            "rec-1",
            "wg.example.com",
            "203.0.113.9",
            120,
        ))))
        .expect(1)
        .mount(&server)
        .await;

    let updated = provider(&server)
        .update_record(&zone(), "rec-1", &desired("wg.example.com"), ip())
        .await
        .unwrap();
    assert_eq!(updated.content, "203.0.113.9");
}

#[tokio::test]
async fn test_update_vanished_record_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(format!("/zones/{}/dns_records/rec-1", ZONE_ID)))
        .respond_with(ResponseTemplate::new(404).set_body_json(failure(81044, "Record does not exist.")))
        .mount(&server)
        .await;

    let err = provider(&server)
        .update_record(&zone(), "rec-1", &desired("wg.example.com"), ip())
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::NotFound(_)), "{:?}", err);
}

#[tokio::test]
async fn test_rate_limit_is_unavailable() {
    let server = MockServer::start().await;
    mount_zone(&server).await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(429).set_body_json(failure(971, "Please wait and consider throttling your request speed")))
        .mount(&server)
        .await;

    let p = provider(&server);
    let zone = p.resolve_zone("example.com").await.unwrap();
    let err = p
        .update_record(&zone, "rec-1", &desired("wg.example.com"), ip())
        .await
        .unwrap_err();
    assert!(err.is_transient());
}
