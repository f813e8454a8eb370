use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::provider::{DesiredRecord, DnsProvider, ObservedRecord, RecordType, Zone};
use crate::error::{ConfigError, ProviderError};

pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// "A record with the same settings already exists" / "identical record
/// already exists".
const CODE_RECORD_EXISTS: &[u64] = &[81057, 81058];

pub struct CloudflareProvider {
    client: Client,
    api_base: String,
    token: String,
}

impl fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_base", &self.api_base)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: u64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ZoneResult {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RecordResult {
    id: String,
    content: String,
    #[serde(default)]
    ttl: u32,
    #[serde(default)]
    proxied: bool,
}

#[derive(Debug, Serialize)]
struct RecordBody<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: String,
    ttl: u32,
    proxied: bool,
}

impl From<RecordResult> for ObservedRecord {
    fn from(r: RecordResult) -> Self {
        ObservedRecord {
            id: r.id,
            content: r.content,
            ttl: r.ttl,
            proxied: r.proxied,
        }
    }
}

impl CloudflareProvider {
    pub fn new(token: &str, api_base: &str, timeout: Duration) -> Result<Self, ConfigError> {
        if token.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "cloudflare API token must not be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }

    /// Send a request and unwrap the Cloudflare envelope, mapping HTTP and
    /// API failures onto [`ProviderError`].
    async fn call<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T, ProviderError> {
        let response = self
            .authed(request)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("{}: {}", what, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("{}: reading body: {}", what, e)))?;

        if !status.is_success() {
            return Err(classify_status(status, &body, what));
        }

        let envelope: Envelope<T> = serde_json::from_str(&body)
            .map_err(|e| ProviderError::InvalidResponse(format!("{}: {}", what, e)))?;

        if !envelope.success {
            return Err(ProviderError::Validation(format!(
                "{}: {}",
                what,
                describe_errors(&envelope.errors)
            )));
        }

        envelope
            .result
            .ok_or_else(|| ProviderError::InvalidResponse(format!("{}: missing result", what)))
    }
}

fn describe_errors(errors: &[ApiMessage]) -> String {
    if errors.is_empty() {
        return "request rejected".to_string();
    }
    errors
        .iter()
        .map(|e| format!("{} ({})", e.message, e.code))
        .collect::<Vec<_>>()
        .join(", ")
}

fn classify_status(status: StatusCode, body: &str, what: &str) -> ProviderError {
    let errors = serde_json::from_str::<Envelope<serde_json::Value>>(body)
        .map(|e| e.errors)
        .unwrap_or_default();
    let detail = if errors.is_empty() {
        format!("{}: {} {}", what, status, body.trim())
    } else {
        format!("{}: {} {}", what, status, describe_errors(&errors))
    };

    let exists = errors.iter().any(|e| CODE_RECORD_EXISTS.contains(&e.code));

    match status.as_u16() {
        401 | 403 => ProviderError::Auth(detail),
        404 => ProviderError::NotFound(detail),
        409 => ProviderError::Conflict(detail),
        400 if exists => ProviderError::Conflict(detail),
        400 | 422 => ProviderError::Validation(detail),
        429 | 500..=599 => ProviderError::Unavailable(detail),
        _ => ProviderError::Validation(detail),
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn resolve_zone(&self, name: &str) -> Result<Zone, ProviderError> {
        debug!("Looking up zone {}", name);

        let request = self
            .client
            .get(self.url("/zones"))
            .query(&[("name", name)]);
        let zones: Vec<ZoneResult> = self.call(request, "zone lookup").await?;

        let zone = zones
            .into_iter()
            .find(|z| z.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| ProviderError::NotFound(format!("zone {}", name)))?;

        debug!("Resolved zone {} to {}", zone.name, zone.id);
        Ok(Zone {
            id: zone.id,
            name: zone.name,
        })
    }

    async fn find_record(
        &self,
        zone: &Zone,
        hostname: &str,
        record_type: RecordType,
    ) -> Result<Option<ObservedRecord>, ProviderError> {
        let request = self
            .client
            .get(self.url(&format!("/zones/{}/dns_records", zone.id)))
            .query(&[("name", hostname), ("type", record_type.as_str())]);
        let mut records: Vec<RecordResult> = self.call(request, "record lookup").await?;

        match records.len() {
            0 => Ok(None),
            1 => Ok(records.pop().map(ObservedRecord::from)),
            count => Err(ProviderError::AmbiguousRecord {
                name: hostname.to_string(),
                count,
            }),
        }
    }

    async fn create_record(
        &self,
        zone: &Zone,
        record: &DesiredRecord,
        ip: IpAddr,
    ) -> Result<ObservedRecord, ProviderError> {
        let body = record_body(record, ip)?;
        let request = self
            .client
            .post(self.url(&format!("/zones/{}/dns_records", zone.id)))
            .json(&body);
        let created: RecordResult = self.call(request, "record create").await?;
        Ok(created.into())
    }

    async fn update_record(
        &self,
        zone: &Zone,
        record_id: &str,
        record: &DesiredRecord,
        ip: IpAddr,
    ) -> Result<ObservedRecord, ProviderError> {
        let body = record_body(record, ip)?;
        let request = self
            .client
            .put(self.url(&format!("/zones/{}/dns_records/{}", zone.id, record_id)))
            .json(&body);
        let updated: RecordResult = self.call(request, "record update").await?;
        Ok(updated.into())
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}

fn record_body(record: &DesiredRecord, ip: IpAddr) -> Result<RecordBody<'_>, ProviderError> {
    if !record.record_type.accepts(&ip) {
        return Err(ProviderError::Validation(format!(
            "{} record {} cannot hold {}",
            record.record_type, record.hostname, ip
        )));
    }

    Ok(RecordBody {
        record_type: record.record_type.as_str(),
        name: &record.hostname,
        content: ip.to_string(),
        ttl: record.ttl,
        proxied: record.proxied,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desired() -> DesiredRecord {
        DesiredRecord {
            hostname: "wg.example.com".to_string(),
            record_type: RecordType::A,
            ttl: 120,
            proxied: false,
        }
    }

    #[test]
    fn test_token_not_exposed_in_debug() {
        let provider =
            CloudflareProvider::new("secret_token_12345", CLOUDFLARE_API_BASE, Duration::from_secs(5))
                .unwrap();
        let debug_str = format!("{:?}", provider);
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("CloudflareProvider"));
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(CloudflareProvider::new("  ", CLOUDFLARE_API_BASE, Duration::from_secs(5)).is_err());
    }

    #[test]
    fn test_record_body_serialization() {
        let record = desired();
        let body = record_body(&record, "203.0.113.9".parse().unwrap()).unwrap();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "A",
                "name": "wg.example.com",
                "content": "203.0.113.9",
                "ttl": 120,
                "proxied": false
            })
        );
    }

    #[test]
    fn test_record_body_rejects_wrong_family() {
        let record = desired();
        let err = record_body(&record, "2001:db8::1".parse().unwrap()).unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[test]
    fn test_classify_status() {
        let exists = r#"{"success":false,"errors":[{"code":81057,"message":"Record already exists."}],"result":null}"#;
        let invalid = r#"{"success":false,"errors":[{"code":9005,"message":"Content for A record is invalid."}],"result":null}"#;

        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, exists, "create"),
            ProviderError::Conflict(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, invalid, "create"),
            ProviderError::Validation(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "", "zone"),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "", "zone"),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "", "update"),
            ProviderError::NotFound(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::CONFLICT, "", "create"),
            ProviderError::Conflict(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "", "update"),
            ProviderError::Unavailable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "<html>", "update"),
            ProviderError::Unavailable(_)
        ));
    }
}
