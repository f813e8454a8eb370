use std::fmt;
use std::net::IpAddr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum RecordType {
    A,
    AAAA,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
        }
    }

    /// Whether `ip` is the address family this record type holds.
    pub fn accepts(&self, ip: &IpAddr) -> bool {
        matches!(
            (self, ip),
            (RecordType::A, IpAddr::V4(_)) | (RecordType::AAAA, IpAddr::V6(_))
        )
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    pub id: String,
    pub name: String,
}

/// What configuration says a hostname should look like. The address is
/// supplied separately, once per cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredRecord {
    pub hostname: String,
    pub record_type: RecordType,
    pub ttl: u32,
    pub proxied: bool,
}

/// A record as the provider currently holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedRecord {
    pub id: String,
    pub content: String,
    pub ttl: u32,
    pub proxied: bool,
}

impl ObservedRecord {
    /// Compares as addresses so `2001:db8::1` matches `2001:0db8::0001`.
    pub fn points_to(&self, ip: &IpAddr) -> bool {
        match self.content.trim().parse::<IpAddr>() {
            Ok(current) => current == *ip,
            Err(_) => false,
        }
    }
}

/// Thin client over a DNS provider's API. Every call is a single attempt;
/// retry policy belongs to the caller.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Look up a zone by name.
    async fn resolve_zone(&self, name: &str) -> Result<Zone, ProviderError>;

    /// Find the record for `hostname`/`record_type`. Absence is `Ok(None)`.
    async fn find_record(
        &self,
        zone: &Zone,
        hostname: &str,
        record_type: RecordType,
    ) -> Result<Option<ObservedRecord>, ProviderError>;

    /// Create a record pointing at `ip`.
    async fn create_record(
        &self,
        zone: &Zone,
        record: &DesiredRecord,
        ip: IpAddr,
    ) -> Result<ObservedRecord, ProviderError>;

    /// Replace the value of an existing record.
    async fn update_record(
        &self,
        zone: &Zone,
        record_id: &str,
        record: &DesiredRecord,
        ip: IpAddr,
    ) -> Result<ObservedRecord, ProviderError>;

    fn provider_name(&self) -> &'static str;
}
