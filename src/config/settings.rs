use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dns::{DesiredRecord, RecordType};
use crate::error::ConfigError;

const MIN_TTL: u32 = 60;
const MAX_TTL: u32 = 86400;
/// Cloudflare's "automatic" TTL.
const AUTO_TTL: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub zone: String,
    pub hostnames: Vec<String>,
    #[serde(default = "default_record_type")]
    pub record_type: RecordType,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    #[serde(default)]
    pub proxied: bool,
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default = "default_run_on_start")]
    pub run_on_start: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_log: Option<PathBuf>,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default = "default_ip_sources")]
    pub ip_sources: Vec<IpSourceConfig>,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_name")]
    pub name: String,
    /// Never written back out when the config is displayed.
    #[serde(default, skip_serializing)]
    pub credential: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum IpSourceConfig {
    Http { url: String },
    Interface,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff: String,
    #[serde(default = "default_max_backoff")]
    pub max_backoff: String,
}

/// Parsed form of [`RetryConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

fn default_record_type() -> RecordType {
    RecordType::A
}

fn default_ttl() -> u32 {
    120
}

fn default_interval() -> String {
    "5m".to_string()
}

fn default_run_on_start() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_provider_name() -> String {
    "cloudflare".to_string()
}

fn default_request_timeout() -> String {
    "10s".to_string()
}

fn default_ip_sources() -> Vec<IpSourceConfig> {
    vec![
        IpSourceConfig::Http {
            url: "https://api.ipify.org".to_string(),
        },
        IpSourceConfig::Http {
            url: "https://icanhazip.com".to_string(),
        },
    ]
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> String {
    "1s".to_string()
}

fn default_max_backoff() -> String {
    "30s".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            credential: None,
            api_base: None,
            request_timeout: default_request_timeout(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

impl Settings {
    /// Read, parse and validate the config file. Nothing touches the network
    /// until this has succeeded.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let settings: Settings = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn config_dir() -> PathBuf {
        #[cfg(unix)]
        {
            PathBuf::from("/etc/zonesyncd")
        }
        #[cfg(windows)]
        {
            PathBuf::from(r"C:\ProgramData\zonesyncd")
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.name.to_lowercase() != "cloudflare" {
            return Err(ConfigError::Invalid(format!(
                "unknown DNS provider: {}",
                self.provider.name
            )));
        }

        if self.ttl != AUTO_TTL && !(MIN_TTL..=MAX_TTL).contains(&self.ttl) {
            return Err(ConfigError::Invalid(format!(
                "ttl must be 1 (automatic) or between {} and {}, got {}",
                MIN_TTL, MAX_TTL, self.ttl
            )));
        }

        if self.ip_sources.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one ip source is required".to_string(),
            ));
        }
        for source in &self.ip_sources {
            if let IpSourceConfig::Http { url } = source {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ConfigError::Invalid(format!(
                        "ip source url must be http(s): {}",
                        url
                    )));
                }
            }
        }

        if self.interval()?.is_zero() {
            return Err(ConfigError::Invalid("interval must be non-zero".to_string()));
        }
        if self.request_timeout()?.is_zero() {
            return Err(ConfigError::Invalid(
                "provider.request_timeout must be non-zero".to_string(),
            ));
        }
        self.retry_policy()?;
        self.desired_records()?;

        Ok(())
    }

    /// Zone name without trailing dot, lowercased.
    pub fn zone_name(&self) -> Result<String, ConfigError> {
        let zone = normalize(&self.zone);
        if zone.is_empty() {
            return Err(ConfigError::Invalid("zone must not be empty".to_string()));
        }
        if !is_valid_name(&zone) {
            return Err(ConfigError::Invalid(format!("invalid zone name: {}", self.zone)));
        }
        Ok(zone)
    }

    /// Fully-qualified desired records, in configuration order.
    pub fn desired_records(&self) -> Result<Vec<DesiredRecord>, ConfigError> {
        let zone = self.zone_name()?;

        if self.hostnames.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one hostname is required".to_string(),
            ));
        }

        let mut records: Vec<DesiredRecord> = Vec::with_capacity(self.hostnames.len());
        for host in &self.hostnames {
            let hostname = qualify(&zone, host)?;
            if records.iter().any(|r| r.hostname == hostname) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate hostname: {}",
                    hostname
                )));
            }
            records.push(DesiredRecord {
                hostname,
                record_type: self.record_type,
                ttl: self.ttl,
                proxied: self.proxied,
            });
        }

        Ok(records)
    }

    pub fn interval(&self) -> Result<Duration, ConfigError> {
        parse_duration("interval", &self.interval)
    }

    pub fn request_timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration("provider.request_timeout", &self.provider.request_timeout)
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        let initial_backoff = parse_duration("retry.initial_backoff", &self.retry.initial_backoff)?;
        let max_backoff = parse_duration("retry.max_backoff", &self.retry.max_backoff)?;
        if max_backoff < initial_backoff {
            return Err(ConfigError::Invalid(
                "retry.max_backoff must not be shorter than retry.initial_backoff".to_string(),
            ));
        }

        Ok(RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_backoff,
            max_backoff,
        })
    }

    /// The configured credential, if set inline. Falls back to the
    /// credential store in the daemon.
    pub fn inline_credential(&self) -> Option<&str> {
        self.provider
            .credential
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

fn parse_duration(field: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim())
        .map_err(|e| ConfigError::Invalid(format!("{}: invalid duration {:?}: {}", field, value, e)))
}

fn normalize(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Turn a configured hostname into a name inside `zone`. `@` and the zone
/// itself mean the apex, single labels are relative to the zone, and dotted
/// names must already end in the zone.
fn qualify(zone: &str, host: &str) -> Result<String, ConfigError> {
    let name = normalize(host);
    if name.is_empty() {
        return Err(ConfigError::Invalid("hostname must not be empty".to_string()));
    }

    let fqdn = if name == "@" || name == zone {
        zone.to_string()
    } else if name.ends_with(&format!(".{}", zone)) {
        name
    } else if name.contains('.') {
        return Err(ConfigError::Invalid(format!(
            "hostname {} is not inside zone {}",
            host.trim(),
            zone
        )));
    } else {
        format!("{}.{}", name, zone)
    };

    if !is_valid_name(&fqdn) {
        return Err(ConfigError::Invalid(format!("invalid hostname: {}", host.trim())));
    }
    Ok(fqdn)
}

fn is_valid_name(name: &str) -> bool {
    name.len() <= 253
        && name.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '*')
        })
}
