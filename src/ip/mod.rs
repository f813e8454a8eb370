//! Public address discovery.
//!
//! Sources are tried in configuration order and the first one that answers
//! with a well-formed address of the wanted family wins.

mod external;
mod internal;

pub use external::HttpIpSource;
pub use internal::InterfaceIpSource;

use std::net::IpAddr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::config::IpSourceConfig;
use crate::dns::RecordType;
use crate::error::{ConfigError, IpDiscoveryError};

#[async_trait]
pub trait IpSource: Send + Sync {
    async fn fetch(&self) -> Result<IpAddr>;

    fn describe(&self) -> String;
}

pub struct IpDiscovery {
    sources: Vec<Box<dyn IpSource>>,
}

impl IpDiscovery {
    pub fn new(sources: Vec<Box<dyn IpSource>>) -> Self {
        Self { sources }
    }

    pub fn from_config(configs: &[IpSourceConfig], timeout: Duration) -> Result<Self, ConfigError> {
        let mut sources: Vec<Box<dyn IpSource>> = Vec::with_capacity(configs.len());
        for config in configs {
            match config {
                IpSourceConfig::Http { url } => {
                    let source = HttpIpSource::new(url, timeout).map_err(|e| {
                        ConfigError::Invalid(format!("ip source {}: {}", url, e))
                    })?;
                    sources.push(Box::new(source));
                }
                IpSourceConfig::Interface => sources.push(Box::new(InterfaceIpSource)),
            }
        }
        Ok(Self::new(sources))
    }

    pub fn sources(&self) -> impl Iterator<Item = String> + '_ {
        self.sources.iter().map(|s| s.describe())
    }

    /// Ask each source in turn for an address usable in a `record_type` record.
    pub async fn discover(&self, record_type: RecordType) -> Result<IpAddr, IpDiscoveryError> {
        if self.sources.is_empty() {
            return Err(IpDiscoveryError::NoSources);
        }

        let mut attempts = Vec::new();

        for source in &self.sources {
            let outcome = source.fetch().await.and_then(|ip| {
                if record_type.accepts(&ip) {
                    Ok(ip)
                } else {
                    Err(anyhow!("{} is not usable in a {} record", ip, record_type))
                }
            });

            match outcome {
                Ok(ip) => {
                    debug!("Discovered {} from {}", ip, source.describe());
                    return Ok(ip);
                }
                Err(e) => {
                    debug!("Failed to get IP from {}: {}", source.describe(), e);
                    attempts.push((source.describe(), e.to_string()));
                }
            }
        }

        Err(IpDiscoveryError::AllSourcesFailed { attempts })
    }
}
