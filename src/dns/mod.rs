mod cloudflare;
mod provider;

pub use cloudflare::{CloudflareProvider, CLOUDFLARE_API_BASE};
pub use provider::{DesiredRecord, DnsProvider, ObservedRecord, RecordType, Zone};

use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;

pub fn create_provider(
    name: &str,
    token: &str,
    api_base: Option<&str>,
    timeout: Duration,
) -> Result<Arc<dyn DnsProvider>, ConfigError> {
    match name.to_lowercase().as_str() {
        "cloudflare" => {
            let provider = CloudflareProvider::new(
                token,
                api_base.unwrap_or(CLOUDFLARE_API_BASE),
                timeout,
            )?;
            Ok(Arc::new(provider))
        }
        _ => Err(ConfigError::Invalid(format!("unknown DNS provider: {}", name))),
    }
}
