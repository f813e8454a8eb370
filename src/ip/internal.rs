use std::net::IpAddr;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::IpSource;

/// Address of the default local interface. Only useful when the host holds
/// its public address directly (no NAT).
pub struct InterfaceIpSource;

#[async_trait]
impl IpSource for InterfaceIpSource {
    async fn fetch(&self) -> Result<IpAddr> {
        local_ip_address::local_ip().map_err(|e| anyhow!("Failed to get local IP: {}", e))
    }

    fn describe(&self) -> String {
        "local interface".to_string()
    }
}
