use std::net::IpAddr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use super::IpSource;

/// Longest body read from an endpoint; a textual IPv6 address is at most 45.
const MAX_BODY_BYTES: usize = 256;

/// A "what is my IP" endpoint answering with a bare address.
pub struct HttpIpSource {
    client: Client,
    url: String,
}

impl HttpIpSource {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl IpSource for HttpIpSource {
    async fn fetch(&self) -> Result<IpAddr> {
        let mut response = self.client.get(&self.url).send().await?.error_for_status()?;

        if let Some(len) = response.content_length() {
            if len > MAX_BODY_BYTES as u64 {
                return Err(anyhow!("response too large: {} bytes", len));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > MAX_BODY_BYTES {
                return Err(anyhow!("response larger than {} bytes", MAX_BODY_BYTES));
            }
            body.extend_from_slice(&chunk);
        }

        let body = std::str::from_utf8(&body).context("response is not UTF-8")?;
        parse_ip(body)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

fn parse_ip(body: &str) -> Result<IpAddr> {
    let ip_str = body.trim();
    if ip_str.is_empty() {
        return Err(anyhow!("empty response"));
    }
    ip_str
        .parse()
        .with_context(|| format!("not an IP address: {:.40}", ip_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ip_format() {
        let test_cases = vec!["192.168.1.1", "192.168.1.1\n", "  10.0.0.1  ", "2001:db8::1"];

        for case in test_cases {
            assert!(parse_ip(case).is_ok(), "Failed to parse: {}", case);
        }
    }

    #[test]
    fn test_parse_ip_rejects_garbage() {
        for case in ["", "   \n", "<html>rate limited</html>", "203.0.113", "ip=203.0.113.9"] {
            assert!(parse_ip(case).is_err(), "Accepted: {:?}", case);
        }
    }
}
