use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::Settings;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    providers: BTreeMap<String, ProviderCredentials>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProviderCredentials {
    api_token: String,
}

/// API tokens kept outside the main config file, one per provider.
pub struct CredentialStore {
    path: PathBuf,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::at(Settings::config_dir().join("credentials.toml"))
    }
}

impl CredentialStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<CredentialsFile> {
        if !self.path.exists() {
            return Ok(CredentialsFile::default());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read credentials file: {}", self.path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse credentials file: {}", self.path.display()))
    }

    fn save(&self, creds: &CredentialsFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(creds).context("Failed to serialize credentials")?;

        fs::write(&self.path, &content)
            .with_context(|| format!("Failed to write credentials file: {}", self.path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&self.path, perms)
                .with_context(|| format!("Failed to set permissions on: {}", self.path.display()))?;
        }

        Ok(())
    }

    pub fn store(&self, provider: &str, api_token: &str) -> Result<()> {
        let api_token = api_token.trim();
        if api_token.is_empty() {
            return Err(anyhow!("API token must not be empty"));
        }

        let mut creds = self.load()?;
        creds.providers.insert(
            provider.to_lowercase(),
            ProviderCredentials {
                api_token: api_token.to_string(),
            },
        );
        self.save(&creds)
    }

    pub fn get(&self, provider: &str) -> Result<String> {
        let creds = self.load()?;

        creds
            .providers
            .get(&provider.to_lowercase())
            .map(|c| c.api_token.clone())
            .ok_or_else(|| {
                anyhow!(
                    "Credentials not found for provider: {}. Use 'zonesyncd set-key {}' to store credentials.",
                    provider,
                    provider
                )
            })
    }

    pub fn delete(&self, provider: &str) -> Result<()> {
        let mut creds = self.load()?;

        if creds.providers.remove(&provider.to_lowercase()).is_none() {
            return Err(anyhow!("No credentials found for provider: {}", provider));
        }

        self.save(&creds)
    }
}

pub fn store_token(provider: &str, api_token: &str) -> Result<()> {
    CredentialStore::default().store(provider, api_token)
}

pub fn delete_token(provider: &str) -> Result<()> {
    CredentialStore::default().delete(provider)
}
