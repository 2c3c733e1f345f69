//! Client credential persistence.
//!
//! The game issues `{client_id, client_secret}` exactly once at
//! registration; losing them means losing the farmer. The store loads
//! them at startup and persists newly issued ones immediately after a
//! successful `/register`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;

/// Credentials for the client-credentials token exchange.
#[derive(Debug, Clone, Default)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    pub fn is_complete(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

/// Storage backend for client credentials.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn load(&self) -> Result<Option<ClientCredentials>>;
    async fn save(&self, farmer: &str, creds: &ClientCredentials) -> Result<()>;
}

/// Dotenv-style file store (`KEY=value` lines), matching the format
/// the game hands out after registration.
pub struct DotenvSecretStore {
    path: PathBuf,
}

impl DotenvSecretStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl SecretStore for DotenvSecretStore {
    async fn load(&self) -> Result<Option<ClientCredentials>> {
        if !self.path.exists() {
            // environment variables may still carry the credentials
            return Ok(load_from_env());
        }
        let content = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;

        let mut creds = ClientCredentials::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                match key.trim() {
                    "CLIENT_ID" => creds.client_id = value.trim().to_string(),
                    "CLIENT_SECRET" => creds.client_secret = value.trim().to_string(),
                    _ => {}
                }
            }
        }

        if creds.is_complete() {
            Ok(Some(creds))
        } else {
            Ok(load_from_env())
        }
    }

    async fn save(&self, farmer: &str, creds: &ClientCredentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let content = format!(
            "# HappyHarvest credentials (issued once; do not lose)\n\
             FARMER_NAME={farmer}\n\
             CLIENT_ID={}\n\
             CLIENT_SECRET={}\n",
            creds.client_id, creds.client_secret
        );
        fs::write(&self.path, content)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        tracing::info!("Credentials saved to {}", self.path.display());
        Ok(())
    }
}

fn load_from_env() -> Option<ClientCredentials> {
    let creds = ClientCredentials {
        client_id: std::env::var("CLIENT_ID").unwrap_or_default(),
        client_secret: std::env::var("CLIENT_SECRET").unwrap_or_default(),
    };
    creds.is_complete().then_some(creds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DotenvSecretStore::new(dir.path().join("credentials.env"));

        let creds = ClientCredentials {
            client_id: "farmer-123".into(),
            client_secret: "s3cret".into(),
        };
        store.save("alice", &creds).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.client_id, "farmer-123");
        assert_eq!(loaded.client_secret, "s3cret");
    }

    #[tokio::test]
    async fn partial_file_is_not_complete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.env");
        tokio::fs::write(&path, "CLIENT_ID=only-half\n").await.unwrap();

        let store = DotenvSecretStore::new(path);
        assert!(store.load().await.unwrap().is_none());
    }
}
