//! AWS Secrets Manager integration.

use aws_sdk_secretsmanager::Client as SecretsClient;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::{Error, Result, Settings};

/// Database credentials from Secrets Manager.
#[derive(Debug, Deserialize)]
pub struct DatabaseCredentials {
    pub username: String,
    pub password: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub dbname: Option<String>,
}

/// Secrets Manager reader with a per-instance cache.
pub struct SecretStore {
    client: SecretsClient,
    cache: RwLock<HashMap<String, String>>,
}

impl SecretStore {
    /// Create a new secret store around an SDK client.
    pub fn new(client: SecretsClient) -> Self {
        Self {
            client,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Get a secret value with caching.
    pub async fn get_secret(&self, secret_arn: &str) -> Result<String> {
        {
            let cache = self.cache.read().await;
            if let Some(value) = cache.get(secret_arn) {
                return Ok(value.clone());
            }
        }

        let response = self
            .client
            .get_secret_value()
            .secret_id(secret_arn)
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to get secret: {}", e)))?;

        let secret_string = response
            .secret_string()
            .ok_or_else(|| Error::Aws("Secret has no string value".to_string()))?
            .to_string();

        {
            let mut cache = self.cache.write().await;
            cache.insert(secret_arn.to_string(), secret_string.clone());
        }

        Ok(secret_string)
    }

    /// Get database credentials.
    pub async fn get_database_credentials(&self, secret_arn: &str) -> Result<DatabaseCredentials> {
        let secret_string = self.get_secret(secret_arn).await?;

        serde_json::from_str(&secret_string)
            .map_err(|e| Error::Aws(format!("Failed to parse database credentials: {}", e)))
    }

    /// Load the provider settings snapshot.
    pub async fn load_settings(&self, secret_arn: &str) -> Result<Settings> {
        let secret_string = self.get_secret(secret_arn).await?;
        Settings::from_json(&secret_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_credentials() {
        let json = r#"{"username":"insights","password":"secret123","host":"db.example.com","port":5432,"dbname":"marketing_insights"}"#;
        let creds: DatabaseCredentials = serde_json::from_str(json).unwrap();
        assert_eq!(creds.username, "insights");
        assert_eq!(creds.password, "secret123");
        assert_eq!(creds.port, Some(5432));
    }
}
