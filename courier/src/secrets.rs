//! Credential blobs for the database and the SMTP relay.
//!
//! Each blob is a JSON object `{"username": ..., "password": ...}`. In the
//! local environment the blob is read from the environment variable named
//! by the secret identifier; elsewhere it comes from AWS Secrets Manager.

use std::{collections::HashMap, fmt};

use aws_config::BehaviorVersion;
use aws_sdk_secretsmanager::{Client, error::DisplayErrorContext};
use courier_common::{Environment, internal};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Secret {0} is not set")]
    Missing(String),

    #[error("Secret {id} is not a credentials object: {source}")]
    Malformed {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to fetch secret {id}: {message}")]
    Provider { id: String, message: String },
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Parse a credentials blob.
    ///
    /// # Errors
    /// If the blob is not a JSON object with `username` and `password`
    pub fn parse(id: &str, blob: &str) -> Result<Self, SecretError> {
        serde_json::from_str(blob).map_err(|source| SecretError::Malformed {
            id: id.to_string(),
            source,
        })
    }
}

/// Where credential blobs come from
#[derive(Debug)]
pub enum SecretSource {
    /// Environment variables named by the secret identifier
    Environment,
    SecretsManager(Client),
    /// Blobs supplied up front
    Fixed(HashMap<String, String>),
}

impl SecretSource {
    /// The source used for `environment`.
    pub async fn for_environment(environment: Environment, region: &str) -> Self {
        if environment.is_local() {
            internal!(level = DEBUG, "Reading secrets from the environment");
            return Self::Environment;
        }

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        Self::SecretsManager(Client::new(&config))
    }

    /// # Errors
    /// If the secret cannot be fetched or is malformed
    pub async fn credentials(&self, id: &str) -> Result<Credentials, SecretError> {
        let blob = match self {
            Self::Environment => {
                std::env::var(id).map_err(|_| SecretError::Missing(id.to_string()))?
            }
            Self::Fixed(blobs) => blobs
                .get(id)
                .cloned()
                .ok_or_else(|| SecretError::Missing(id.to_string()))?,
            Self::SecretsManager(client) => client
                .get_secret_value()
                .secret_id(id)
                .send()
                .await
                .map_err(|e| SecretError::Provider {
                    id: id.to_string(),
                    message: DisplayErrorContext(&e).to_string(),
                })?
                .secret_string()
                .map(ToString::to_string)
                .ok_or_else(|| SecretError::Missing(id.to_string()))?,
        };

        Credentials::parse(id, &blob)
    }
}
