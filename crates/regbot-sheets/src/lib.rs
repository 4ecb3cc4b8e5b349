//! Google Sheets adapter.
//!
//! Implements the `regbot-core` table port over the Sheets v4 REST API,
//! authenticated with a service-account key via `gcp_auth`.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};

pub mod a1;
mod client;

pub use client::SheetsClient;

use regbot_core::{
    config::{Config, CredentialSource},
    connection::Connector,
    errors::Error,
    table::TableService,
    Result,
};

/// Builds authenticated [`SheetsClient`]s for the connection manager.
#[derive(Clone, Debug)]
pub struct SheetsConnector {
    credentials: CredentialSource,
    http_timeout: Duration,
}

impl SheetsConnector {
    pub fn new(credentials: CredentialSource, http_timeout: Duration) -> Self {
        Self {
            credentials,
            http_timeout,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.google_credentials.clone(), cfg.sheets_http_timeout)
    }

    /// Service-account key JSON. Files are read on a blocking worker.
    async fn key_json(&self) -> Result<String> {
        let json = match &self.credentials {
            CredentialSource::Missing => {
                return Err(Error::Config(
                    "Google Sheets credentials not configured (set GOOGLE_SHEETS_CREDENTIALS_JSON or GOOGLE_SHEETS_CREDENTIALS_FILE)"
                        .to_string(),
                ))
            }
            CredentialSource::Inline(json) => json.clone(),
            CredentialSource::File(path) => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || std::fs::read_to_string(path))
                    .await
                    .map_err(|e| Error::Initialization(format!("credentials reader failed: {e}")))?
                    .map_err(|e| Error::Config(format!("cannot read credentials file: {e}")))?
            }
        };

        if json.trim().is_empty() {
            return Err(Error::Config("Google Sheets credentials are blank".to_string()));
        }
        Ok(json)
    }
}

#[async_trait]
impl Connector<dyn TableService> for SheetsConnector {
    async fn connect(&self) -> Result<Arc<dyn TableService>> {
        let json = self.key_json().await?;

        let account = CustomServiceAccount::from_json(&json)
            .map_err(|e| Error::Initialization(format!("invalid service account key: {e}")))?;

        // Fetch one token up front so bad credentials fail here, not on the first read.
        account
            .token(client::SCOPES)
            .await
            .map_err(|e| Error::Initialization(format!("service account authentication failed: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(self.http_timeout)
            .build()
            .map_err(|e| Error::Initialization(format!("http client build failed: {e}")))?;

        tracing::info!(
            timeout_ms = self.http_timeout.as_millis() as u64,
            "google sheets client authenticated"
        );
        Ok(Arc::new(SheetsClient::new(http, Arc::new(account))))
    }
}
