use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use tracing::debug;

use super::{AuthoritativeSource, SourceError};
use crate::event::AuctionSnapshot;

/// Delta query over HTTP: `GET {base_url}/entities?since=<RFC 3339>`.
#[derive(Clone, Debug)]
pub struct HttpAuthoritativeSource {
    client: Client,
    base_url: String,
}

impl HttpAuthoritativeSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl AuthoritativeSource for HttpAuthoritativeSource {
    async fn changed_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuctionSnapshot>, SourceError> {
        let url = format!("{}/entities", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(since) = since {
            request = request.query(&[("since", since.to_rfc3339_opts(SecondsFormat::Micros, true))]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let snapshots: Vec<AuctionSnapshot> = response
            .json()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))?;

        debug!(url = %url, since = ?since, count = snapshots.len(), "delta fetched");
        Ok(snapshots)
    }
}
