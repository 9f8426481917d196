//!  Delulu Fare Tracker
//!
//!  Copyright (C) 2026  Mamy Ratsimbazafy
//!
//!  This program is free software: you can redistribute it and/or modify
//!  it under the terms of the GNU Affero General Public License as published by
//!  the Free Software Foundation, either version 3 of the License, or
//!  (at your option) any later version.
//!
//!  This program is distributed in the hope that it will be useful,
//!  but WITHOUT ANY WARRANTY; without even the implied warranty of
//!  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//!  GNU Affero General Public License for more details.
//!
//!  You should have received a copy of the GNU Affero General Public License
//!  along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! # QPX Search Client
//!
//! Effectful (time, network) operations: one POST per composed search,
//! no retry.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use chrono::NaiveDate;
use serde_json::Value;

use crate::error::{FareSearchError, Result};
use crate::fares_query_builder::{FareSearch, SearchRequest};
use crate::fares_results_parser::{CullOutcome, cull};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/qpxExpress/v1/trips/search";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Where and how to reach the provider.
#[derive(Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("timeout_secs", &self.timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Search URL with the key appended as the `key` query parameter.
    pub fn endpoint(&self) -> String {
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}key={}",
            self.base_url,
            separator,
            urlencoding::encode(&self.api_key)
        )
    }
}

#[derive(Clone)]
pub struct QpxClient {
    client: Arc<wreq::Client>,
    config: ProviderConfig,
}

impl QpxClient {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            tracing::warn!("No API key configured; the provider will reject the request");
        }
        let client = wreq::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| {
                FareSearchError::Transport(anyhow::Error::new(e).context("Failed to build HTTP client"))
            })?;
        Ok(Self {
            client: Arc::new(client),
            config,
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// POST one JSON body and parse the reply as JSON.
    ///
    /// Returns the HTTP status alongside the payload; a JSON body is returned
    /// even for error statuses so the caller can surface it.
    async fn post_json(&self, body: String) -> Result<(u16, Value)> {
        let url = self.config.endpoint();
        let http_start = Instant::now();
        tracing::trace!("[post_json] POST {} ({} bytes)", self.config.base_url, body.len());

        let response = self
            .client
            .post(url.as_str())
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| FareSearchError::Transport(anyhow::Error::new(e).context("Request failed")))?;

        let status = response.status();
        tracing::debug!(
            "[post_json] HTTP Status: {} {} after {:?}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown"),
            http_start.elapsed()
        );

        let text = response
            .text()
            .await
            .map_err(|e| FareSearchError::Transport(anyhow::Error::new(e).context("Read body")))?;
        tracing::debug!("[post_json] Response body: {} KB", text.len() / 1024);

        let payload: Value = serde_json::from_str(&text).map_err(|e| {
            let preview = text.chars().take(300).collect::<String>();
            FareSearchError::Transport(anyhow!(
                "HTTP {}: response body is not JSON ({}): {}",
                status.as_u16(),
                e,
                preview
            ))
        })?;

        Ok((status.as_u16(), payload))
    }

    /// Dispatch a composed search exactly once.
    pub async fn search(&self, search: FareSearch) -> Result<SentSearch> {
        let overall_start = Instant::now();
        let body = search.to_json()?;
        let request = search.into_request();

        tracing::info!(
            "Searching fares: {} leg(s), {} passenger(s), first leg {} -> {} on {}",
            request.slice.len(),
            request.passengers.total(),
            request.slice[0].origin(),
            request.slice[0].destination(),
            request.slice[0].date()
        );

        let (status, raw) = self.post_json(body).await?;

        if !(200..300).contains(&status) {
            let message = provider_message(&raw).unwrap_or_else(|| format!("HTTP {}", status));
            tracing::error!("Provider rejected the search: {}", message);
            return Err(FareSearchError::Provider {
                status,
                message,
                payload: raw,
            });
        }
        if raw.get("trips").is_none() {
            let message = provider_message(&raw)
                .unwrap_or_else(|| "response has no `trips` section".to_string());
            tracing::error!("Provider answered without results: {}", message);
            return Err(FareSearchError::Provider {
                status,
                message,
                payload: raw,
            });
        }

        tracing::info!("Total search time: {:?}", overall_start.elapsed());
        Ok(SentSearch { request, raw })
    }
}

/// `error.message` of a provider error payload, when present.
fn provider_message(payload: &Value) -> Option<String> {
    payload
        .pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

impl FareSearch {
    /// Send this search. Consumes it: a composed search is never sent twice.
    pub async fn send(self, client: &QpxClient) -> Result<SentSearch> {
        client.search(self).await
    }
}

/// A search that has been answered by the provider.
#[derive(Debug, Clone)]
pub struct SentSearch {
    request: SearchRequest,
    raw: Value,
}

impl SentSearch {
    pub fn request(&self) -> &SearchRequest {
        &self.request
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn into_raw(self) -> Value {
        self.raw
    }

    pub fn normalize(&self, search_date: NaiveDate) -> CullOutcome {
        cull(&self.raw, search_date)
    }

    /// Normalize, stamping today's local date as the search date.
    pub fn normalize_today(&self) -> CullOutcome {
        self.normalize(chrono::Local::now().date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fares_query_builder::Passengers;
    use serde_json::json;

    #[test]
    fn test_endpoint_appends_encoded_key() {
        let config = ProviderConfig::new("abc/123 ?");
        assert_eq!(
            config.endpoint(),
            "https://www.googleapis.com/qpxExpress/v1/trips/search?key=abc%2F123%20%3F"
        );

        let config = ProviderConfig {
            base_url: "http://localhost:8080/search?alt=json".to_string(),
            ..ProviderConfig::new("k")
        };
        assert_eq!(config.endpoint(), "http://localhost:8080/search?alt=json&key=k");
    }

    #[test]
    fn test_debug_hides_key() {
        let rendered = format!("{:?}", ProviderConfig::new("super-secret"));
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_provider_message() {
        let payload = json!({"error": {"code": 403, "message": "Daily Limit Exceeded"}});
        assert_eq!(
            provider_message(&payload).as_deref(),
            Some("Daily Limit Exceeded")
        );
        assert_eq!(provider_message(&json!({"trips": {}})), None);
    }

    #[tokio::test]
    async fn test_send_without_legs_fails_before_network() {
        // Nothing listens on the discard port; reaching the network would be a transport error.
        let client = QpxClient::new(ProviderConfig {
            base_url: "http://127.0.0.1:9/search".to_string(),
            ..ProviderConfig::new("key")
        })
        .unwrap();

        let err = FareSearch::new(Passengers::adults(1))
            .send(&client)
            .await
            .unwrap_err();
        assert!(matches!(err, FareSearchError::InvalidArgument(_)), "got {:?}", err);
    }
}
