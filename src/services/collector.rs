use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::job::MarketCode;

/// What a collection run is scoped to, passed through from the job.
#[derive(Debug, Clone, Copy)]
pub struct CollectRequest<'a> {
    pub market: MarketCode,
    pub account_ids: &'a [String],
    pub parameters: &'a serde_json::Value,
}

/// Per-market product and order collection.
///
/// Implementations own the marketplace specifics (auth, signing, paging);
/// the scheduler only sees a count of records stored.
#[async_trait]
pub trait MarketCollector: Send + Sync {
    async fn collect_products(&self, request: CollectRequest<'_>) -> Result<u64, CollectorError>;

    async fn collect_orders(
        &self,
        request: CollectRequest<'_>,
        days_back: i64,
    ) -> Result<u64, CollectorError>;
}

/// Client for the marketplace collector service.
pub struct HttpCollectorClient {
    http: Client,
    base_url: String,
    api_token: Option<String>,
}

#[derive(Serialize)]
struct CollectBody<'a> {
    account_ids: &'a [String],
    parameters: &'a serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    days_back: Option<i64>,
}

#[derive(Deserialize)]
struct CollectResponse {
    count: u64,
}

impl HttpCollectorClient {
    pub fn new(base_url: &str, api_token: Option<String>) -> Result<Self, CollectorError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(CollectorError::Http)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    fn endpoint(&self, market: MarketCode, resource: &str) -> String {
        format!("{}/markets/{}/{}/collect", self.base_url, market, resource)
    }

    async fn post_collect(
        &self,
        url: String,
        body: &CollectBody<'_>,
    ) -> Result<u64, CollectorError> {
        let mut request = self.http.post(&url).json(body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(CollectorError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CollectorError::Status { status, message });
        }

        let parsed: CollectResponse = response.json().await.map_err(CollectorError::Http)?;
        Ok(parsed.count)
    }
}

#[async_trait]
impl MarketCollector for HttpCollectorClient {
    async fn collect_products(&self, request: CollectRequest<'_>) -> Result<u64, CollectorError> {
        let url = self.endpoint(request.market, "products");
        tracing::debug!(market = %request.market, %url, "Requesting product collection");

        self.post_collect(
            url,
            &CollectBody {
                account_ids: request.account_ids,
                parameters: request.parameters,
                days_back: None,
            },
        )
        .await
    }

    async fn collect_orders(
        &self,
        request: CollectRequest<'_>,
        days_back: i64,
    ) -> Result<u64, CollectorError> {
        let url = self.endpoint(request.market, "orders");
        tracing::debug!(market = %request.market, %url, days_back, "Requesting order collection");

        self.post_collect(
            url,
            &CollectBody {
                account_ids: request.account_ids,
                parameters: request.parameters,
                days_back: Some(days_back),
            },
        )
        .await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Collector returned {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("{0}")]
    Market(String),
}
