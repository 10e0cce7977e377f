//! Client for the conversation warehouse supplying samples and tenant
//! activity.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::{AppError, AppResult};
use crate::models::{ConversationSample, TenantActivity};

/// Source of conversation samples for a target date.
#[async_trait]
pub trait SampleFetcher: Send + Sync {
    /// Samples for the date, optionally scoped to one tenant, up to `limit`.
    async fn fetch_samples(
        &self,
        tenant_id: Option<&str>,
        target_date: NaiveDate,
        limit: i32,
    ) -> AppResult<Vec<ConversationSample>>;

    /// Tenants with any recorded activity on the date.
    async fn fetch_active_tenants(&self, target_date: NaiveDate) -> AppResult<Vec<TenantActivity>>;
}

/// HTTP warehouse client.
pub struct WarehouseClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl WarehouseClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.get(format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            builder = builder.header("X-API-Key", key);
        }
        builder
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> AppResult<T> {
        let response = builder
            .send()
            .await
            .map_err(|e| AppError::Warehouse(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Warehouse(format!(
                "Warehouse returned {}",
                status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Warehouse(format!("Invalid response body: {}", e)))
    }
}

#[async_trait]
impl SampleFetcher for WarehouseClient {
    async fn fetch_samples(
        &self,
        tenant_id: Option<&str>,
        target_date: NaiveDate,
        limit: i32,
    ) -> AppResult<Vec<ConversationSample>> {
        let mut builder = self.get("/api/v1/conversations/samples").query(&[
            ("date", target_date.to_string()),
            ("limit", limit.to_string()),
        ]);
        if let Some(tenant) = tenant_id {
            builder = builder.query(&[("tenant_id", tenant)]);
        }

        self.fetch_json(builder).await
    }

    async fn fetch_active_tenants(&self, target_date: NaiveDate) -> AppResult<Vec<TenantActivity>> {
        let builder = self
            .get("/api/v1/tenants/active")
            .query(&[("date", target_date.to_string())]);

        self.fetch_json(builder).await
    }
}
