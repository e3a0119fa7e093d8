//! HTTP client for the RM Traceability backend orchestration endpoints.
//!
//! - `GET {base}/orchestration/full-data/{userId}`
//! - `GET {base}/orchestration/inventory-quantity?companyId&resourceName`
//! - `GET {base}/orchestration/inventory-codes?companyId&resourceName`

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use tracechat_agent::InventoryApi;
use tracechat_core::ProductName;

#[derive(Debug, Deserialize)]
struct FullDataResponse {
    user: Option<UserPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserPayload {
    company_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuantityResponse {
    #[serde(default, alias = "quantidade")]
    amount: u64,
}

#[derive(Debug, Deserialize)]
struct CodesResponse {
    #[serde(default)]
    codes: Vec<String>,
}

pub struct HttpInventoryApi {
    base_url: Url,
    client: Client,
}

impl HttpInventoryApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .with_context(|| format!("invalid backend base url `{base_url}`"))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build backend http client")?;
        Ok(Self { base_url, client })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("backend base url `{}` cannot carry a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<T> {
        debug!(event_name = "chat.backend.request", url = %url, "calling backend");
        let response = self
            .client
            .get(url.clone())
            .query(query)
            .send()
            .await
            .with_context(|| format!("request to `{url}` failed"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("backend `{url}` returned {status}");
        }
        response.json::<T>().await.with_context(|| format!("failed to decode response from `{url}`"))
    }
}

#[async_trait]
impl InventoryApi for HttpInventoryApi {
    async fn company_for_user(&self, user_id: &str) -> Result<Option<String>> {
        let url = self.endpoint(&["orchestration", "full-data", user_id])?;
        let payload: FullDataResponse = self.get_json(url, &[]).await?;

        let company_id = payload.user.and_then(|user| user.company_id).filter(|id| !id.is_empty());
        if company_id.is_none() {
            warn!(
                event_name = "chat.backend.company_missing",
                user_id = %user_id,
                "backend user payload has no companyId"
            );
        }
        Ok(company_id)
    }

    async fn quantity(&self, product: &ProductName, company_id: &str) -> Result<u64> {
        let url = self.endpoint(&["orchestration", "inventory-quantity"])?;
        let payload: QuantityResponse = self
            .get_json(url, &[("companyId", company_id), ("resourceName", product.as_str())])
            .await?;
        Ok(payload.amount)
    }

    async fn codes(&self, product: &ProductName, company_id: &str) -> Result<Vec<String>> {
        let url = self.endpoint(&["orchestration", "inventory-codes"])?;
        let payload: CodesResponse = self
            .get_json(url, &[("companyId", company_id), ("resourceName", product.as_str())])
            .await?;
        Ok(payload.codes)
    }
}
