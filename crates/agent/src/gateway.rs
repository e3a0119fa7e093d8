use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use tracechat_core::ProductName;

/// Raw access to the inventory backend. Implementations report every failure.
#[async_trait]
pub trait InventoryApi: Send + Sync {
    async fn company_for_user(&self, user_id: &str) -> Result<Option<String>>;

    async fn quantity(&self, product: &ProductName, company_id: &str) -> Result<u64>;

    async fn codes(&self, product: &ProductName, company_id: &str) -> Result<Vec<String>>;
}

/// Backend access as the conversation sees it: one attempt per call, bounded by
/// a fixed timeout, and every failure degraded to the "no data" default.
#[derive(Clone)]
pub struct BackendGateway {
    api: Arc<dyn InventoryApi>,
    timeout: Duration,
}

impl BackendGateway {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(api: Arc<dyn InventoryApi>, timeout: Duration) -> Self {
        Self { api, timeout }
    }

    pub async fn resolve_company(&self, user_id: &str) -> Option<String> {
        self.bounded("company", self.api.company_for_user(user_id)).await.flatten()
    }

    pub async fn quantity(&self, product: &ProductName, company_id: &str) -> u64 {
        self.bounded("quantity", self.api.quantity(product, company_id)).await.unwrap_or(0)
    }

    pub async fn codes(&self, product: &ProductName, company_id: &str) -> Vec<String> {
        self.bounded("codes", self.api.codes(product, company_id)).await.unwrap_or_default()
    }

    async fn bounded<T>(&self, operation: &'static str, call: impl Future<Output = Result<T>>) -> Option<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(error)) => {
                warn!(
                    event_name = "chat.backend.call_failed",
                    operation,
                    error = %error,
                    "backend call failed, using default"
                );
                None
            }
            Err(_) => {
                warn!(
                    event_name = "chat.backend.call_timed_out",
                    operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "backend call timed out, using default"
                );
                None
            }
        }
    }
}
