//! Outbound sync of shipped orders to the external fulfillment platform.
//!
//! Pushes are attempted once after the shipping transaction commits. A failed
//! push never reverts the shipment; the caller records a pending sync instead.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::errors::ServiceError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentLine {
    pub variant_id: Uuid,
    pub sku: String,
    pub quantity: i32,
}

/// Payload sent when an order ships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentUpdate {
    pub order_id: Uuid,
    pub order_number: String,
    pub status: String,
    pub shipped_at: DateTime<Utc>,
    pub lines: Vec<FulfillmentLine>,
}

#[async_trait]
pub trait FulfillmentPlatform: Send + Sync {
    async fn push_fulfillment(&self, update: &FulfillmentUpdate) -> Result<(), ServiceError>;
}

/// Used when no platform URL is configured.
#[derive(Clone, Default)]
pub struct DisabledFulfillmentPlatform;

#[async_trait]
impl FulfillmentPlatform for DisabledFulfillmentPlatform {
    async fn push_fulfillment(&self, update: &FulfillmentUpdate) -> Result<(), ServiceError> {
        debug!(order_id = %update.order_id, "fulfillment sync disabled; skipping push");
        Ok(())
    }
}

/// JSON-over-HTTP client for the fulfillment platform.
#[derive(Clone)]
pub struct HttpFulfillmentPlatform {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpFulfillmentPlatform {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/fulfillments", self.base_url)
    }
}

#[async_trait]
impl FulfillmentPlatform for HttpFulfillmentPlatform {
    #[instrument(skip(self, update), fields(order_id = %update.order_id))]
    async fn push_fulfillment(&self, update: &FulfillmentUpdate) -> Result<(), ServiceError> {
        let mut request = self.client.post(self.endpoint()).json(update);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            warn!(error = %e, "fulfillment platform unreachable");
            ServiceError::ExternalServiceError(format!("fulfillment platform unreachable: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "fulfillment platform rejected update");
            return Err(ServiceError::ExternalServiceError(format!(
                "fulfillment platform returned {}",
                status
            )));
        }

        info!("fulfillment update delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn update() -> FulfillmentUpdate {
        FulfillmentUpdate {
            order_id: Uuid::new_v4(),
            order_number: "SO-1001".into(),
            status: "SHIPPED".into(),
            shipped_at: Utc::now(),
            lines: vec![FulfillmentLine {
                variant_id: Uuid::new_v4(),
                sku: "SKU-1".into(),
                quantity: 2,
            }],
        }
    }

    #[tokio::test]
    async fn pushes_json_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fulfillments"))
            .and(header("authorization", "Bearer secret-token"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let platform = HttpFulfillmentPlatform::new(
            format!("{}/", server.uri()),
            Some("secret-token".into()),
            Duration::from_secs(2),
        )
        .unwrap();

        platform.push_fulfillment(&update()).await.unwrap();
    }

    #[tokio::test]
    async fn server_error_maps_to_external_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let platform =
            HttpFulfillmentPlatform::new(server.uri(), None, Duration::from_secs(2)).unwrap();

        let err = platform.push_fulfillment(&update()).await.unwrap_err();
        assert!(matches!(err, ServiceError::ExternalServiceError(_)));
    }
}
