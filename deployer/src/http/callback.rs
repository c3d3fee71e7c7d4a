//! Callback delivery over HTTP

use std::time::Duration;

use async_trait::async_trait;
use openapi_client::models::CallbackPayload;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::errors::ServiceError;
use crate::notify::transport::{CallbackTransport, DeliveryResponse};
use crate::utils::version_info;

/// [`CallbackTransport`] posting JSON with reqwest
pub struct ReqwestCallback {
    client: Client,
}

impl ReqwestCallback {
    pub fn new(timeout: Duration) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("pagedeploy/{}", version_info().version))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CallbackTransport for ReqwestCallback {
    async fn deliver(&self, url: &Url, payload: &CallbackPayload) -> DeliveryResponse {
        debug!("POST {}", url);
        match self.client.post(url.clone()).json(payload).send().await {
            Ok(response) => DeliveryResponse::Status(response.status().as_u16()),
            Err(e) if e.is_timeout() => DeliveryResponse::Timeout,
            Err(e) => DeliveryResponse::ConnectionFailed(e.to_string()),
        }
    }
}
