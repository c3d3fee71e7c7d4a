//! HTTP client implementation

use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};

use crate::errors::{HttpError, ServiceError};
use crate::utils::version_info;

/// JSON client bound to one backend base URL
pub struct HttpClient {
    client: Client,
    base_url: String,
    token: Option<SecretString>,
}

impl HttpClient {
    /// Create a new HTTP client with a per-request timeout
    pub fn new(
        base_url: &str,
        timeout: Duration,
        default_headers: HeaderMap,
    ) -> Result<Self, ServiceError> {
        let user_agent = format!("pagedeploy/{}", version_info().version);
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .default_headers(default_headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Attach a bearer token to every request
    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, HttpError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, &url)
            .header(header::ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map_err(|e| HttpError::Request(format!("invalid token header: {}", e)))?;
            request = request.header(header::AUTHORIZATION, value);
        }

        Ok(request)
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, HttpError> {
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::NOT_FOUND {
                debug!("HTTP request found nothing: {}", status);
            } else {
                error!("HTTP request failed: {} - {}", status, body);
            }
            return Err(HttpError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.json().await?;
        Ok(body)
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, HttpError> {
        Self::send(self.request(Method::GET, path)?).await
    }

    /// Make a GET request, mapping 404 to `None`
    pub async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, HttpError> {
        match self.get(path).await {
            Ok(value) => Ok(Some(value)),
            Err(HttpError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Make a POST request
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, HttpError> {
        Self::send(self.request(Method::POST, path)?.json(body)).await
    }

    /// Make a PATCH request
    pub async fn patch<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, HttpError> {
        Self::send(self.request(Method::PATCH, path)?.json(body)).await
    }
}
