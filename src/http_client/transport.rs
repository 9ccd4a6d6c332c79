//! reqwest-backed transport.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN, REFERER};
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use super::user_agent::resolve_user_agent;
use super::{FetchError, FetchRequest, FetchResponse, Transport};
use crate::config::Settings;

/// Sends requests with a shared cookie jar and the origin's default headers.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a client for the configured origin.
    ///
    /// Every request carries the configured user agent plus `Origin` and
    /// `Referer` pointing at the movie site; per-request headers win.
    pub fn new(settings: &Settings, jar: Arc<Jar>) -> Result<Self, FetchError> {
        let base = settings.douban.base_url.trim_end_matches('/');

        let mut headers = HeaderMap::new();
        headers.insert(
            ORIGIN,
            HeaderValue::from_str(base).map_err(|e| FetchError::Client(e.to_string()))?,
        );
        headers.insert(
            REFERER,
            HeaderValue::from_str(&format!("{}/", base))
                .map_err(|e| FetchError::Client(e.to_string()))?,
        );

        let client = Client::builder()
            .user_agent(resolve_user_agent(settings.http.user_agent_config()))
            .default_headers(headers)
            .cookie_provider(jar)
            .timeout(settings.http.timeout())
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self { client })
    }

    /// Wrap an already-configured client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse, FetchError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let exchange = async {
            let response = builder.send().await?;
            let url = response.url().clone();
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?.to_vec();
            Ok::<_, FetchError>(FetchResponse {
                url,
                status,
                headers,
                body,
            })
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = exchange => result,
        }
    }
}
