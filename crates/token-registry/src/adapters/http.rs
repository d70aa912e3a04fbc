//! HTTPS document download over `reqwest`.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::RegistryError;
use crate::ports::{ContentFetcher, FetchResponse};

/// `ContentFetcher` backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct HttpContentFetcher {
    client: reqwest::Client,
}

impl HttpContentFetcher {
    /// Client with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|e| RegistryError::Http {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, RegistryError> {
        let http_error = |e: reqwest::Error| RegistryError::Http {
            url: url.to_string(),
            message: e.to_string(),
        };
        let response = self.client.get(url).send().await.map_err(http_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(http_error)?;
        Ok(FetchResponse {
            status,
            body: body.to_vec(),
        })
    }
}
