//! Config service over HTTP
//!
//! Endpoints, relative to the configured base URL:
//! `POST /domains/lookup`, `GET /addresses/{email}`,
//! `GET /addresses/id/{id}` and `POST /addresses/lookup`.

use super::{AddressService, DomainService};
use async_trait::async_trait;
use directgate_common::config::ServiceConfig;
use directgate_common::types::{Address, AddressId, Domain, MailAddress};
use directgate_common::{Error, Result};
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct DomainLookupRequest<'a> {
    names: &'a [String],
}

#[derive(Debug, Serialize)]
struct AddressLookupRequest {
    addresses: Vec<String>,
}

/// HTTP client for the domain and address config service
///
/// Addresses are sent as single percent-encoded path segments, so `/`, `?`,
/// `#` and dot segments in a local part never change the endpoint.
#[derive(Debug, Clone)]
pub struct HttpConfigService {
    base_url: Url,
    client: Client,
}

impl HttpConfigService {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Service(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = Url::parse(config.url.trim_end_matches('/'))
            .map_err(|e| Error::Config(format!("Invalid config service URL '{}': {}", config.url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "Invalid config service URL '{}'",
                config.url
            )));
        }

        Ok(Self { base_url, client })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        request.send().await.map_err(|e| {
            warn!("Config service request failed: {}", e);
            Error::Service(format!("Config service request failed: {}", e))
        })
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Service(format!(
                "Config service returned error status {}: {}",
                status, body
            )));
        }

        response.json().await.map_err(|e| {
            warn!("Failed to parse config service response: {}", e);
            Error::Service(format!("Failed to parse config service response: {}", e))
        })
    }

    async fn get_optional<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>> {
        debug!(url = %url, "Config service lookup");
        let response = self.send(self.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::parse(response).await.map(Some)
    }
}

#[async_trait]
impl DomainService for HttpConfigService {
    async fn get_domains(&self, names: &[String]) -> Result<Vec<Domain>> {
        let url = self.url(&["domains", "lookup"]);
        debug!(url = %url, count = names.len(), "Looking up domains");

        let response = self
            .send(self.client.post(url).json(&DomainLookupRequest { names }))
            .await?;
        Self::parse(response).await
    }
}

#[async_trait]
impl AddressService for HttpConfigService {
    async fn get_address(&self, address: &MailAddress) -> Result<Option<Address>> {
        self.get_optional(self.url(&["addresses", &address.to_string()]))
            .await
    }

    async fn get_address_by_id(&self, id: AddressId) -> Result<Option<Address>> {
        self.get_optional(self.url(&["addresses", "id", &id.to_string()]))
            .await
    }

    async fn get_addresses(&self, addresses: &[MailAddress]) -> Result<Vec<Address>> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.url(&["addresses", "lookup"]);
        debug!(url = %url, count = addresses.len(), "Looking up addresses");

        let body = AddressLookupRequest {
            addresses: addresses.iter().map(ToString::to_string).collect(),
        };
        let response = self.send(self.client.post(url).json(&body)).await?;
        Self::parse(response).await
    }
}
