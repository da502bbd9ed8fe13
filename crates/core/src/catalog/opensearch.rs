//! HTTP catalog backend for OpenSearch-style product data stores.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::CatalogConfig;

use super::{CatalogClient, CatalogError, ProductDescriptor, SearchWindow, SpatialFilter};

/// Time format the data store expects for window bounds.
const WINDOW_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Refresh the access token this long before its actual expiry.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Catalog backend speaking an OpenSearch-style geo/time product API with
/// key/secret token authentication.
pub struct OpenSearchCatalog {
    client: Client,
    config: CatalogConfig,
    token: RwLock<Option<CachedToken>>,
}

impl OpenSearchCatalog {
    /// Create a new catalog client with the given configuration.
    pub fn new(config: CatalogConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            config,
            token: RwLock::new(None),
        }
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn map_request_error(e: reqwest::Error) -> CatalogError {
        if e.is_timeout() {
            CatalogError::Timeout
        } else if e.is_connect() {
            CatalogError::ConnectionFailed(e.to_string())
        } else {
            CatalogError::ApiError(e.to_string())
        }
    }

    /// Get a valid access token, requesting a fresh one if the cached token
    /// is missing or about to expire.
    async fn access_token(&self) -> Result<String, CatalogError> {
        {
            let cached = self.token.read().await;
            if let Some(ref token) = *cached {
                if token.expires_at - chrono::Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS)
                    > Utc::now()
                {
                    return Ok(token.access_token.clone());
                }
            }
        }

        debug!("Requesting new catalog access token");
        let response = self
            .client
            .post(format!("{}/token", self.base_url()))
            .basic_auth(&self.config.key, Some(&self.config.secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(Self::map_request_error)?;

        if response.status() == StatusCode::UNAUTHORIZED || response.status() == StatusCode::FORBIDDEN
        {
            return Err(CatalogError::Unauthorized(format!(
                "token request rejected with HTTP {}",
                response.status()
            )));
        }
        if !response.status().is_success() {
            return Err(CatalogError::ApiError(format!(
                "token request failed with HTTP {}",
                response.status()
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::MalformedResponse(e.to_string()))?;

        let cached = CachedToken {
            access_token: token_response.access_token.clone(),
            expires_at: Utc::now() + chrono::Duration::seconds(token_response.expires_in as i64),
        };
        *self.token.write().await = Some(cached);

        Ok(token_response.access_token)
    }

    /// Convert one raw product entry into a descriptor. Entries missing a
    /// usable sensing timestamp are dropped (and counted by the caller).
    fn extract_descriptor(&self, entry: ProductEntry) -> Option<ProductDescriptor> {
        let timestamp = entry
            .sensing_start
            .or(entry.sensing_end)
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let Some(timestamp) = timestamp else {
            warn!("Dropping product {} without a sensing timestamp", entry.id);
            return None;
        };

        Some(ProductDescriptor {
            file_id: entry.id,
            timestamp,
            source_tag: entry.satellite.unwrap_or_else(|| "UNKNOWN".to_string()),
            product_type: entry
                .product_type
                .unwrap_or_else(|| self.config.collection.clone()),
            size_bytes: entry.size.unwrap_or(0),
        })
    }
}

#[async_trait]
impl CatalogClient for OpenSearchCatalog {
    fn name(&self) -> &str {
        "opensearch"
    }

    async fn search(
        &self,
        window: &SearchWindow,
        filter: &SpatialFilter,
    ) -> Result<Vec<ProductDescriptor>, CatalogError> {
        let token = self.access_token().await?;

        let url = format!(
            "{}/collections/{}/search",
            self.base_url(),
            self.config.collection
        );

        debug!(
            collection = %self.config.collection,
            start = %window.start,
            end = %window.end,
            "Searching catalog"
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .query(&[
                ("dtstart", window.start.format(WINDOW_TIME_FORMAT).to_string()),
                ("dtend", window.end.format(WINDOW_TIME_FORMAT).to_string()),
                ("geo", filter.to_wkt_polygon()),
            ])
            .send()
            .await
            .map_err(Self::map_request_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::ApiError(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let search_response: SearchResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::MalformedResponse(e.to_string()))?;

        let total = search_response.products.len();
        let descriptors: Vec<ProductDescriptor> = search_response
            .products
            .into_iter()
            .filter_map(|entry| self.extract_descriptor(entry))
            .collect();

        if descriptors.len() < total {
            warn!(
                "Extracted {}/{} products from catalog response",
                descriptors.len(),
                total
            );
        }

        Ok(descriptors)
    }

    async fn fetch(
        &self,
        descriptor: &ProductDescriptor,
        dest_dir: &Path,
    ) -> Result<PathBuf, CatalogError> {
        let token = self.access_token().await?;

        let url = format!(
            "{}/collections/{}/products/{}/download",
            self.base_url(),
            self.config.collection,
            descriptor.file_id
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(Self::map_request_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(CatalogError::ProductNotFound(descriptor.file_id.clone()));
        }
        if !response.status().is_success() {
            return Err(CatalogError::ApiError(format!(
                "download failed with HTTP {}",
                response.status()
            )));
        }

        tokio::fs::create_dir_all(dest_dir).await?;
        let dest_path = dest_dir.join("product.nat");
        let mut file = tokio::fs::File::create(&dest_path).await?;

        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(Self::map_request_error)?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(
            "Fetched {} ({} bytes) to {}",
            descriptor.file_id,
            written,
            dest_path.display()
        );

        Ok(dest_path)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    products: Vec<ProductEntry>,
}

#[derive(Debug, Deserialize)]
struct ProductEntry {
    id: String,
    #[serde(default)]
    sensing_start: Option<String>,
    #[serde(default)]
    sensing_end: Option<String>,
    #[serde(default)]
    satellite: Option<String>,
    #[serde(default)]
    product_type: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CatalogConfig {
        CatalogConfig {
            url: "https://data.example.org/".to_string(),
            key: "test-key".to_string(),
            secret: "test-secret".to_string(),
            collection: "EO:SAT:DAT:HRSEVIRI".to_string(),
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_base_url_strips_trailing_slash() {
        let catalog = OpenSearchCatalog::new(test_config());
        assert_eq!(catalog.base_url(), "https://data.example.org");
    }

    #[test]
    fn test_extract_descriptor_full_entry() {
        let catalog = OpenSearchCatalog::new(test_config());
        let entry = ProductEntry {
            id: "prod-1".to_string(),
            sensing_start: Some("2026-02-14T12:00:10+00:00".to_string()),
            sensing_end: None,
            satellite: Some("MSG4".to_string()),
            product_type: Some("HRSEVIRI".to_string()),
            size: Some(1024),
        };

        let descriptor = catalog.extract_descriptor(entry).unwrap();
        assert_eq!(descriptor.file_id, "prod-1");
        assert_eq!(descriptor.source_tag, "MSG4");
        assert_eq!(descriptor.product_type, "HRSEVIRI");
        assert_eq!(descriptor.size_bytes, 1024);
    }

    #[test]
    fn test_extract_descriptor_falls_back_to_sensing_end() {
        let catalog = OpenSearchCatalog::new(test_config());
        let entry = ProductEntry {
            id: "prod-1".to_string(),
            sensing_start: None,
            sensing_end: Some("2026-02-14T12:15:10+00:00".to_string()),
            satellite: None,
            product_type: None,
            size: None,
        };

        let descriptor = catalog.extract_descriptor(entry).unwrap();
        assert_eq!(descriptor.source_tag, "UNKNOWN");
        assert_eq!(descriptor.product_type, "EO:SAT:DAT:HRSEVIRI");
        assert_eq!(descriptor.size_bytes, 0);
    }

    #[test]
    fn test_extract_descriptor_drops_entry_without_timestamp() {
        let catalog = OpenSearchCatalog::new(test_config());
        let entry = ProductEntry {
            id: "prod-1".to_string(),
            sensing_start: Some("not a timestamp".to_string()),
            sensing_end: None,
            satellite: None,
            product_type: None,
            size: None,
        };

        assert!(catalog.extract_descriptor(entry).is_none());
    }

    #[test]
    fn test_search_response_parsing() {
        let json = r#"{
            "products": [
                {"id": "p-1", "sensing_start": "2026-02-14T12:00:10+00:00", "satellite": "MSG4", "size": 42},
                {"id": "p-2"}
            ]
        }"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.products.len(), 2);
        assert_eq!(parsed.products[0].id, "p-1");
        assert!(parsed.products[1].sensing_start.is_none());
    }

    #[test]
    fn test_token_response_default_expiry() {
        let parsed: TokenResponse = serde_json::from_str(r#"{"access_token": "tok"}"#).unwrap();
        assert_eq!(parsed.expires_in, 3600);
    }
}
