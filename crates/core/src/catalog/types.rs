//! Types for the remote product catalog.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Catalog-provided metadata identifying one discoverable artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductDescriptor {
    /// Globally unique product identifier assigned by the catalog.
    pub file_id: String,
    /// Nominal sensing timestamp.
    pub timestamp: DateTime<Utc>,
    /// Satellite / origin identifier.
    pub source_tag: String,
    /// Catalog product type.
    pub product_type: String,
    /// Artifact size in bytes as reported by the catalog.
    pub size_bytes: u64,
}

/// Half-open time window for a discovery query.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct SearchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Named bounding box used as the fixed spatial filter for discovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpatialFilter {
    pub name: String,
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

impl SpatialFilter {
    /// Render the bounding box as a closed WKT POLYGON, the format the
    /// catalog's geo parameter expects.
    pub fn to_wkt_polygon(&self) -> String {
        format!(
            "POLYGON(({lon_min} {lat_min}, {lon_max} {lat_min}, {lon_max} {lat_max}, {lon_min} {lat_max}, {lon_min} {lat_min}))",
            lon_min = self.lon_min,
            lon_max = self.lon_max,
            lat_min = self.lat_min,
            lat_max = self.lat_max,
        )
    }
}

/// Errors from catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Catalog API error: {0}")]
    ApiError(String),

    #[error("Catalog authentication failed: {0}")]
    Unauthorized(String),

    #[error("Catalog request timed out")]
    Timeout,

    #[error("Malformed catalog response: {0}")]
    MalformedResponse(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for remote catalog backends.
///
/// The catalog is not required to be idempotent or deduplicated; the
/// orchestrator's manifest dedupe makes repeated discovery safe, and fetch
/// is retried independently by the caller.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Query products sensed within the window and intersecting the filter.
    async fn search(
        &self,
        window: &SearchWindow,
        filter: &SpatialFilter,
    ) -> Result<Vec<ProductDescriptor>, CatalogError>;

    /// Download the raw artifact into `dest_dir`, returning the path of the
    /// written file.
    async fn fetch(
        &self,
        descriptor: &ProductDescriptor,
        dest_dir: &Path,
    ) -> Result<PathBuf, CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wkt_polygon_is_closed() {
        let filter = SpatialFilter {
            name: "paris".to_string(),
            lon_min: 1.8,
            lon_max: 2.9,
            lat_min: 48.3,
            lat_max: 49.2,
        };

        let wkt = filter.to_wkt_polygon();
        assert_eq!(
            wkt,
            "POLYGON((1.8 48.3, 2.9 48.3, 2.9 49.2, 1.8 49.2, 1.8 48.3))"
        );
    }

    #[test]
    fn test_descriptor_serde_round_trip() {
        let descriptor = ProductDescriptor {
            file_id: "MSG4-SEVI-MSG15-0100-NA-20260214120010".to_string(),
            timestamp: Utc::now(),
            source_tag: "MSG4".to_string(),
            product_type: "HRSEVIRI".to_string(),
            size_bytes: 260_000_000,
        };

        let json = serde_json::to_string(&descriptor).unwrap();
        let parsed: ProductDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, descriptor);
    }
}
