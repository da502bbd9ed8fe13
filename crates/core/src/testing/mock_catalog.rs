//! Mock catalog for testing.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::catalog::{
    CatalogClient, CatalogError, ProductDescriptor, SearchWindow, SpatialFilter,
};

/// A recorded search for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedSearch {
    /// The window that was queried.
    pub window: SearchWindow,
    /// Name of the spatial filter used.
    pub filter_name: String,
}

/// Mock implementation of the [`CatalogClient`] trait.
///
/// Provides controllable behavior for testing:
/// - Return configurable search results
/// - Track search windows and fetched products for assertions
/// - Script per-call fetch failures (fail N times, then succeed)
pub struct MockCatalog {
    /// Configured search results to return.
    search_results: Arc<RwLock<Vec<ProductDescriptor>>>,
    /// Recorded searches.
    searches: Arc<RwLock<Vec<RecordedSearch>>>,
    /// If set, the next search fails with this error.
    next_search_error: Arc<RwLock<Option<CatalogError>>>,
    /// Scripted fetch failures, consumed one per fetch call.
    fetch_failures: Arc<RwLock<VecDeque<CatalogError>>>,
    /// File ids of products that were fetched (successfully or not).
    fetches: Arc<RwLock<Vec<String>>>,
}

impl Default for MockCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCatalog {
    /// Create a new mock catalog with empty results.
    pub fn new() -> Self {
        Self {
            search_results: Arc::new(RwLock::new(Vec::new())),
            searches: Arc::new(RwLock::new(Vec::new())),
            next_search_error: Arc::new(RwLock::new(None)),
            fetch_failures: Arc::new(RwLock::new(VecDeque::new())),
            fetches: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Configure the descriptors every search returns.
    pub async fn set_search_results(&self, results: Vec<ProductDescriptor>) {
        *self.search_results.write().await = results;
    }

    /// Make the next search call fail with the given error.
    pub async fn fail_next_search(&self, error: CatalogError) {
        *self.next_search_error.write().await = Some(error);
    }

    /// Script fetch failures: each queued error fails one fetch call, after
    /// which fetches succeed again.
    pub async fn fail_next_fetches(&self, errors: Vec<CatalogError>) {
        let mut failures = self.fetch_failures.write().await;
        failures.extend(errors);
    }

    /// All searches made so far.
    pub async fn recorded_searches(&self) -> Vec<RecordedSearch> {
        self.searches.read().await.clone()
    }

    /// File ids of all fetch calls made so far.
    pub async fn recorded_fetches(&self) -> Vec<String> {
        self.fetches.read().await.clone()
    }
}

#[async_trait]
impl CatalogClient for MockCatalog {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(
        &self,
        window: &SearchWindow,
        filter: &SpatialFilter,
    ) -> Result<Vec<ProductDescriptor>, CatalogError> {
        self.searches.write().await.push(RecordedSearch {
            window: *window,
            filter_name: filter.name.clone(),
        });

        if let Some(error) = self.next_search_error.write().await.take() {
            return Err(error);
        }

        Ok(self.search_results.read().await.clone())
    }

    async fn fetch(
        &self,
        descriptor: &ProductDescriptor,
        dest_dir: &Path,
    ) -> Result<PathBuf, CatalogError> {
        self.fetches.write().await.push(descriptor.file_id.clone());

        if let Some(error) = self.fetch_failures.write().await.pop_front() {
            return Err(error);
        }

        tokio::fs::create_dir_all(dest_dir).await?;
        let dest_path = dest_dir.join("product.nat");
        tokio::fs::write(&dest_path, b"mock raw artifact bytes").await?;
        Ok(dest_path)
    }
}
