//! Remote product catalog: discovery search and raw artifact fetch.

mod opensearch;
mod types;

pub use opensearch::OpenSearchCatalog;
pub use types::{
    CatalogClient, CatalogError, ProductDescriptor, SearchWindow, SpatialFilter,
};
