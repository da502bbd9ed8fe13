//! Mock collaborators for testing pipeline behavior without a network or a
//! scientific toolkit.

mod mock_catalog;
mod mock_transformer;

pub use mock_catalog::{MockCatalog, RecordedSearch};
pub use mock_transformer::MockTransformer;
