//! Transform collaborator: decode, calibrate, reproject and quality-score
//! raw artifacts into derived products.

mod command;
mod traits;
mod types;

pub use command::CommandTransformer;
pub use traits::{TransformError, Transformer};
pub use types::QualityReport;
