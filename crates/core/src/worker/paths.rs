//! Deterministic on-disk layout for raw and derived artifacts.
//!
//! Paths are a pure function of the nominal sensing timestamp and product
//! identity, so no two records ever address the same path and a retry always
//! lands in the same place as the attempt it replaces.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Directory holding all files of one raw product:
/// `<base>/<YYYY>/<MM>/<DD>/<YYYYMMDD_HHMMSS>_<source>_<type>/`
pub fn raw_product_dir(
    base: &Path,
    observed_at: DateTime<Utc>,
    source_tag: &str,
    product_type: &str,
) -> PathBuf {
    base.join(observed_at.format("%Y/%m/%d").to_string())
        .join(format!(
            "{}_{}_{}",
            observed_at.format("%Y%m%d_%H%M%S"),
            source_tag,
            product_type
        ))
}

/// Path of the derived artifact:
/// `<base>/<YYYY>/<MM>/<DD>/<YYYYMMDD_HHMMSS>_<source>_derived.nc`
pub fn derived_output_path(base: &Path, observed_at: DateTime<Utc>, source_tag: &str) -> PathBuf {
    base.join(observed_at.format("%Y/%m/%d").to_string())
        .join(format!(
            "{}_{}_derived.nc",
            observed_at.format("%Y%m%d_%H%M%S"),
            source_tag
        ))
}
