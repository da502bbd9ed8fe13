use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::catalog::SpatialFilter;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub quality: QualityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("helios.db")
}

/// On-disk layout for raw and derived artifacts
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            raw_dir: default_raw_dir(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_raw_dir() -> PathBuf {
    PathBuf::from("/raw")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("/processed")
}

/// Remote product catalog configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// Data store base URL.
    pub url: String,
    /// Consumer key.
    pub key: String,
    /// Consumer secret.
    pub secret: String,
    /// Collection identifier to query.
    pub collection: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_catalog_timeout")]
    pub timeout_secs: u64,
}

fn default_catalog_timeout() -> u64 {
    30
}

/// Discovery scheduler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// Minutes between discovery cycles.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    /// Delay before the first cycle after startup.
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
    /// Minimum data age in hours. Near-real-time data requires a separate
    /// license, so the search window must end this far in the past.
    #[serde(default = "default_min_age_hours")]
    pub min_age_hours: i64,
    /// Length of the search window in minutes.
    #[serde(default = "default_lookback_minutes")]
    pub lookback_minutes: i64,
    /// Fixed spatial filter applied to every query.
    #[serde(default = "default_roi")]
    pub roi: SpatialFilter,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            initial_delay_secs: default_initial_delay_secs(),
            min_age_hours: default_min_age_hours(),
            lookback_minutes: default_lookback_minutes(),
            roi: default_roi(),
        }
    }
}

fn default_interval_minutes() -> u64 {
    15
}

fn default_initial_delay_secs() -> u64 {
    10
}

fn default_min_age_hours() -> i64 {
    1
}

fn default_lookback_minutes() -> i64 {
    30
}

fn default_roi() -> SpatialFilter {
    SpatialFilter {
        name: "paris".to_string(),
        lon_min: 1.8,
        lon_max: 2.9,
        lat_min: 48.3,
        lat_max: 49.2,
    }
}

/// Download stage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadConfig {
    /// Number of download pool members.
    #[serde(default = "default_download_workers")]
    pub workers: usize,
    /// Maximum delivery attempts per task (first delivery included).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay schedule before re-delivery, in seconds. The last entry is
    /// reused for attempts beyond the schedule.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: Vec<u64>,
    /// Soft time limit: a graceful abort treated as a transient failure.
    #[serde(default = "default_download_soft_limit")]
    pub soft_time_limit_secs: u64,
    /// Hard time limit: a forced abort.
    #[serde(default = "default_download_hard_limit")]
    pub hard_time_limit_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            workers: default_download_workers(),
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            soft_time_limit_secs: default_download_soft_limit(),
            hard_time_limit_secs: default_download_hard_limit(),
        }
    }
}

fn default_download_workers() -> usize {
    2
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> Vec<u64> {
    vec![60, 300, 900]
}

fn default_download_soft_limit() -> u64 {
    1000
}

fn default_download_hard_limit() -> u64 {
    1200
}

/// Processing stage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessingConfig {
    /// Number of process pool members.
    #[serde(default = "default_processing_workers")]
    pub workers: usize,
    /// Hard time limit for one transform.
    #[serde(default = "default_processing_hard_limit")]
    pub hard_time_limit_secs: u64,
    /// Path of the external transform tool.
    #[serde(default = "default_tool_path")]
    pub tool_path: PathBuf,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            workers: default_processing_workers(),
            hard_time_limit_secs: default_processing_hard_limit(),
            tool_path: default_tool_path(),
        }
    }
}

fn default_processing_workers() -> usize {
    2
}

fn default_processing_hard_limit() -> u64 {
    3600
}

fn default_tool_path() -> PathBuf {
    PathBuf::from("seviri-transform")
}

/// Quality gate thresholds forwarded to the transform tool
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QualityConfig {
    /// Skip when more than this percentage of pixels is missing.
    #[serde(default = "default_max_missing_pct")]
    pub max_missing_pct: f64,
    /// Skip when the mean solar zenith angle exceeds this (nighttime).
    #[serde(default = "default_max_solar_zenith")]
    pub max_solar_zenith: f64,
    /// Reflectance above which a pixel counts as saturated.
    #[serde(default = "default_saturation_threshold")]
    pub saturation_threshold: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            max_missing_pct: default_max_missing_pct(),
            max_solar_zenith: default_max_solar_zenith(),
            saturation_threshold: default_saturation_threshold(),
        }
    }
}

fn default_max_missing_pct() -> f64 {
    50.0
}

fn default_max_solar_zenith() -> f64 {
    85.0
}

fn default_saturation_threshold() -> f64 {
    0.95
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub catalog: SanitizedCatalogConfig,
    pub discovery: DiscoveryConfig,
    pub download: DownloadConfig,
    pub processing: ProcessingConfig,
    pub quality: QualityConfig,
}

/// Sanitized catalog config (credentials hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedCatalogConfig {
    pub url: String,
    pub collection: String,
    pub credentials_configured: bool,
    pub timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            storage: config.storage.clone(),
            catalog: SanitizedCatalogConfig {
                url: config.catalog.url.clone(),
                collection: config.catalog.collection.clone(),
                credentials_configured: !config.catalog.key.is_empty()
                    && !config.catalog.secret.is_empty(),
                timeout_secs: config.catalog.timeout_secs,
            },
            discovery: config.discovery.clone(),
            download: config.download.clone(),
            processing: config.processing.clone(),
            quality: config.quality.clone(),
        }
    }
}
