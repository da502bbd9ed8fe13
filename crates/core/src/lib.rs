pub mod catalog;
pub mod config;
pub mod manifest;
pub mod metrics;
pub mod queue;
pub mod scheduler;
pub mod testing;
pub mod transform;
pub mod worker;

pub use catalog::{
    CatalogClient, CatalogError, OpenSearchCatalog, ProductDescriptor, SearchWindow, SpatialFilter,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use manifest::{
    FileRecord, FileStatus, ManifestError, ManifestFilter, ManifestPatch, ManifestStore,
    NewFileRecord, QualityFields, QueryLogEntry, QueryLogRecord, QueryOutcome,
    SqliteManifestStore, StatusCount,
};
pub use queue::{
    DownloadTask, InMemoryBroker, ProcessTask, QueueError, RetryPolicy, Stage, StageLimits, Task,
    TaskLease, TaskPayload, TaskQueue,
};
pub use scheduler::{search_window, DiscoveryReport, DiscoveryScheduler, SchedulerStatus};
pub use transform::{CommandTransformer, QualityReport, TransformError, Transformer};
pub use worker::{DownloadWorker, ProcessWorker, StageOutcome, StageWorker, WorkerPool};
