//! HTTP surface tests against an in-process router with mock collaborators.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use helios_core::testing::MockCatalog;
use helios_core::{
    load_config_from_str, CatalogClient, DiscoveryScheduler, InMemoryBroker, ManifestStore,
    ProductDescriptor, SqliteManifestStore, TaskQueue,
};
use helios_server::api::create_router;
use helios_server::state::AppState;

struct TestFixture {
    router: Router,
    catalog: Arc<MockCatalog>,
    scheduler: Arc<DiscoveryScheduler>,
}

fn fixture() -> TestFixture {
    let config = load_config_from_str(
        r#"
[catalog]
url = "https://data.example.org"
key = "test-key"
secret = "test-secret"
collection = "EO:SAT:DAT:HRSEVIRI"
"#,
    )
    .unwrap();

    let manifest: Arc<dyn ManifestStore> = Arc::new(SqliteManifestStore::in_memory().unwrap());
    let queue: Arc<dyn TaskQueue> = Arc::new(InMemoryBroker::new());
    let catalog = Arc::new(MockCatalog::new());

    let scheduler = Arc::new(DiscoveryScheduler::new(
        config.discovery.clone(),
        Arc::clone(&manifest),
        Arc::clone(&queue),
        Arc::clone(&catalog) as Arc<dyn CatalogClient>,
    ));

    let registry = prometheus::Registry::new();
    for metric in helios_core::metrics::all_metrics() {
        // Registration can collide across fixtures within one process;
        // collisions are harmless here.
        let _ = registry.register(metric);
    }

    let state = Arc::new(AppState::new(
        config,
        manifest,
        queue,
        Arc::clone(&scheduler),
        registry,
    ));

    TestFixture {
        router: create_router(state),
        catalog,
        scheduler,
    }
}

fn descriptor(file_id: &str) -> ProductDescriptor {
    ProductDescriptor {
        file_id: file_id.to_string(),
        timestamp: Utc::now() - chrono::Duration::minutes(75),
        source_tag: "MSG4".to_string(),
        product_type: "HRSEVIRI".to_string(),
        size_bytes: 1024,
    }
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn post(router: &Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_root_reports_service_info() {
    let fx = fixture();
    let (status, body) = get(&fx.router, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "helios");
    assert_eq!(body["status"], "running");
}

#[tokio::test]
async fn test_health_reflects_scheduler_state() {
    let fx = fixture();

    let (status, body) = get(&fx.router, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["components"]["scheduler"], "stopped");
    assert_eq!(body["components"]["manifest"], "healthy");

    fx.scheduler.start();
    let (status, body) = get(&fx.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    fx.scheduler.stop();
}

#[tokio::test]
async fn test_trigger_poll_and_file_queries() {
    let fx = fixture();
    fx.catalog
        .set_search_results(vec![descriptor("X1"), descriptor("X2")])
        .await;

    let (status, report) = post(&fx.router, "/trigger-poll").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["outcome"], "SUCCESS");
    assert_eq!(report["files_found"], 2);
    assert_eq!(report["files_new"], 2);

    // Listing shows both queued records.
    let (status, body) = get(&fx.router, "/files").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);

    let (status, body) = get(&fx.router, "/files?status=QUEUED").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);

    let (status, body) = get(&fx.router, "/files/X1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["file_id"], "X1");
    assert_eq!(body["status"], "QUEUED");

    let (status, _) = get(&fx.router, "/files/unknown-id").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&fx.router, "/files?status=NOT_A_STATUS").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The cycle is visible in the query log.
    let (status, queries) = get(&fx.router, "/queries").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(queries.as_array().unwrap().len(), 1);
    assert_eq!(queries[0]["files_new"], 2);
}

#[tokio::test]
async fn test_status_surface() {
    let fx = fixture();
    fx.catalog.set_search_results(vec![descriptor("X1")]).await;
    post(&fx.router, "/trigger-poll").await;

    let (status, body) = get(&fx.router, "/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "helios");
    assert_eq!(body["files_by_status"]["QUEUED"], 1);
    assert_eq!(body["queue_depths"]["download"], 1);
    assert_eq!(body["queue_depths"]["process"], 0);
}

#[tokio::test]
async fn test_config_surface_redacts_secrets() {
    let fx = fixture();
    let (status, body) = get(&fx.router, "/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["catalog"]["credentials_configured"], true);

    let rendered = body.to_string();
    assert!(!rendered.contains("test-key"));
    assert!(!rendered.contains("test-secret"));
}

#[tokio::test]
async fn test_metrics_surface() {
    let fx = fixture();
    let response = fx
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("helios_"));
}
