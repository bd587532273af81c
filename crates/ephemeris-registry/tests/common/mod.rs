//! Common test utilities for registry integration tests.

#![allow(dead_code)]

pub mod fixtures;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use ephemeris_proto::wire::REGKEY_HEADER;
use ephemeris_proto::{RegKey, Registration};
use ephemeris_registry::{
    api, HeartbeatConfig, NotifyConfig, RecordingDelivery, RegistryConfig, RegistryService,
};
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const TEST_REGKEY: &str = "integration-key";

/// Complete test registry with patches captured in memory.
pub struct TestRegistry {
    pub service: Arc<RegistryService>,
    pub recorder: Arc<RecordingDelivery>,
}

impl TestRegistry {
    /// Creates a registry with default timings.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Creates a registry from the given configuration.
    pub fn with_config(config: RegistryConfig) -> Self {
        let recorder = Arc::new(RecordingDelivery::new());
        let service = Arc::new(RegistryService::with_delivery(
            &config,
            RegKey::new(TEST_REGKEY),
            recorder.clone(),
        ));
        Self { service, recorder }
    }

    /// Creates a registry with short heartbeat timings for eviction tests.
    pub fn with_fast_heartbeats() -> Self {
        Self::with_config(fast_config())
    }

    /// Returns a fresh router over this registry.
    pub fn app(&self) -> Router {
        api::router(self.service.clone())
    }

    /// Sends a request through the router, returning status and body text.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    /// Registers over the API and returns the issued ID.
    pub async fn register(&self, registration: &Registration) -> String {
        let (status, body) = self.send(register_request(registration)).await;
        assert_eq!(status, StatusCode::OK, "register failed: {body}");
        body
    }

    /// Queries one role over the API.
    pub async fn query(&self, service_name: &str) -> Vec<Registration> {
        let (status, body) = self
            .send(
                Request::builder()
                    .uri(format!("/services?serviceName={service_name}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "query failed: {body}");
        serde_json::from_str(&body).unwrap()
    }
}

impl Default for TestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration with sub-second heartbeat timings.
pub fn fast_config() -> RegistryConfig {
    RegistryConfig {
        heartbeat: HeartbeatConfig {
            sweep_interval: Duration::from_millis(50),
            timeout: Duration::from_millis(150),
        },
        notify: NotifyConfig {
            delivery_timeout: Duration::from_millis(500),
            max_in_flight: 8,
        },
        ..RegistryConfig::default()
    }
}

/// Builds an authorised registration request.
pub fn register_request(registration: &Registration) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/services")
        .header(REGKEY_HEADER, TEST_REGKEY)
        .body(Body::from(serde_json::to_vec(registration).unwrap()))
        .unwrap()
}

/// Builds a deregistration request.
pub fn deregister_request(service_name: &str, service_url: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(format!("/services?serviceName={service_name}"))
        .body(Body::from(service_url.to_owned()))
        .unwrap()
}

/// Builds a basic heartbeat request.
pub fn heartbeat_request(service_id: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/heartbeat/basic")
        .body(Body::from(service_id.to_owned()))
        .unwrap()
}
