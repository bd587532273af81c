//! Common test utilities for client integration tests.

#![allow(dead_code)]

use axum::Router;
use ephemeris_client::{ClientConfig, HttpRegistryApi, RegistryApi, ServiceHost};
use ephemeris_proto::{RegKey, Registration, ServiceName};
use ephemeris_registry::{api, HeartbeatConfig, RegistryConfig, RegistryService};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub const TEST_REGKEY: &str = "client-integration-key";

/// A registry served on loopback with its sweep running.
pub struct TestRegistry {
    pub service: Arc<RegistryService>,
    pub url: String,
    cancel: CancellationToken,
}

impl TestRegistry {
    /// Starts a registry with sub-second heartbeat timings.
    pub async fn start() -> Self {
        let config = RegistryConfig {
            heartbeat: HeartbeatConfig {
                sweep_interval: Duration::from_millis(100),
                timeout: Duration::from_millis(400),
            },
            ..RegistryConfig::default()
        };
        let service = Arc::new(RegistryService::new(&config, RegKey::new(TEST_REGKEY)));
        let cancel = CancellationToken::new();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = api::router(service.clone());
        let server_cancel = cancel.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_cancel.cancelled().await })
                .await
                .unwrap();
        });
        tokio::spawn(service.clone().run_sweeps(cancel.clone()));

        Self {
            service,
            url: format!("http://{addr}"),
            cancel,
        }
    }

    /// Client settings pointing at this registry.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_registry_url(self.url.clone())
            .with_retry_interval(Duration::from_millis(50))
            .with_heartbeat_interval(Duration::from_millis(50))
            .with_request_timeout(Duration::from_secs(2))
    }

    pub fn api(&self) -> Arc<dyn RegistryApi> {
        Arc::new(HttpRegistryApi::new(
            &self.client_config(),
            RegKey::new(TEST_REGKEY),
        ))
    }

    /// Binds a loopback host and starts it with the registration `describe` builds.
    pub async fn host(&self, describe: impl FnOnce(String) -> Registration) -> ServiceHost {
        let bound = ServiceHost::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let registration = describe(format!("http://{}", bound.local_addr()));
        bound
            .start(
                registration,
                Router::new(),
                self.api(),
                RegKey::new(TEST_REGKEY),
                &self.client_config(),
            )
            .await
            .unwrap()
    }
}

impl Drop for TestRegistry {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A provider with no dependencies.
pub fn log_at(base: String) -> Registration {
    Registration::new(ServiceName::Log, base)
}

/// A dependent that follows the log role.
pub fn web_at(base: String) -> Registration {
    Registration::new(ServiceName::Web, base.clone())
        .requires(ServiceName::Log)
        .with_update_url(format!("{base}/services"))
}

/// Polls `check` until it holds or `within` elapses.
pub async fn eventually(within: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
