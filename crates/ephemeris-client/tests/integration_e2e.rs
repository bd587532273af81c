//! End-to-end tests of hosts registering with a live registry.

mod common;

use common::{eventually, log_at, web_at, TestRegistry};
use ephemeris_client::ClientState;
use ephemeris_proto::{Registration, ServiceId, ServiceName};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(3);

#[tokio::test]
async fn dependent_sees_existing_provider_on_start() {
    let registry = TestRegistry::start().await;
    let log = registry.host(log_at).await;

    let web = registry.host(web_at).await;

    // Catch-up is delivered before the register call returns.
    let providers = web.cache().get(&ServiceName::Log).unwrap();
    assert_eq!(providers.len(), 1);
    assert_eq!(providers[0].service_url, format!("http://{}", log.local_addr()));

    web.shutdown().await;
    log.shutdown().await;
}

#[tokio::test]
async fn dependent_tracks_provider_arrival_and_departure() {
    let registry = TestRegistry::start().await;
    let web = registry.host(web_at).await;
    assert!(web.cache().get(&ServiceName::Log).is_err());

    let log = registry.host(log_at).await;
    assert!(
        eventually(WAIT, || web
            .cache()
            .get(&ServiceName::Log)
            .is_ok_and(|p| p.len() == 1))
        .await
    );

    log.shutdown().await;
    assert!(
        eventually(WAIT, || web
            .cache()
            .get(&ServiceName::Log)
            .is_ok_and(|p| p.is_empty()))
        .await
    );
    assert!(registry.service.query(&ServiceName::Log).is_empty());

    web.shutdown().await;
}

#[tokio::test]
async fn heartbeats_keep_hosts_registered() {
    let registry = TestRegistry::start().await;
    let log = registry.host(log_at).await;

    // Several eviction timeouts pass.
    tokio::time::sleep(Duration::from_millis(1200)).await;

    let registered = registry.service.query(&ServiceName::Log);
    assert_eq!(registered.len(), 1);
    assert_eq!(Some(registered[0].service_id.clone()), log.service_id());

    log.shutdown().await;
}

#[tokio::test]
async fn host_reregisters_after_registry_forgets_it() {
    let registry = TestRegistry::start().await;
    let web = registry.host(web_at).await;
    let first = web.service_id().unwrap();
    let url = web.client().registration().service_url.clone();

    // Simulate lost registry state.
    registry.service.deregister(&ServiceName::Web, &url).unwrap();

    let reregistered =
        eventually(WAIT, || web.service_id().is_some_and(|id| id != first)).await;
    assert!(reregistered);

    let current: Option<ServiceId> = web.service_id();
    assert!(eventually(WAIT, || {
        registry
            .service
            .query(&ServiceName::Web)
            .iter()
            .any(|r| Some(r.service_id.clone()) == current)
    })
    .await);

    web.shutdown().await;
}

#[tokio::test]
async fn shutdown_terminates_client() {
    let registry = TestRegistry::start().await;
    let log = registry.host(log_at).await;
    let client = log.client().clone();

    log.shutdown().await;

    assert_eq!(client.state(), ClientState::Terminated);
    assert!(registry.service.query(&ServiceName::Log).is_empty());
}

#[tokio::test]
async fn custom_names_survive_query_and_deregister() {
    let registry = TestRegistry::start().await;
    let api = registry.api();

    for raw in ["billing eu", "billing&eu", "billing/eu?x=1"] {
        let name = ServiceName::from(raw);
        let url = "http://10.9.0.1:7000";
        api.register(&Registration::new(name.clone(), url))
            .await
            .unwrap();

        let found = api.query(&name).await.unwrap();
        assert_eq!(found.len(), 1, "query for {raw:?}");
        assert_eq!(found[0].service_name, name);

        api.deregister(&name, url).await.unwrap();
        assert!(api.query(&name).await.unwrap().is_empty());
    }
}
