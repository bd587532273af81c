//! Endpoint the registry pushes patches to.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use ephemeris_proto::wire::REGKEY_HEADER;
use ephemeris_proto::{Patch, RegKey};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::ProviderCache;

#[derive(Clone)]
struct ReceiverState {
    cache: Arc<ProviderCache>,
    regkey: RegKey,
}

/// Creates a router that applies pushed patches to `cache`.
///
/// Mount it on the same listener as the service's own routes, before the
/// service registers, so no patch can arrive ahead of the handler.
pub fn patch_router(path: &str, cache: Arc<ProviderCache>, regkey: RegKey) -> Router {
    Router::new()
        .route(path, post(receive_patch))
        .with_state(ReceiverState { cache, regkey })
}

async fn receive_patch(
    State(state): State<ReceiverState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let presented = headers.get(REGKEY_HEADER).and_then(|v| v.to_str().ok());
    if !state.regkey.verify(presented) {
        warn!("rejected patch with missing or wrong regkey");
        return StatusCode::UNAUTHORIZED;
    }

    let patch: Patch = match serde_json::from_slice(&body) {
        Ok(patch) => patch,
        Err(e) => {
            debug!(error = %e, "undecodable patch");
            return StatusCode::BAD_REQUEST;
        }
    };

    state.cache.apply(&patch);
    StatusCode::OK
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use ephemeris_proto::{Registration, ServiceName};
    use tower::ServiceExt;

    fn setup() -> (Router, Arc<ProviderCache>) {
        let cache = Arc::new(ProviderCache::new());
        let app = patch_router("/services", cache.clone(), RegKey::new("secret"));
        (app, cache)
    }

    fn patch_body() -> Body {
        let patch = Patch::added(vec![Registration::new(
            ServiceName::Log,
            "http://10.0.0.1:4000",
        )]);
        Body::from(serde_json::to_vec(&patch).unwrap())
    }

    #[tokio::test]
    async fn valid_patch_is_applied() {
        let (app, cache) = setup();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/services")
                    .header(REGKEY_HEADER, "secret")
                    .body(patch_body())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(cache.get(&ServiceName::Log).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn wrong_regkey_is_rejected() {
        let (app, cache) = setup();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/services")
                    .header(REGKEY_HEADER, "guess")
                    .body(patch_body())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(cache.names().is_empty());
    }

    #[tokio::test]
    async fn malformed_patch_is_bad_request() {
        let (app, cache) = setup();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/services")
                    .header(REGKEY_HEADER, "secret")
                    .body(Body::from("[1, 2"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(cache.names().is_empty());
    }

    #[tokio::test]
    async fn other_methods_not_allowed() {
        let (app, _) = setup();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/services")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
