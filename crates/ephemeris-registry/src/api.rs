//! HTTP API handlers for the registry.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use ephemeris_proto::wire::{HEARTBEAT_PATH_PREFIX, REGKEY_HEADER, SERVICES_PATH};
use ephemeris_proto::{Registration, ServiceId, ServiceName};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{RegistryError, Result};
use crate::heartbeat::HeartbeatKind;
use crate::service::RegistryService;

/// Creates the API router.
pub fn router(service: Arc<RegistryService>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route(
            SERVICES_PATH,
            get(query_services)
                .post(register_service)
                .delete(deregister_service),
        )
        .route(&format!("{HEARTBEAT_PATH_PREFIX}/{{kind}}"), post(heartbeat))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
struct ServiceQuery {
    #[serde(rename = "serviceName")]
    service_name: Option<String>,
}

impl ServiceQuery {
    fn required_name(&self) -> Result<ServiceName> {
        match self.service_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Ok(ServiceName::from(name)),
            _ => Err(RegistryError::Malformed("serviceName is required".to_owned())),
        }
    }
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse { status: "healthy" })
}

/// Readiness check endpoint.
async fn readiness_check(State(service): State<Arc<RegistryService>>) -> impl IntoResponse {
    Json(ReadyResponse {
        ready: true,
        services: service.store().len(),
    })
}

/// Register a service instance.
async fn register_service(
    State(service): State<Arc<RegistryService>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<String> {
    let presented = headers.get(REGKEY_HEADER).and_then(|v| v.to_str().ok());
    if !service.regkey().verify(presented) {
        return Err(RegistryError::Unauthorized);
    }

    let registration: Registration =
        serde_json::from_slice(&body).map_err(|e| RegistryError::Malformed(e.to_string()))?;

    tracing::info!(
        service_name = %registration.service_name,
        service_url = %registration.service_url,
        "registration request"
    );

    let service_id = service.register(registration).await?;
    Ok(service_id.to_string())
}

/// List the instances of one role.
async fn query_services(
    State(service): State<Arc<RegistryService>>,
    Query(query): Query<ServiceQuery>,
) -> Result<Json<Vec<Registration>>> {
    let name = query.required_name()?;
    let instances = service.query(&name);
    if instances.is_empty() {
        tracing::debug!(service_name = %name, "no registrations found");
    }
    Ok(Json(instances))
}

/// Remove an instance; the body is its raw service URL.
async fn deregister_service(
    State(service): State<Arc<RegistryService>>,
    Query(query): Query<ServiceQuery>,
    body: String,
) -> Result<StatusCode> {
    let name = query.required_name()?;
    let url = body.trim();

    tracing::info!(service_name = %name, service_url = %url, "deregistration request");

    service.deregister(&name, url)?;
    Ok(StatusCode::OK)
}

/// Accept a heartbeat; the body is the raw service ID.
async fn heartbeat(
    State(service): State<Arc<RegistryService>>,
    Path(kind): Path<String>,
    body: String,
) -> Result<StatusCode> {
    let kind: HeartbeatKind = kind.parse()?;
    service.heartbeat(kind, &ServiceId::new(body))?;
    Ok(StatusCode::OK)
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    ready: bool,
    services: usize,
}
