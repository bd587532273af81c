//! Calls from a service to the registry.

use async_trait::async_trait;
use ephemeris_proto::wire::{
    BASIC_HEARTBEAT_PATH, REGKEY_HEADER, SERVICES_PATH, SERVICE_NAME_QUERY,
};
use ephemeris_proto::{RegKey, Registration, ServiceId, ServiceName};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Registry operations a service performs on its own behalf.
#[async_trait]
pub trait RegistryApi: Send + Sync {
    /// Registers an instance and returns the ID the registry issued.
    async fn register(&self, registration: &Registration) -> Result<ServiceId>;

    /// Reports the instance alive. `Unauthorized` means the ID is unknown.
    async fn heartbeat(&self, service_id: &ServiceId) -> Result<()>;

    /// Removes an instance.
    async fn deregister(&self, service_name: &ServiceName, service_url: &str) -> Result<()>;

    /// Lists the current instances of a role.
    async fn query(&self, service_name: &ServiceName) -> Result<Vec<Registration>>;
}

/// Talks to the registry over HTTP/1.
pub struct HttpRegistryApi {
    client: Client<HttpConnector, Full<Bytes>>,
    base_url: String,
    regkey: RegKey,
    timeout: Duration,
}

impl HttpRegistryApi {
    #[must_use]
    pub fn new(config: &ClientConfig, regkey: RegKey) -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
            base_url: config.registry_url.trim_end_matches('/').to_owned(),
            regkey,
            timeout: config.request_timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// The services endpoint filtered to one role, with the name encoded.
    fn services_url(&self, service_name: &ServiceName) -> Result<String> {
        let mut url = Url::parse(&self.url(SERVICES_PATH))
            .map_err(|e| ClientError::Config(format!("invalid registry URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair(SERVICE_NAME_QUERY, service_name.as_str());
        Ok(url.into())
    }

    async fn send(&self, request: Request<Full<Bytes>>) -> Result<(StatusCode, Bytes)> {
        let exchange = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| ClientError::Transport(e.to_string()))?;
            let status = response.status();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| ClientError::Transport(e.to_string()))?
                .to_bytes();
            Ok::<_, ClientError>((status, body))
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ClientError::Timeout(self.timeout))?
    }
}

impl std::fmt::Debug for HttpRegistryApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRegistryApi")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn expect_ok(status: StatusCode) -> Result<()> {
    match status {
        StatusCode::OK => Ok(()),
        StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
        other => Err(ClientError::Status(other)),
    }
}

fn build(
    request: http::request::Builder,
    body: impl Into<Bytes>,
) -> Result<Request<Full<Bytes>>> {
    request
        .body(Full::new(body.into()))
        .map_err(|e| ClientError::Transport(e.to_string()))
}

#[async_trait]
impl RegistryApi for HttpRegistryApi {
    async fn register(&self, registration: &Registration) -> Result<ServiceId> {
        let body =
            serde_json::to_vec(registration).map_err(|e| ClientError::Malformed(e.to_string()))?;
        let request = build(
            Request::builder()
                .method(Method::POST)
                .uri(self.url(SERVICES_PATH))
                .header(hyper::header::CONTENT_TYPE, "application/json")
                .header(REGKEY_HEADER, self.regkey.expose()),
            body,
        )?;

        let (status, body) = self.send(request).await?;
        expect_ok(status)?;

        let raw = std::str::from_utf8(&body).map_err(|e| ClientError::Malformed(e.to_string()))?;
        let service_id = ServiceId::new(raw);
        if service_id.is_empty() {
            return Err(ClientError::Malformed("empty service ID".to_owned()));
        }
        Ok(service_id)
    }

    async fn heartbeat(&self, service_id: &ServiceId) -> Result<()> {
        let request = build(
            Request::builder()
                .method(Method::POST)
                .uri(self.url(BASIC_HEARTBEAT_PATH))
                .header(hyper::header::CONTENT_TYPE, "text/plain"),
            service_id.as_str().to_owned(),
        )?;

        let (status, _) = self.send(request).await?;
        expect_ok(status)
    }

    async fn deregister(&self, service_name: &ServiceName, service_url: &str) -> Result<()> {
        let request = build(
            Request::builder()
                .method(Method::DELETE)
                .uri(self.services_url(service_name)?)
                .header(hyper::header::CONTENT_TYPE, "text/plain"),
            service_url.to_owned(),
        )?;

        let (status, _) = self.send(request).await?;
        expect_ok(status)
    }

    async fn query(&self, service_name: &ServiceName) -> Result<Vec<Registration>> {
        let request = build(
            Request::builder()
                .method(Method::GET)
                .uri(self.services_url(service_name)?),
            Bytes::new(),
        )?;

        let (status, body) = self.send(request).await?;
        expect_ok(status)?;
        serde_json::from_slice(&body).map_err(|e| ClientError::Malformed(e.to_string()))
    }
}
