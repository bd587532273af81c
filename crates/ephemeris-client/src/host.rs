//! Startup wrapper for a service that takes part in the registry.
//!
//! Order matters: the listener is bound and the patch receiver is serving
//! before the registration request goes out, so the catch-up patch always
//! finds its handler.

use axum::Router;
use ephemeris_proto::{RegKey, Registration, ServiceId};
use http::Uri;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cache::ProviderCache;
use crate::client::RegistrationClient;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::receiver::patch_router;
use crate::transport::RegistryApi;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// A bound listener waiting for its service to start.
#[derive(Debug)]
pub struct BoundHost {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl BoundHost {
    /// The address actually bound, useful when binding port 0.
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves `routes` plus the patch receiver, then registers.
    ///
    /// Returns once the registry acknowledged the registration; the
    /// heartbeat loop is running by then.
    pub async fn start(
        self,
        registration: Registration,
        routes: Router,
        api: Arc<dyn RegistryApi>,
        regkey: RegKey,
        config: &ClientConfig,
    ) -> Result<ServiceHost> {
        let Self {
            listener,
            local_addr,
        } = self;
        let cache = Arc::new(ProviderCache::new());

        let app = if registration.update_url.is_empty() {
            routes
        } else {
            let path = patch_path(&registration.update_url)?;
            info!(path = %path, "mounting patch receiver");
            routes.merge(patch_router(&path, cache.clone(), regkey))
        };

        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();

        let server_cancel = cancel.clone();
        tasks.spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_cancel.cancelled().await })
                .await
            {
                error!(error = %e, "service listener failed");
            }
        });
        info!(addr = %local_addr, "service listening");

        let client = Arc::new(RegistrationClient::new(api, registration, cache.clone(), config));
        if let Err(e) = client.register(&cancel).await {
            cancel.cancel();
            tasks.shutdown().await;
            return Err(e);
        }

        tasks.spawn(client.clone().run_heartbeats(cancel.clone()));

        Ok(ServiceHost {
            client,
            cache,
            local_addr,
            cancel,
            tasks,
        })
    }
}

/// A running, registered service.
#[derive(Debug)]
pub struct ServiceHost {
    client: Arc<RegistrationClient>,
    cache: Arc<ProviderCache>,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
}

impl ServiceHost {
    /// Binds the service's listener. Failing here is the one fatal error.
    pub async fn bind(listen_addr: SocketAddr) -> Result<BoundHost> {
        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(ClientError::Bind)?;
        let local_addr = listener.local_addr().map_err(ClientError::Bind)?;
        Ok(BoundHost {
            listener,
            local_addr,
        })
    }

    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Providers of the roles this service depends on.
    pub fn cache(&self) -> &Arc<ProviderCache> {
        &self.cache
    }

    pub fn client(&self) -> &Arc<RegistrationClient> {
        &self.client
    }

    pub fn service_id(&self) -> Option<ServiceId> {
        self.client.service_id()
    }

    /// Deregisters, stops heartbeating and stops serving.
    pub async fn shutdown(mut self) {
        self.client.deregister().await;
        self.cancel.cancel();

        let deadline = tokio::time::Instant::now() + SHUTDOWN_TIMEOUT;
        while let Some(result) = tokio::time::timeout_at(deadline, self.tasks.join_next())
            .await
            .ok()
            .flatten()
        {
            if let Err(e) = result {
                warn!(error = %e, "service task panicked");
            }
        }

        if !self.tasks.is_empty() {
            warn!(remaining = self.tasks.len(), "tasks did not stop in time");
            self.tasks.abort_all();
        }

        info!(addr = %self.local_addr, "service stopped");
    }
}

fn patch_path(update_url: &str) -> Result<String> {
    let uri: Uri = update_url
        .parse()
        .map_err(|e| ClientError::Config(format!("invalid serviceUpdateURL {update_url}: {e}")))?;
    Ok(match uri.path() {
        "" => "/".to_owned(),
        path => path.to_owned(),
    })
}
