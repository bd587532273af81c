//! Dependency-scoped patch delivery.
//!
//! Every registered instance receives only the part of a patch it declared a
//! dependency on. Each delivery runs as its own task so a slow or dead
//! recipient never holds up the rest. A permit is taken before a delivery
//! task is spawned, which caps the number of live tasks. Deliveries are not
//! retried.

use async_trait::async_trait;
use ephemeris_proto::wire::REGKEY_HEADER;
use ephemeris_proto::{Patch, RegKey, Registration};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::NotifyConfig;
use crate::error::{RegistryError, Result};

/// Transport used to hand a patch to one recipient.
#[async_trait]
pub trait PatchDelivery: Send + Sync {
    /// Delivers `patch` to the recipient's update address.
    async fn deliver(&self, target: &str, patch: &Patch) -> Result<()>;
}

/// Pushes patches over HTTP with the shared registry key attached.
pub struct HttpDelivery {
    client: Client<HttpConnector, Full<Bytes>>,
    regkey: RegKey,
}

impl HttpDelivery {
    /// Creates an HTTP delivery authorised by `regkey`.
    #[must_use]
    pub fn new(regkey: RegKey) -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
            regkey,
        }
    }
}

impl std::fmt::Debug for HttpDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDelivery").finish_non_exhaustive()
    }
}

#[async_trait]
impl PatchDelivery for HttpDelivery {
    async fn deliver(&self, target: &str, patch: &Patch) -> Result<()> {
        let failed = |reason: String| RegistryError::Delivery {
            target: target.to_owned(),
            reason,
        };

        let body = serde_json::to_vec(patch).map_err(|e| failed(e.to_string()))?;
        let request = Request::builder()
            .method(Method::POST)
            .uri(target)
            .header(hyper::header::CONTENT_TYPE, "application/json")
            .header(REGKEY_HEADER, self.regkey.expose())
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| failed(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| failed(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(failed(format!("recipient responded {}", response.status())));
        }
        Ok(())
    }
}

/// Computes per-recipient patches and delivers them.
pub struct PatchNotifier {
    delivery: Arc<dyn PatchDelivery>,
    limiter: Arc<Semaphore>,
    timeout: Duration,
}

impl PatchNotifier {
    /// Creates a notifier over the given transport.
    pub fn new(delivery: Arc<dyn PatchDelivery>, config: &NotifyConfig) -> Self {
        Self {
            delivery,
            limiter: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            timeout: config.delivery_timeout,
        }
    }

    /// Delivers one patch and waits for the outcome.
    ///
    /// Used for the catch-up patch, whose failure fails the registration.
    /// It takes no fan-out permit, so saturated fan-outs never delay it.
    pub async fn deliver(&self, target: &str, patch: &Patch) -> Result<()> {
        deliver_with_timeout(&*self.delivery, self.timeout, target, patch).await
    }

    /// Sends each recipient its scoped view of `full`, fire-and-forget.
    ///
    /// A single dispatcher task hands out deliveries as permits free up,
    /// so at most `max_in_flight` delivery tasks exist at once. Returns the
    /// number of deliveries queued.
    pub fn fan_out<'a>(
        &self,
        full: &Patch,
        recipients: impl IntoIterator<Item = &'a Registration>,
    ) -> usize {
        let queued: Vec<(String, Patch)> = recipients
            .into_iter()
            .filter_map(|recipient| {
                let scoped = full.scoped_to(recipient);
                (!scoped.is_empty()).then(|| (recipient.update_url.clone(), scoped))
            })
            .collect();

        let count = queued.len();
        if count == 0 {
            return 0;
        }

        let delivery = Arc::clone(&self.delivery);
        let limiter = Arc::clone(&self.limiter);
        let timeout = self.timeout;

        tokio::spawn(async move {
            for (target, patch) in queued {
                let Ok(permit) = Arc::clone(&limiter).acquire_owned().await else {
                    warn!("patch limiter closed, dropping remaining deliveries");
                    return;
                };
                let delivery = Arc::clone(&delivery);

                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = deliver_with_timeout(&*delivery, timeout, &target, &patch).await
                    {
                        warn!(error = %e, "patch delivery failed");
                    }
                });
            }
        });

        count
    }
}

impl std::fmt::Debug for PatchNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchNotifier")
            .field("available_permits", &self.limiter.available_permits())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

async fn deliver_with_timeout(
    delivery: &dyn PatchDelivery,
    timeout: Duration,
    target: &str,
    patch: &Patch,
) -> Result<()> {
    debug!(
        target = %target,
        added = patch.added.len(),
        removed = patch.removed.len(),
        "sending patch"
    );

    tokio::time::timeout(timeout, delivery.deliver(target, patch))
        .await
        .map_err(|_| RegistryError::Delivery {
            target: target.to_owned(),
            reason: format!("timed out after {timeout:?}"),
        })?
}

/// In-memory delivery for testing.
///
/// Records every patch it receives. Targets can be made to fail outright or
/// to hang until the notifier's timeout fires.
#[derive(Debug, Default)]
pub struct RecordingDelivery {
    attempts: AtomicUsize,
    delivered: Mutex<Vec<(String, Patch)>>,
    failing: Mutex<HashSet<String>>,
    stalled: Mutex<HashSet<String>>,
}

impl RecordingDelivery {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes deliveries to `target` fail immediately.
    pub fn fail(&self, target: &str) {
        self.failing.lock().insert(target.to_owned());
    }

    /// Makes deliveries to `target` never complete.
    pub fn stall(&self, target: &str) {
        self.stalled.lock().insert(target.to_owned());
    }

    /// Returns how many deliveries have started, stalled ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Returns every patch delivered so far, in arrival order.
    pub fn delivered(&self) -> Vec<(String, Patch)> {
        self.delivered.lock().clone()
    }

    /// Returns the patches delivered to one target.
    pub fn delivered_to(&self, target: &str) -> Vec<Patch> {
        self.delivered
            .lock()
            .iter()
            .filter(|(t, _)| t == target)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Waits until at least `count` patches reached `target`.
    ///
    /// Returns false if `within` elapses first.
    pub async fn wait_for(&self, target: &str, count: usize, within: Duration) -> bool {
        let deadline = Instant::now() + within;
        loop {
            if self.delivered_to(target).len() >= count {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl PatchDelivery for RecordingDelivery {
    async fn deliver(&self, target: &str, patch: &Patch) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.stalled.lock().contains(target) {
            std::future::pending::<()>().await;
        }
        if self.failing.lock().contains(target) {
            return Err(RegistryError::Delivery {
                target: target.to_owned(),
                reason: "connection refused".to_owned(),
            });
        }
        self.delivered
            .lock()
            .push((target.to_owned(), patch.clone()));
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use ephemeris_proto::ServiceName;

    fn config(timeout: Duration) -> NotifyConfig {
        NotifyConfig {
            delivery_timeout: timeout,
            max_in_flight: 4,
        }
    }

    fn narrow(max_in_flight: usize) -> NotifyConfig {
        NotifyConfig {
            delivery_timeout: Duration::from_secs(30),
            max_in_flight,
        }
    }

    fn dependent(url: &str, requires: ServiceName) -> Registration {
        Registration::new(ServiceName::Web, url)
            .requires(requires)
            .with_update_url(format!("{url}/services"))
    }

    #[tokio::test]
    async fn fan_out_skips_recipients_without_dependency() {
        let recorder = Arc::new(RecordingDelivery::new());
        let notifier = PatchNotifier::new(recorder.clone(), &config(Duration::from_secs(1)));

        let wants_log = dependent("http://a", ServiceName::Log);
        let wants_payment = dependent("http://b", ServiceName::Payment);
        let patch = Patch::added(vec![Registration::new(ServiceName::Log, "http://l")]);

        let started = notifier.fan_out(&patch, [&wants_log, &wants_payment]);
        assert_eq!(started, 1);

        assert!(
            recorder
                .wait_for("http://a/services", 1, Duration::from_secs(1))
                .await
        );
        assert!(recorder.delivered_to("http://b/services").is_empty());
    }

    #[tokio::test]
    async fn stalled_recipient_does_not_block_others() {
        let recorder = Arc::new(RecordingDelivery::new());
        recorder.stall("http://dead/services");
        let notifier = PatchNotifier::new(recorder.clone(), &config(Duration::from_secs(30)));

        let dead = dependent("http://dead", ServiceName::Log);
        let alive = dependent("http://alive", ServiceName::Log);
        let patch = Patch::added(vec![Registration::new(ServiceName::Log, "http://l")]);

        notifier.fan_out(&patch, [&dead, &alive]);

        assert!(
            recorder
                .wait_for("http://alive/services", 1, Duration::from_millis(500))
                .await
        );
    }

    #[tokio::test]
    async fn deliver_times_out() {
        let recorder = Arc::new(RecordingDelivery::new());
        recorder.stall("http://dead/services");
        let notifier = PatchNotifier::new(recorder, &config(Duration::from_millis(50)));

        let result = notifier
            .deliver("http://dead/services", &Patch::default())
            .await;
        assert!(matches!(result, Err(RegistryError::Delivery { .. })));
    }

    #[tokio::test]
    async fn deliver_reports_failure() {
        let recorder = Arc::new(RecordingDelivery::new());
        recorder.fail("http://gone/services");
        let notifier = PatchNotifier::new(recorder, &config(Duration::from_secs(1)));

        let result = notifier
            .deliver("http://gone/services", &Patch::default())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn live_deliveries_capped_by_max_in_flight() {
        let recorder = Arc::new(RecordingDelivery::new());
        let recipients: Vec<Registration> = (0..50)
            .map(|i| dependent(&format!("http://dead-{i}"), ServiceName::Log))
            .collect();
        for recipient in &recipients {
            recorder.stall(&recipient.update_url);
        }
        let notifier = PatchNotifier::new(recorder.clone(), &narrow(2));
        let patch = Patch::added(vec![Registration::new(ServiceName::Log, "http://l")]);

        assert_eq!(notifier.fan_out(&patch, &recipients), 50);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(recorder.attempts(), 2);
    }

    #[tokio::test]
    async fn catch_up_ignores_saturated_fan_out() {
        let recorder = Arc::new(RecordingDelivery::new());
        recorder.stall("http://dead-a/services");
        recorder.stall("http://dead-b/services");
        let notifier = PatchNotifier::new(recorder.clone(), &narrow(2));

        let dead = [
            dependent("http://dead-a", ServiceName::Log),
            dependent("http://dead-b", ServiceName::Log),
        ];
        let patch = Patch::added(vec![Registration::new(ServiceName::Log, "http://l")]);
        notifier.fan_out(&patch, &dead);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let catch_up = Patch::added(vec![Registration::new(ServiceName::Log, "http://l")]);
        let result = tokio::time::timeout(
            Duration::from_millis(500),
            notifier.deliver("http://fresh/services", &catch_up),
        )
        .await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}
