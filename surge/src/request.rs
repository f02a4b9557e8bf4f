use crate::error::TransportError;
use crate::metrics::RunMetrics;
use crate::transport::{HttpRequest, HttpResponse, Transport};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use surge_core::Operation;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Result of one HTTP call. Produced once, never mutated.
#[derive(Debug)]
pub struct RequestOutcome {
    pub status: Option<u16>,
    pub body: Vec<u8>,
    pub latency: Duration,
    pub error: Option<TransportError>,
}

impl RequestOutcome {
    fn from_result(res: Result<HttpResponse, TransportError>, latency: Duration) -> Self {
        match res {
            Ok(HttpResponse { status, body }) => Self {
                status: Some(status),
                body,
                latency,
                error: None,
            },
            Err(error) => Self {
                status: None,
                body: vec![],
                latency,
                error: Some(error),
            },
        }
    }

    pub fn status_is(&self, status: u16) -> bool {
        self.status == Some(status)
    }

    pub fn status_in(&self, statuses: &[u16]) -> bool {
        self.status.is_some_and(|s| statuses.contains(&s))
    }

    pub fn faster_than(&self, budget: Duration) -> bool {
        self.error.is_none() && self.latency < budget
    }

    /// The body parsed as JSON, if it is valid JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// Issues requests on behalf of virtual users: waits on the shared rate limiter (if any), times
/// the call and feeds the latency and failure counters.
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    metrics: Arc<RunMetrics>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl RequestExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        metrics: Arc<RunMetrics>,
        rate_limit: Option<NonZeroU32>,
    ) -> Self {
        Self {
            transport,
            metrics,
            limiter: rate_limit.map(|rps| Arc::new(rate_limiter(rps))),
        }
    }

    pub fn metrics(&self) -> &Arc<RunMetrics> {
        &self.metrics
    }

    /// Send `request`, tagging its samples with `operation`. A response whose status is not in
    /// `accepted` counts as a failed request; its latency is still recorded.
    pub async fn execute(
        &self,
        operation: Operation,
        request: HttpRequest,
        accepted: &[u16],
    ) -> RequestOutcome {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        trace!("{} {}", request.method, request.path);
        let start = Instant::now();
        let res = self.transport.send(request).await;
        let outcome = RequestOutcome::from_result(res, start.elapsed());

        match &outcome.error {
            Some(err) => warn!("{operation} request failed: {err}"),
            None => self.metrics.record_latency(operation, outcome.latency),
        }
        self.metrics
            .record_request(operation, !outcome.status_in(accepted));

        outcome
    }
}

fn rate_limiter(rps: NonZeroU32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(rps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{empty, json, FnTransport};

    fn executor<F>(f: F) -> RequestExecutor
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        RequestExecutor::new(
            Arc::new(FnTransport(f)),
            Arc::new(RunMetrics::new()),
            None,
        )
    }

    // governor keeps its own clock, so this runs on wall time.
    #[tokio::test]
    async fn rate_limit_throttles_after_the_burst() {
        let rps = NonZeroU32::new(20).unwrap();
        let requests = RequestExecutor::new(
            Arc::new(FnTransport(|_: &HttpRequest| empty(200))),
            Arc::new(RunMetrics::new()),
            Some(rps),
        );

        // A quota of 20/s allows a burst of 20, then one request every 50ms.
        let start = std::time::Instant::now();
        for _ in 0..30 {
            requests
                .execute(Operation::ReadAll, HttpRequest::get("/api/users"), &[200])
                .await;
        }
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(450), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
        assert_eq!(requests.metrics().snapshot().requests.passed, 30);
    }

    #[tokio::test]
    async fn records_accepted_statuses() {
        let requests = executor(|req| match req.path.as_str() {
            "/api/users/1" => json(200, serde_json::json!({"id": "1"})),
            _ => empty(404),
        });

        let hit = requests
            .execute(Operation::ReadOne, HttpRequest::get("/api/users/1"), &[200, 404])
            .await;
        let miss = requests
            .execute(Operation::ReadOne, HttpRequest::get("/api/users/9"), &[200, 404])
            .await;
        let strict = requests
            .execute(Operation::ReadOne, HttpRequest::get("/api/users/9"), &[200])
            .await;

        assert!(hit.status_is(200));
        assert_eq!(hit.json().unwrap()["id"], "1");
        assert!(miss.status_is(404));
        assert!(miss.json().is_none());
        assert!(strict.status_in(&[404]));

        let snapshot = requests.metrics().snapshot();
        assert_eq!(snapshot.requests.passed, 2);
        assert_eq!(snapshot.requests.failed, 1);
        assert_eq!(snapshot.latency(Some(Operation::ReadOne)).map(|d| d.count()), Some(3));
    }

    #[tokio::test]
    async fn transport_errors_fail_without_latency() {
        let requests = executor(|_| Err(TransportError::Connection("refused".to_string())));

        let outcome = requests
            .execute(Operation::ReadAll, HttpRequest::get("/api/orders"), &[200])
            .await;

        assert!(outcome.status.is_none());
        assert!(outcome.error.is_some());
        assert!(!outcome.faster_than(Duration::from_secs(10)));

        let snapshot = requests.metrics().snapshot();
        assert_eq!(snapshot.requests.failed, 1);
        assert_eq!(snapshot.latency(Some(Operation::ReadAll)).map(|d| d.count()), Some(0));
    }
}
