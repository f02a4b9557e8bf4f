//! Shared fixtures for the end-to-end suites.
use futures::future::{BoxFuture, FutureExt};
use std::sync::{Arc, Mutex, PoisonError};
use surge::prelude::*;
use surge::transport::Method;
use surge::TransportError;

/// One call as seen on the wire.
#[derive(Clone, Debug)]
pub struct Exchange {
    pub method: Method,
    pub path: String,
    pub status: Option<u16>,
}

/// Wraps a [`ReqwestTransport`] and remembers every exchange.
#[derive(Clone)]
pub struct RecordingTransport {
    inner: ReqwestTransport,
    log: Arc<Mutex<Vec<Exchange>>>,
}

impl RecordingTransport {
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: ReqwestTransport::new(base_url),
            log: Arc::default(),
        }
    }

    pub fn exchanges(&self) -> Vec<Exchange> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        async move {
            let method = request.method.clone();
            let path = request.path.clone();
            let res = self.inner.send(request).await;

            self.log
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Exchange {
                    method,
                    path,
                    status: res.as_ref().ok().map(|r| r.status),
                });
            res
        }
        .boxed()
    }
}

/// `/api/{resource}/{id}`
pub fn is_item_path(path: &str) -> bool {
    path.trim_start_matches('/').split('/').count() == 3
}
