use {
    crate::{
        Error,
        transport::{Call, Transport},
    },
    itertools::Itertools,
    serde_json::Value,
    std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

/// Index into the configured endpoint list.
pub type EndpointId = usize;

/// The first configured endpoint.
pub const PRIMARY: EndpointId = 0;
/// The second configured endpoint. Batched reads go here by default.
pub const SECONDARY: EndpointId = 1;

/// At most this many endpoints (starting with the primary) take part in the
/// round-robin rotation.
const ROTATION_LEN: usize = 2;

pub struct Endpoint {
    pub name: String,
    pub transport: Arc<dyn Transport>,
}

/// Round-robin position over the first endpoints of a client.
#[derive(Debug)]
struct Rotation {
    counter: AtomicUsize,
    len: usize,
}

impl Rotation {
    fn new(endpoints: usize) -> Self {
        Self {
            counter: AtomicUsize::new(0),
            len: endpoints.min(ROTATION_LEN),
        }
    }

    fn members(&self) -> impl Iterator<Item = EndpointId> + use<> {
        0..self.len
    }

    /// Returns the endpoint whose turn it is and advances the rotation.
    fn next(&self) -> EndpointId {
        self.counter.fetch_add(1, Ordering::Relaxed) % self.len
    }
}

/// JSON-RPC client over an ordered list of endpoints that fails over to the
/// next endpoint when one misbehaves.
pub struct RpcClient {
    endpoints: Vec<Endpoint>,
    rotation: Rotation,
    metrics: &'static Metrics,
}

impl RpcClient {
    /// Creates a client over `endpoints`, the first of which is the primary.
    ///
    /// Returns `None` if no endpoints are given.
    pub fn new(endpoints: Vec<Endpoint>) -> Option<Self> {
        if endpoints.is_empty() {
            return None;
        }
        Some(Self {
            rotation: Rotation::new(endpoints.len()),
            endpoints,
            metrics: Metrics::get(),
        })
    }

    pub fn endpoints(&self) -> usize {
        self.endpoints.len()
    }

    /// Endpoints to try in order for a single call.
    fn candidates(&self, preferred: Option<EndpointId>) -> Vec<EndpointId> {
        let ids: Box<dyn Iterator<Item = EndpointId>> = match preferred {
            Some(preferred) => Box::new(std::iter::once(preferred).chain(self.rotation.members())),
            None => Box::new(std::iter::once(self.rotation.next()).chain(0..self.endpoints.len())),
        };
        ids.filter(|id| *id < self.endpoints.len()).unique().collect()
    }

    /// Executes a single call, trying endpoints in order until one succeeds.
    ///
    /// Transport failures as well as JSON-RPC error responses move on to the
    /// next candidate. Only when every candidate failed the last error is
    /// returned, wrapped in [`Error::Exhausted`].
    pub async fn call(
        &self,
        method: &str,
        params: Vec<Value>,
        preferred: Option<EndpointId>,
    ) -> Result<Value, Error> {
        let candidates = self.candidates(preferred);
        let attempts = candidates.len();
        let mut last = None;
        for (attempt, id) in candidates.into_iter().enumerate() {
            let endpoint = &self.endpoints[id];
            let result = {
                let _timer = self.metrics.on_request_start(&endpoint.name, method);
                endpoint
                    .transport
                    .call(method.to_string(), params.clone())
                    .await
            };
            self.metrics.on_request_end(&endpoint.name, method, &result);
            match result {
                Ok(value) => return Ok(value),
                Err(err) if attempt + 1 < attempts => {
                    tracing::warn!(endpoint = %endpoint.name, method, ?err, "rpc call failed, trying next endpoint");
                    self.metrics.failovers.with_label_values(&[&endpoint.name]).inc();
                    last = Some(err);
                }
                Err(err) => {
                    tracing::warn!(endpoint = %endpoint.name, method, ?err, "rpc call failed on last endpoint");
                    last = Some(err);
                }
            }
        }
        Err(Error::Exhausted {
            attempts,
            last: Box::new(last.unwrap_or_else(|| {
                Error::Transport("no endpoint available".to_string())
            })),
        })
    }

    /// Sends all calls as one batch to `preferred` or, by default, the
    /// secondary endpoint. A failed batch is retried once on the primary.
    pub async fn batch_call(
        &self,
        calls: Vec<Call>,
        preferred: Option<EndpointId>,
    ) -> Result<Vec<Result<Value, Error>>, Error> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }
        let chosen = preferred
            .filter(|id| *id < self.endpoints.len())
            .unwrap_or(if self.endpoints.len() > SECONDARY {
                SECONDARY
            } else {
                PRIMARY
            });
        match self.send_batch(chosen, calls.clone()).await {
            Ok(results) => Ok(results),
            Err(err) => {
                tracing::warn!(
                    endpoint = %self.endpoints[chosen].name,
                    ?err,
                    "batch failed, retrying on primary"
                );
                self.metrics
                    .failovers
                    .with_label_values(&[&self.endpoints[chosen].name])
                    .inc();
                self.send_batch(PRIMARY, calls).await
            }
        }
    }

    async fn send_batch(
        &self,
        id: EndpointId,
        calls: Vec<Call>,
    ) -> Result<Vec<Result<Value, Error>>, Error> {
        let endpoint = &self.endpoints[id];
        let result = {
            let _timer = self.metrics.on_request_start(&endpoint.name, "batch");
            endpoint.transport.batch(calls).await
        };
        self.metrics.on_request_end(&endpoint.name, "batch", &result);
        result
    }
}

#[derive(prometheus_metric_storage::MetricStorage)]
#[metric(subsystem = "ethrpc")]
struct Metrics {
    /// Number of completed RPC requests by endpoint, method and result.
    #[metric(labels("endpoint", "method", "result"))]
    requests_complete: prometheus::IntCounterVec,

    /// Execution time for each RPC request (batches are counted as one
    /// request).
    #[metric(labels("endpoint", "method"))]
    requests_duration_seconds: prometheus::HistogramVec,

    /// Number of times a request moved on from an endpoint.
    #[metric(labels("endpoint"))]
    failovers: prometheus::IntCounterVec,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }

    #[must_use]
    fn on_request_start(&self, endpoint: &str, method: &str) -> impl Drop + use<> {
        let timer = self
            .requests_duration_seconds
            .with_label_values(&[endpoint, method])
            .start_timer();
        scopeguard::guard(timer, |timer| {
            timer.stop_and_record();
        })
    }

    fn on_request_end<T>(&self, endpoint: &str, method: &str, result: &Result<T, Error>) {
        let label = match result {
            Ok(_) => "success",
            Err(Error::Rpc(_)) => "rpc_error",
            Err(_) => "failure",
        };
        self.requests_complete
            .with_label_values(&[endpoint, method, label])
            .inc();
    }
}
