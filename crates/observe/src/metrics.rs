use {
    prometheus::Encoder,
    std::{collections::HashMap, net::SocketAddr, sync::OnceLock},
    tokio::task::{self, JoinHandle},
};

/// Registry shared by the RPC client, the quote router and the price
/// resolver.
static REGISTRY: OnceLock<prometheus_metric_storage::StorageRegistry> = OnceLock::new();

/// Installs the registry with a metric name `prefix` and constant `labels`.
///
/// Must run before the first metric is created, i.e. before any RPC client
/// or resolver is built.
///
/// # Panics
///
/// If the registry was already installed (explicitly or by a call to
/// [`get_storage_registry`]) or the prefix or labels are invalid.
pub fn setup_registry(prefix: Option<String>, labels: Option<HashMap<String, String>>) {
    let registry = prometheus::Registry::new_custom(prefix, labels).unwrap();
    REGISTRY
        .set(prometheus_metric_storage::StorageRegistry::new(registry))
        .unwrap();
}

/// [`setup_registry`] for tests, where several tests may race to install
/// the registry. Only the first call has an effect.
pub fn setup_registry_reentrant(prefix: Option<String>, labels: Option<HashMap<String, String>>) {
    let registry = prometheus::Registry::new_custom(prefix, labels).unwrap();
    REGISTRY
        .set(prometheus_metric_storage::StorageRegistry::new(registry))
        .ok();
}

/// The underlying prometheus registry.
pub fn get_registry() -> &'static prometheus::Registry {
    get_storage_registry().registry()
}

/// The metric storage registry. Falls back to an unprefixed registry when
/// [`setup_registry`] was never called, which is the case in unit tests.
pub fn get_storage_registry() -> &'static prometheus_metric_storage::StorageRegistry {
    REGISTRY.get_or_init(prometheus_metric_storage::StorageRegistry::default)
}

/// Encodes all metrics of the registry in the prometheus text format.
pub fn encode(registry: &prometheus::Registry) -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&registry.gather(), &mut buffer) {
        tracing::error!(?err, "failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// `/metrics` route exposing encoded prometheus data to the monitoring system.
pub fn handle_metrics() -> axum::Router {
    async fn metrics_handler() -> String {
        encode(get_registry())
    }

    axum::Router::new().route("/metrics", axum::routing::get(metrics_handler))
}

/// Serves the `/metrics` route on `address` in a background task.
pub fn serve_metrics(address: SocketAddr) -> JoinHandle<()> {
    task::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(address).await {
            Ok(listener) => listener,
            Err(err) => {
                tracing::error!(?err, %address, "failed to bind metrics listener");
                return;
            }
        };
        tracing::info!(%address, "serving metrics");
        if let Err(err) = axum::serve(listener, handle_metrics()).await {
            tracing::error!(?err, "metrics server exited");
        }
    })
}
