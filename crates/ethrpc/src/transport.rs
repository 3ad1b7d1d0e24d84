use {crate::Error, async_trait::async_trait, serde_json::Value};

/// A single JSON-RPC call as `(method, params)`.
pub type Call = (String, Vec<Value>);

/// Connection to one JSON-RPC endpoint.
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends a single call and returns its `result`. JSON-RPC error envelopes
    /// are returned as [`Error::Rpc`].
    async fn call(&self, method: String, params: Vec<Value>) -> Result<Value, Error>;

    /// Sends all calls in one JSON-RPC batch.
    ///
    /// The outer result fails if the batch as a whole failed. Otherwise there
    /// is one inner result per call, in the order of `calls`.
    async fn batch(&self, calls: Vec<Call>) -> Result<Vec<Result<Value, Error>>, Error>;
}
