use {
    crate::{Error, client::RpcClient},
    alloy::primitives::{Address, Bytes},
    async_trait::async_trait,
    serde_json::{Value, json},
};

/// Read-only contract call executed against the latest block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRequest {
    pub to: Address,
    pub data: Bytes,
}

impl CallRequest {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            data: data.into(),
        }
    }

    fn params(&self) -> Vec<Value> {
        vec![
            json!({
                "to": self.to.to_string(),
                "data": const_hex::encode_prefixed(&self.data),
            }),
            json!("latest"),
        ]
    }
}

/// `eth_call` access to the chain. Return values are the raw hex strings the
/// node answered with; decoding is left to the caller.
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
#[async_trait]
pub trait EthCall: Send + Sync + 'static {
    async fn eth_call(&self, call: CallRequest) -> Result<String, Error>;

    /// Executes all calls in a single batch. Inner results are in the order
    /// of `calls`.
    async fn eth_call_batch(
        &self,
        calls: Vec<CallRequest>,
    ) -> Result<Vec<Result<String, Error>>, Error>;
}

fn into_hex(value: Value) -> Result<String, Error> {
    match value {
        Value::String(hex) => Ok(hex),
        other => Err(Error::InvalidResponse(format!(
            "expected hex string from eth_call, got {other}"
        ))),
    }
}

#[async_trait]
impl EthCall for RpcClient {
    async fn eth_call(&self, call: CallRequest) -> Result<String, Error> {
        into_hex(self.call("eth_call", call.params(), None).await?)
    }

    async fn eth_call_batch(
        &self,
        calls: Vec<CallRequest>,
    ) -> Result<Vec<Result<String, Error>>, Error> {
        let calls = calls
            .iter()
            .map(|call| ("eth_call".to_string(), call.params()))
            .collect();
        Ok(self
            .batch_call(calls, None)
            .await?
            .into_iter()
            .map(|result| result.and_then(into_hex))
            .collect())
    }
}
