use {
    crate::{
        Error,
        transport::{Call, Transport},
    },
    async_trait::async_trait,
    jsonrpc_core::types::{
        Call as RpcCall,
        Id,
        MethodCall,
        Output,
        Params,
        Request,
        Value,
        Version,
    },
    reqwest::{Client, Url, header},
    serde::{Deserialize, Serialize, de::DeserializeOwned},
    std::{
        collections::HashMap,
        fmt::{Debug, Formatter},
        sync::{
            Arc,
            atomic::{AtomicU64, Ordering},
        },
    },
};

/// JSON-RPC over HTTP to a single node.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    inner: Arc<Inner>,
}

struct Inner {
    url: Url,
    id: AtomicU64,
    /// Name of the transport used in logs to distinguish different transports.
    name: String,
}

impl HttpTransport {
    pub fn new(client: Client, url: Url, name: String) -> Self {
        Self {
            client,
            inner: Arc::new(Inner {
                url,
                id: AtomicU64::new(0),
                name,
            }),
        }
    }

    fn next_id(&self) -> u64 {
        self.inner.id.fetch_add(1, Ordering::SeqCst)
    }

    fn method_call(&self, method: String, params: Vec<Value>) -> (u64, RpcCall) {
        let id = self.next_id();
        let call = RpcCall::MethodCall(MethodCall {
            jsonrpc: Some(Version::V2),
            method,
            params: Params::Array(params),
            id: Id::Num(id),
        });
        (id, call)
    }
}

impl Debug for HttpTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("name", &self.inner.name)
            .field("url", &self.inner.url)
            .finish()
    }
}

// Id is only used for logging.
async fn execute_rpc<T: DeserializeOwned>(
    client: &Client,
    inner: &Inner,
    id: u64,
    request: &Request,
) -> Result<T, Error> {
    let body = serde_json::to_string(request)
        .map_err(|err| Error::Transport(format!("failed to serialize request: {err}")))?;
    tracing::trace!(name = %inner.name, %id, %body, "executing request");
    let mut request_builder = client
        .post(inner.url.clone())
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-RPC-REQUEST-ID", id.to_string())
        .body(body);
    match request {
        Request::Single(RpcCall::MethodCall(method)) => {
            request_builder = request_builder.header("X-RPC-METHOD", method.method.clone());
        }
        Request::Batch(calls) => {
            let methods = calls
                .iter()
                .filter_map(|call| match call {
                    RpcCall::MethodCall(method) => Some(method.method.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(",");
            request_builder = request_builder.header("X-RPC-METHOD", methods);
        }
        _ => {}
    }

    let response = request_builder
        .send()
        .await
        .map_err(|err: reqwest::Error| {
            tracing::warn!(name = %inner.name, %id, %err, "failed to send request");
            Error::Transport(err.to_string())
        })?;
    let status = response.status();
    let text = response.text().await.map_err(|err: reqwest::Error| {
        tracing::warn!(name = %inner.name, %id, %err, "failed to get response body");
        Error::Transport(err.to_string())
    })?;
    // Log the raw text before decoding to get more information on responses that
    // aren't valid json.
    tracing::trace!(name = %inner.name, %id, body = %text.trim(), "received response");
    if !status.is_success() {
        return Err(Error::Http(status.as_u16()));
    }

    jsonrpc_core::serde_from_str(&text).map_err(|err| {
        Error::InvalidResponse(format!(
            "{err:?}, raw response: {}, {}, {}",
            inner.name,
            id,
            text.trim()
        ))
    })
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, method: String, params: Vec<Value>) -> Result<Value, Error> {
        let (id, call) = self.method_call(method, params);
        let output: Output =
            execute_rpc(&self.client, &self.inner, id, &Request::Single(call)).await?;
        into_result(output)
    }

    async fn batch(&self, calls: Vec<Call>) -> Result<Vec<Result<Value, Error>>, Error> {
        let (ids, calls): (Vec<_>, Vec<_>) = calls
            .into_iter()
            .map(|(method, params)| self.method_call(method, params))
            .unzip();
        // Batch calls don't need an id but it helps associate the response log to the
        // request log.
        let id = self.next_id();
        let outputs = execute_rpc(&self.client, &self.inner, id, &Request::Batch(calls)).await?;
        handle_batch_response(&ids, outputs)
    }
}

fn into_result(output: Output) -> Result<Value, Error> {
    match output {
        Output::Success(success) => Ok(success.result),
        Output::Failure(failure) => Err(Error::Rpc(failure.error)),
    }
}

/// Workaround for Erigon nodes, which encode each element of the Batch Response
/// as a String rather than a deserializable JSON object
#[derive(Debug, PartialEq, Clone, Deserialize, Serialize)]
#[serde(untagged)]
enum OutputOrString {
    String(String),
    Output(Output),
}

impl OutputOrString {
    fn try_into_output(self) -> Result<Output, Error> {
        Ok(match self {
            OutputOrString::String(string) => jsonrpc_core::serde_from_str(&string)
                .map_err(|err| Error::InvalidResponse(format!("{err}: {string}")))?,
            OutputOrString::Output(output) => output,
        })
    }
}

/// Matches the batch outputs to the request ids so results are returned in
/// request order, independent of the order the node answered in.
fn handle_batch_response(
    ids: &[u64],
    outputs: Vec<OutputOrString>,
) -> Result<Vec<Result<Value, Error>>, Error> {
    if ids.len() != outputs.len() {
        return Err(Error::InvalidResponse(
            "unexpected number of responses".to_string(),
        ));
    }
    let mut outputs = outputs
        .into_iter()
        .map(|output_or_string| {
            let output = output_or_string.try_into_output()?;
            Ok((id_of_output(&output)?, into_result(output)))
        })
        .collect::<Result<HashMap<_, _>, Error>>()?;
    ids.iter()
        .map(|id| {
            outputs.remove(id).ok_or_else(|| {
                Error::InvalidResponse(format!("batch response is missing id {id}"))
            })
        })
        .collect()
}

fn id_of_output(output: &Output) -> Result<u64, Error> {
    let id = match output {
        Output::Success(success) => &success.id,
        Output::Failure(failure) => &failure.id,
    };
    match id {
        Id::Num(num) => Ok(*num),
        _ => Err(Error::InvalidResponse(
            "response id is not u64".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use {super::*, jsonrpc_core::types::Success};

    #[test]
    fn handles_batch_response_being_in_different_order_than_input() {
        let ids = vec![0, 1, 2];
        // This order is different from the ids.
        let outputs = [1u64, 0, 2]
            .iter()
            .map(|&id| {
                OutputOrString::Output(Output::Success(Success {
                    jsonrpc: None,
                    result: id.into(),
                    id: Id::Num(id),
                }))
            })
            .collect();
        let results = handle_batch_response(&ids, outputs)
            .unwrap()
            .into_iter()
            .map(|result| result.unwrap().as_u64().unwrap())
            .collect::<Vec<_>>();
        // The order of the ids should have been restored.
        assert_eq!(ids, results);
    }

    #[test]
    fn handles_batch_items_that_are_strings() {
        let result = handle_batch_response(
            &[1],
            vec![OutputOrString::String(
                "{\"jsonrpc\": \"2.0\", \"result\": 1, \"id\": 1}".into(),
            )],
        )
        .unwrap()
        .into_iter()
        .map(|result| result.unwrap().as_u64().unwrap())
        .collect::<Vec<_>>();
        assert_eq!(vec![1], result);
    }

    #[test]
    fn errors_on_invalid_string_batch_responses() {
        assert!(
            handle_batch_response(
                &[1],
                vec![OutputOrString::String("there is no spoon".into())],
            )
            .is_err()
        );
    }

    #[test]
    fn keeps_per_call_errors_inside_batch() {
        let outputs: Vec<OutputOrString> = serde_json::from_str(
            r#"[
                {"jsonrpc": "2.0", "error": {"code": -32000, "message": "execution reverted"}, "id": 7},
                {"jsonrpc": "2.0", "result": "0x01", "id": 6}
            ]"#,
        )
        .unwrap();
        let results = handle_batch_response(&[6, 7], outputs).unwrap();
        assert_eq!(results[0].as_ref().unwrap(), "0x01");
        assert!(matches!(&results[1], Err(Error::Rpc(err)) if err.message == "execution reverted"));
    }

    #[test]
    fn rejects_batch_with_missing_ids() {
        let outputs = vec![OutputOrString::Output(Output::Success(Success {
            jsonrpc: None,
            result: Value::Null,
            id: Id::Num(3),
        }))];
        assert!(matches!(
            handle_batch_response(&[4], outputs),
            Err(Error::InvalidResponse(_))
        ));
    }
}
