//! JSON-RPC access to a set of Ethereum nodes with round-robin rotation and
//! ordered failover.

pub mod client;
pub mod error;
pub mod eth;
pub mod http;
pub mod transport;

pub use self::{
    client::{Endpoint, EndpointId, PRIMARY, RpcClient, SECONDARY},
    error::Error,
    eth::{CallRequest, EthCall},
};
use {
    self::http::HttpTransport,
    anyhow::{Context, Result},
    serde::Deserialize,
    std::{sync::Arc, time::Duration},
    url::Url,
};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Endpoints in order of preference. The first one is the primary.
    pub endpoints: Vec<EndpointConfig>,

    /// Timeout for a single HTTP request.
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct EndpointConfig {
    pub name: String,
    pub url: Url,
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Creates a client with one HTTP transport per configured endpoint.
pub fn client(config: &Config) -> Result<RpcClient> {
    let http = reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .context("failed to build http client")?;
    let endpoints = config
        .endpoints
        .iter()
        .map(|endpoint| Endpoint {
            name: endpoint.name.clone(),
            transport: Arc::new(HttpTransport::new(
                http.clone(),
                endpoint.url.clone(),
                endpoint.name.clone(),
            )),
        })
        .collect();
    RpcClient::new(endpoints).context("at least one rpc endpoint must be configured")
}
