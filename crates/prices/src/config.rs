use {
    crate::{gauges::Gauge, resolver},
    alloy::primitives::Address,
    anyhow::{Context, Result, ensure},
    price_estimation::DEFAULT_TICK_SPACINGS,
    serde::Deserialize,
    std::{net::SocketAddr, path::Path},
    url::Url,
};

/// Loads the service configuration from a TOML file.
pub async fn load(path: &Path) -> Result<Config> {
    let file = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read configuration file {path:?}"))?;
    let config: Config =
        toml::from_str(&file).with_context(|| format!("invalid configuration file {path:?}"))?;
    config.validate()?;
    Ok(config)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Serve Prometheus metrics on this address.
    pub metrics_address: Option<SocketAddr>,
    pub rpc: ethrpc::Config,
    pub prices: resolver::Config,
    pub quoter: Quoter,
    pub subgraph: Option<Subgraph>,
    #[serde(default)]
    pub gauges: Vec<Gauge>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Quoter {
    /// Quoter contract used to simulate swaps.
    pub address: Address,
    /// Pool factory used to check which fee tiers have a pool.
    pub factory: Address,
    #[serde(default = "default_tick_spacings")]
    pub tick_spacings: Vec<i32>,
}

fn default_tick_spacings() -> Vec<i32> {
    DEFAULT_TICK_SPACINGS.to_vec()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Subgraph {
    pub url: Url,
}

impl Config {
    fn validate(&self) -> Result<()> {
        ensure!(
            !self.rpc.endpoints.is_empty(),
            "at least one rpc endpoint must be configured"
        );
        ensure!(
            !self.prices.refresh_interval.is_zero(),
            "refresh-interval must be positive"
        );
        ensure!(
            !self.quoter.tick_spacings.is_empty(),
            "at least one tick spacing must be configured"
        );
        ensure!(
            self.quoter.tick_spacings.iter().all(|spacing| *spacing > 0),
            "tick spacings must be positive"
        );
        Ok(())
    }
}
