//! Pool APRs from gauge reward emissions.

use {
    crate::core::apr,
    alloy::{
        primitives::{Address, U256},
        sol_types::SolCall,
    },
    anyhow::Result,
    async_trait::async_trait,
    contracts::ICLGauge,
    ethrpc::{CallRequest, EthCall},
    serde::Deserialize,
    std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    },
};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Gauge {
    pub name: String,
    /// Address of the gauge contract.
    pub address: Address,
    /// Pool the gauge rewards liquidity providers of.
    pub pool: Address,
    pub tick_spacing: Option<i32>,
    /// Fixed TVL in USD. Takes precedence over the TVL source.
    pub tvl_usd: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GaugeApr {
    pub name: String,
    pub pool: Address,
    pub reward_rate: U256,
    pub tvl_usd: f64,
    /// In percent.
    pub apr: f64,
}

/// Source of total value locked per pool.
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
#[async_trait]
pub trait TvlSource: Send + Sync + 'static {
    async fn pool_tvls(&self, pools: Vec<Address>) -> Result<HashMap<Address, f64>>;
}

pub struct GaugeAprReporter {
    eth: Arc<dyn EthCall>,
    gauges: Vec<Gauge>,
    tvls: Option<Arc<dyn TvlSource>>,
    /// Last successfully read reward rate per gauge.
    reward_rates: Mutex<HashMap<Address, U256>>,
}

impl GaugeAprReporter {
    pub fn new(
        eth: Arc<dyn EthCall>,
        gauges: Vec<Gauge>,
        tvls: Option<Arc<dyn TvlSource>>,
    ) -> Self {
        Self {
            eth,
            gauges,
            tvls,
            reward_rates: Default::default(),
        }
    }

    /// Computes the APR of every gauge for which both a reward rate and a
    /// TVL are known.
    pub async fn refresh(&self, reward_token_price_usd: f64) -> Vec<GaugeApr> {
        if self.gauges.is_empty() {
            return Vec::new();
        }
        let reward_rates = self.update_reward_rates().await;
        let tvls = self.fetch_tvls().await;

        self.gauges
            .iter()
            .filter_map(|gauge| {
                let Some(reward_rate) = reward_rates.get(&gauge.address).copied() else {
                    tracing::debug!(gauge = %gauge.name, "no reward rate yet");
                    return None;
                };
                let Some(tvl_usd) = gauge.tvl_usd.or_else(|| tvls.get(&gauge.pool).copied())
                else {
                    tracing::debug!(gauge = %gauge.name, pool = %gauge.pool, "no TVL");
                    return None;
                };
                Some(GaugeApr {
                    name: gauge.name.clone(),
                    pool: gauge.pool,
                    reward_rate,
                    tvl_usd,
                    apr: apr::pool_apr(
                        reward_rate,
                        reward_token_price_usd,
                        tvl_usd,
                        gauge.tick_spacing,
                    ),
                })
            })
            .collect()
    }

    /// Reads all reward rates in one batch and merges them into the last
    /// known ones.
    async fn update_reward_rates(&self) -> HashMap<Address, U256> {
        let calls = self
            .gauges
            .iter()
            .map(|gauge| CallRequest::new(gauge.address, ICLGauge::rewardRateCall {}.abi_encode()))
            .collect();
        let results = self.eth.eth_call_batch(calls).await.unwrap_or_else(|err| {
            tracing::warn!(?err, "failed to read gauge reward rates");
            Vec::new()
        });

        let mut reward_rates = self.reward_rates.lock().unwrap();
        for (i, gauge) in self.gauges.iter().enumerate() {
            let rate = match results.get(i) {
                Some(Ok(raw)) => decode_reward_rate(raw),
                Some(Err(err)) => {
                    tracing::debug!(gauge = %gauge.name, ?err, "reward rate call failed");
                    None
                }
                None => None,
            };
            match rate {
                Some(rate) => {
                    reward_rates.insert(gauge.address, rate);
                }
                None => tracing::debug!(gauge = %gauge.name, "keeping last reward rate"),
            }
        }
        reward_rates.clone()
    }

    async fn fetch_tvls(&self) -> HashMap<Address, f64> {
        let Some(source) = &self.tvls else {
            return HashMap::new();
        };
        let pools = self
            .gauges
            .iter()
            .filter(|gauge| gauge.tvl_usd.is_none())
            .map(|gauge| gauge.pool)
            .collect::<Vec<_>>();
        if pools.is_empty() {
            return HashMap::new();
        }
        source.pool_tvls(pools).await.unwrap_or_else(|err| {
            tracing::warn!(?err, "failed to fetch pool TVLs");
            HashMap::new()
        })
    }
}

fn decode_reward_rate(raw: &str) -> Option<U256> {
    let bytes = const_hex::decode(raw).ok()?;
    ICLGauge::rewardRateCall::abi_decode_returns(&bytes).ok()
}
