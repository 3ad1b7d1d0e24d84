//! USD prices of the protocol token and the native asset derived from the
//! current ticks of two reference pools.

use {
    crate::core::{
        price::{Bounds, PoolReference},
        tick,
    },
    alloy::sol_types::SolCall,
    arc_swap::ArcSwap,
    chrono::{DateTime, Utc},
    contracts::ICLPool,
    ethrpc::{CallRequest, EthCall},
    price_estimation::{Fence, Ticket},
    serde::Deserialize,
    std::{sync::Arc, time::Duration},
    tokio::task::JoinHandle,
    tracing::Instrument,
};

pub const DEFAULT_PROTOCOL_TOKEN_BOUNDS: Bounds = Bounds::new(0., 1000.);
pub const DEFAULT_NATIVE_BOUNDS: Bounds = Bounds::new(0., 100.);

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    #[serde(with = "humantime_serde", default = "default_refresh_interval")]
    pub refresh_interval: Duration,

    /// Protocol token prices outside of this range are rejected.
    #[serde(default = "default_protocol_token_bounds")]
    pub protocol_token_bounds: Bounds,

    /// Native asset prices outside of this range are rejected.
    #[serde(default = "default_native_bounds")]
    pub native_bounds: Bounds,

    /// Price reported until the first accepted protocol token price.
    #[serde(default)]
    pub initial_protocol_token_price: f64,

    /// Price reported until the first accepted native asset price.
    #[serde(default)]
    pub initial_native_price: f64,

    /// Protocol token / stablecoin pool.
    pub protocol_token_pool: PoolReference,

    /// Stablecoin / wrapped native pool.
    pub native_pool: PoolReference,
}

fn default_refresh_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_protocol_token_bounds() -> Bounds {
    DEFAULT_PROTOCOL_TOKEN_BOUNDS
}

fn default_native_bounds() -> Bounds {
    DEFAULT_NATIVE_BOUNDS
}

/// A USD price together with its freshness.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedPrice {
    pub usd: f64,
    /// When the price was last read from chain. `None` while the price is
    /// still the configured initial value.
    pub updated_at: Option<DateTime<Utc>>,
    /// Whether the most recent refresh failed to produce an accepted price
    /// and `usd` is an older value.
    pub stale: bool,
}

impl ResolvedPrice {
    fn initial(usd: f64) -> Self {
        Self {
            usd,
            updated_at: None,
            stale: false,
        }
    }

    fn into_stale(self) -> Self {
        Self {
            stale: true,
            ..self
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Prices {
    pub protocol_token: ResolvedPrice,
    pub native: ResolvedPrice,
    /// Refresh that produced this snapshot, `None` for the initial one.
    pub ticket: Option<Ticket>,
}

pub struct PriceResolver {
    eth: Arc<dyn EthCall>,
    config: Config,
    fence: Fence,
    current: ArcSwap<Prices>,
    metrics: &'static Metrics,
}

impl PriceResolver {
    pub fn new(eth: Arc<dyn EthCall>, config: Config) -> Self {
        let initial = Prices {
            protocol_token: ResolvedPrice::initial(config.initial_protocol_token_price),
            native: ResolvedPrice::initial(config.initial_native_price),
            ticket: None,
        };
        Self {
            eth,
            config,
            fence: Fence::new(),
            current: ArcSwap::from_pointee(initial),
            metrics: Metrics::get(),
        }
    }

    /// The most recent prices. Never blocks on a refresh in progress.
    pub fn prices(&self) -> Arc<Prices> {
        self.current.load_full()
    }

    /// Reads both reference pools and updates the prices.
    ///
    /// Failures never surface: a price that could not be read or falls
    /// outside of its bounds keeps its previous value and is marked stale.
    /// The result of a refresh that was overtaken by a newer refresh is
    /// dropped.
    pub async fn refresh(&self) -> Arc<Prices> {
        let ticket = self.fence.issue();
        let [protocol_token_tick, native_tick] = self.fetch_ticks().await;
        if !self.fence.is_latest(ticket) {
            tracing::debug!(ticket = ticket.get(), "dropping superseded price refresh");
            return self.prices();
        }

        let now = Utc::now();
        let protocol_token = self.resolve(
            "protocol_token",
            protocol_token_tick,
            &self.config.protocol_token_pool,
            self.config.protocol_token_bounds,
        );
        let native = self.resolve(
            "native",
            native_tick,
            &self.config.native_pool,
            self.config.native_bounds,
        );
        self.current.rcu(|current| {
            if current.ticket.is_some_and(|applied| applied > ticket) {
                return Arc::clone(current);
            }
            let update = |previous: &ResolvedPrice, price: Option<f64>| match price {
                Some(usd) => ResolvedPrice {
                    usd,
                    updated_at: Some(now),
                    stale: false,
                },
                None => previous.clone().into_stale(),
            };
            Arc::new(Prices {
                protocol_token: update(&current.protocol_token, protocol_token),
                native: update(&current.native, native),
                ticket: Some(ticket),
            })
        });

        let prices = self.prices();
        self.metrics
            .price_usd
            .with_label_values(&["protocol_token"])
            .set(prices.protocol_token.usd);
        self.metrics
            .price_usd
            .with_label_values(&["native"])
            .set(prices.native.usd);
        prices
    }

    /// Ticks of the protocol token and the native pool, read with a single
    /// batch request.
    async fn fetch_ticks(&self) -> [Option<i32>; 2] {
        let calls = [&self.config.protocol_token_pool, &self.config.native_pool]
            .map(|pool| CallRequest::new(pool.address, ICLPool::slot0Call {}.abi_encode()));
        let results = match self.eth.eth_call_batch(calls.to_vec()).await {
            Ok(results) => results,
            Err(err) => {
                tracing::warn!(?err, "failed to read reference pools");
                return [None, None];
            }
        };
        std::array::from_fn(|i| match results.get(i) {
            Some(Ok(raw)) => tick::decode_slot0_tick(Some(raw)),
            Some(Err(err)) => {
                tracing::warn!(pool = %calls[i].to, ?err, "failed to read slot0");
                None
            }
            None => None,
        })
    }

    /// The accepted price for `tick`, if any.
    fn resolve(
        &self,
        token: &str,
        tick: Option<i32>,
        pool: &PoolReference,
        bounds: Bounds,
    ) -> Option<f64> {
        let result = match tick {
            None => {
                tracing::warn!(token, pool = %pool.address, "no tick, keeping previous price");
                None
            }
            Some(tick) => {
                let price = pool.price(tick);
                if bounds.contains(price) {
                    tracing::info!(token, tick, price, "updated price");
                    Some(price)
                } else {
                    tracing::warn!(
                        token,
                        tick,
                        price,
                        ?bounds,
                        "price out of bounds, keeping previous price"
                    );
                    None
                }
            }
        };
        self.metrics
            .refreshes
            .with_label_values(&[token, if result.is_some() { "accepted" } else { "stale" }])
            .inc();
        result
    }

    /// Refreshes the prices now and then every `interval` until the resolver
    /// is dropped.
    pub fn spawn_refresh_task(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let resolver = Arc::downgrade(self);
        let task = async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(resolver) = resolver.upgrade() else {
                    break;
                };
                resolver.refresh().await;
            }
            tracing::debug!("price resolver dropped, stopping refresh");
        };
        tokio::spawn(task.instrument(tracing::info_span!("price_refresh")))
    }
}

#[derive(prometheus_metric_storage::MetricStorage)]
#[metric(subsystem = "price_resolver")]
struct Metrics {
    /// Current USD price by token.
    #[metric(labels("token"))]
    price_usd: prometheus::GaugeVec,

    /// Price refreshes by token and outcome.
    #[metric(labels("token", "result"))]
    refreshes: prometheus::IntCounterVec,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::core::{price::PricedToken, tick::encode_slot0},
        alloy::primitives::Address,
        async_trait::async_trait,
        ethrpc::eth::MockEthCall,
        std::sync::atomic::{AtomicBool, AtomicUsize, Ordering},
        tokio::sync::Notify,
    };

    const PROTOCOL_TOKEN_POOL: Address = Address::repeat_byte(0x0a);
    const NATIVE_POOL: Address = Address::repeat_byte(0x0b);
    /// Protocol token at ~1 USD.
    const ONE_DOLLAR_TICK: i32 = -276_324;
    /// Protocol token at ~2 USD.
    const TWO_DOLLAR_TICK: i32 = -269_392;
    /// Native asset at ~50 USD.
    const FIFTY_DOLLAR_TICK: i32 = 237_202;

    fn config() -> Config {
        Config {
            refresh_interval: Duration::from_secs(60),
            protocol_token_bounds: DEFAULT_PROTOCOL_TOKEN_BOUNDS,
            native_bounds: DEFAULT_NATIVE_BOUNDS,
            initial_protocol_token_price: 0.5,
            initial_native_price: 20.,
            protocol_token_pool: PoolReference {
                address: PROTOCOL_TOKEN_POOL,
                token0: Address::repeat_byte(0x01),
                token1: Address::repeat_byte(0x02),
                decimals0: 18,
                decimals1: 6,
                priced: PricedToken::Token0,
            },
            native_pool: PoolReference {
                address: NATIVE_POOL,
                token0: Address::repeat_byte(0x02),
                token1: Address::repeat_byte(0x03),
                decimals0: 6,
                decimals1: 18,
                priced: PricedToken::Token1,
            },
        }
    }

    fn expect_ticks(eth: &mut MockEthCall, protocol_token: i32, native: i32) {
        eth.expect_eth_call_batch()
            .times(1)
            .withf(|calls| {
                calls.len() == 2
                    && calls[0].to == PROTOCOL_TOKEN_POOL
                    && calls[1].to == NATIVE_POOL
                    && calls
                        .iter()
                        .all(|call| call.data[..] == ICLPool::slot0Call::SELECTOR)
            })
            .returning(move |_| Ok(vec![Ok(encode_slot0(protocol_token)), Ok(encode_slot0(native))]));
    }

    #[test]
    fn starts_with_initial_prices() {
        let resolver = PriceResolver::new(Arc::new(MockEthCall::new()), config());
        let prices = resolver.prices();
        assert_eq!(prices.protocol_token, ResolvedPrice::initial(0.5));
        assert_eq!(prices.native, ResolvedPrice::initial(20.));
        assert_eq!(prices.ticket, None);
    }

    #[tokio::test]
    async fn accepts_prices_within_bounds() {
        let mut eth = MockEthCall::new();
        expect_ticks(&mut eth, ONE_DOLLAR_TICK, FIFTY_DOLLAR_TICK);
        let resolver = PriceResolver::new(Arc::new(eth), config());

        let prices = resolver.refresh().await;
        assert!((prices.protocol_token.usd - 1.).abs() < 1e-3);
        assert!((prices.native.usd - 50.).abs() < 0.1);
        assert!(!prices.protocol_token.stale);
        assert!(prices.protocol_token.updated_at.is_some());
        assert!(prices.native.updated_at.is_some());
        assert_eq!(resolver.prices(), prices);
    }

    #[tokio::test]
    async fn rejects_out_of_bounds_prices() {
        let mut eth = MockEthCall::new();
        // Tick 0 puts the protocol token at 1e12 USD and the native asset at
        // 1e12 USD.
        expect_ticks(&mut eth, 0, 0);
        let resolver = PriceResolver::new(Arc::new(eth), config());

        let prices = resolver.refresh().await;
        assert_eq!(prices.protocol_token.usd, 0.5);
        assert_eq!(prices.protocol_token.updated_at, None);
        assert!(prices.protocol_token.stale);
        assert_eq!(prices.native.usd, 20.);
        assert!(prices.native.stale);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_prices() {
        let mut eth = MockEthCall::new();
        let mut seq = mockall::Sequence::new();
        eth.expect_eth_call_batch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(vec![
                    Ok(encode_slot0(ONE_DOLLAR_TICK)),
                    Ok(encode_slot0(FIFTY_DOLLAR_TICK)),
                ])
            });
        eth.expect_eth_call_batch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ethrpc::Error::Http(503)));
        let resolver = PriceResolver::new(Arc::new(eth), config());

        let first = resolver.refresh().await;
        let second = resolver.refresh().await;
        assert_eq!(second.protocol_token.usd, first.protocol_token.usd);
        assert_eq!(second.protocol_token.updated_at, first.protocol_token.updated_at);
        assert!(second.protocol_token.stale);
        assert_eq!(second.native.usd, first.native.usd);
        assert!(second.native.stale);
    }

    #[tokio::test]
    async fn undecodable_pool_only_affects_its_price() {
        let mut eth = MockEthCall::new();
        eth.expect_eth_call_batch().times(1).returning(|_| {
            Ok(vec![
                Ok("0x".to_string()),
                Ok(encode_slot0(FIFTY_DOLLAR_TICK)),
            ])
        });
        let resolver = PriceResolver::new(Arc::new(eth), config());

        let prices = resolver.refresh().await;
        assert_eq!(prices.protocol_token.usd, 0.5);
        assert!(prices.protocol_token.stale);
        assert!((prices.native.usd - 50.).abs() < 0.1);
        assert!(!prices.native.stale);
    }

    /// Answers the first batch with `first` only once released, every later
    /// batch immediately with `later`.
    struct HeldFirstBatch {
        held: AtomicBool,
        release: Notify,
        first: i32,
        later: i32,
    }

    #[async_trait]
    impl EthCall for HeldFirstBatch {
        async fn eth_call(&self, _: CallRequest) -> Result<String, ethrpc::Error> {
            unreachable!()
        }

        async fn eth_call_batch(
            &self,
            _: Vec<CallRequest>,
        ) -> Result<Vec<Result<String, ethrpc::Error>>, ethrpc::Error> {
            let tick = if self.held.swap(false, Ordering::SeqCst) {
                self.release.notified().await;
                self.first
            } else {
                self.later
            };
            Ok(vec![
                Ok(encode_slot0(tick)),
                Ok(encode_slot0(FIFTY_DOLLAR_TICK)),
            ])
        }
    }

    #[tokio::test]
    async fn superseded_refresh_is_dropped() {
        let eth = Arc::new(HeldFirstBatch {
            held: AtomicBool::new(true),
            release: Notify::new(),
            first: TWO_DOLLAR_TICK,
            later: ONE_DOLLAR_TICK,
        });
        let resolver = PriceResolver::new(eth.clone(), config());

        let (older, newer) = tokio::join!(resolver.refresh(), async {
            let prices = resolver.refresh().await;
            eth.release.notify_one();
            prices
        });

        assert!((newer.protocol_token.usd - 1.).abs() < 1e-3);
        assert_eq!(older, newer);
        assert_eq!(*resolver.prices(), *newer);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_task_runs_until_resolver_is_dropped() {
        let refreshes = Arc::new(AtomicUsize::new(0));
        let mut eth = MockEthCall::new();
        let counter = refreshes.clone();
        eth.expect_eth_call_batch().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                Ok(encode_slot0(ONE_DOLLAR_TICK)),
                Ok(encode_slot0(FIFTY_DOLLAR_TICK)),
            ])
        });
        let resolver = Arc::new(PriceResolver::new(Arc::new(eth), config()));
        let interval = Duration::from_secs(60);

        let task = resolver.spawn_refresh_task(interval);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
        assert!(resolver.prices().protocol_token.updated_at.is_some());

        tokio::time::sleep(interval * 2).await;
        assert_eq!(refreshes.load(Ordering::SeqCst), 3);

        drop(resolver);
        tokio::time::timeout(interval * 2, task)
            .await
            .expect("refresh task did not stop")
            .unwrap();
        assert_eq!(refreshes.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn parses_config_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [protocol-token-pool]
            address = "0x0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a"
            token0 = "0x0101010101010101010101010101010101010101"
            token1 = "0x0202020202020202020202020202020202020202"
            decimals0 = 18
            decimals1 = 6
            priced = "token0"

            [native-pool]
            address = "0x0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b"
            token0 = "0x0202020202020202020202020202020202020202"
            token1 = "0x0303030303030303030303030303030303030303"
            decimals0 = 6
            decimals1 = 18
            priced = "token1"
            "#,
        )
        .unwrap();
        assert_eq!(config.refresh_interval, Duration::from_secs(60));
        assert_eq!(config.protocol_token_bounds, DEFAULT_PROTOCOL_TOKEN_BOUNDS);
        assert_eq!(config.native_bounds, DEFAULT_NATIVE_BOUNDS);
        assert_eq!(config.initial_protocol_token_price, 0.);
        assert_eq!(config.native_pool.priced, PricedToken::Token1);
    }
}
