//! Swap quotes across the fixed set of concentrated liquidity fee tiers.
//!
//! Every tier is identified by its tick spacing. Quotes are simulated through
//! the quoter contract with `eth_call`; a tier without a pool simply reverts
//! or returns garbage, which is treated the same as "no quote".

use {
    alloy::{
        primitives::{Address, U160, U256, aliases::I24},
        sol_types::SolCall,
    },
    contracts::{ICLFactory, IQuoter},
    ethrpc::{CallRequest, EthCall},
    futures::future,
    itertools::Itertools,
    std::sync::Arc,
};

/// Tick spacings of the fee tiers supported by the exchange.
pub const DEFAULT_TICK_SPACINGS: [i32; 5] = [1, 50, 100, 200, 2000];

/// Hex encoded responses shorter than `0x` followed by one ABI word cannot
/// contain a quote.
const MIN_RESPONSE_LEN: usize = 2 + 64;

/// Simulated single-pool swap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Quote {
    pub amount_out: U256,
    pub sqrt_price_x96_after: U160,
    pub initialized_ticks_crossed: u32,
    pub gas_estimate: U256,
    pub tick_spacing: i32,
    pub pool_exists: bool,
}

/// Simulated swap through an intermediate token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiHopQuote {
    pub amount_out: U256,
    pub gas_estimate: U256,
    /// Tick spacing used for the first and the second leg.
    pub tick_spacings: [i32; 2],
    pub sqrt_prices_x96_after: Vec<U160>,
}

#[derive(Debug, thiserror::Error)]
pub enum QuoteError {
    #[error("no multi-hop route available")]
    NoMultiHopRoute,
    #[error("invalid quoter response")]
    InvalidResponse,
    #[error(transparent)]
    Rpc(#[from] ethrpc::Error),
}

pub struct QuoteRouter {
    eth: Arc<dyn EthCall>,
    quoter: Address,
    factory: Address,
    tick_spacings: Vec<i32>,
    metrics: &'static Metrics,
}

impl QuoteRouter {
    pub fn new(
        eth: Arc<dyn EthCall>,
        quoter: Address,
        factory: Address,
        tick_spacings: Vec<i32>,
    ) -> Self {
        Self {
            eth,
            quoter,
            factory,
            tick_spacings,
            metrics: Metrics::get(),
        }
    }

    /// Returns the quote with the highest output amount.
    ///
    /// With an explicit `tick_spacing` only that tier is quoted, otherwise
    /// all supported tiers are quoted concurrently. `None` means that no tier
    /// produced a usable quote.
    pub async fn best_quote(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        tick_spacing: Option<i32>,
    ) -> Option<Quote> {
        let tiers = match tick_spacing {
            Some(tick_spacing) => vec![tick_spacing],
            None => self.tick_spacings.clone(),
        };
        let quotes = future::join_all(
            tiers
                .iter()
                .map(|tick_spacing| self.quote_tier(token_in, token_out, amount_in, *tick_spacing)),
        )
        .await;

        let best = quotes.into_iter().flatten().reduce(|best, quote| {
            if quote.amount_out > best.amount_out {
                quote
            } else {
                best
            }
        });
        tracing::debug!(%token_in, %token_out, %amount_in, ?tiers, ?best, "best quote");
        best
    }

    async fn quote_tier(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        tick_spacing: i32,
    ) -> Option<Quote> {
        let result = self
            .try_quote_tier(token_in, token_out, amount_in, tick_spacing)
            .await;
        let label = match &result {
            Ok(_) => "success",
            Err(reason) => *reason,
        };
        self.metrics
            .tier_quotes
            .with_label_values(&[&tick_spacing.to_string(), label])
            .inc();
        match result {
            Ok(quote) => Some(quote),
            Err(reason) => {
                tracing::debug!(tick_spacing, reason, "discarding tier");
                None
            }
        }
    }

    async fn try_quote_tier(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        tick_spacing: i32,
    ) -> Result<Quote, &'static str> {
        let spacing = I24::try_from(tick_spacing).map_err(|_| "invalid_tick_spacing")?;
        let call = IQuoter::quoteExactInputSingleCall {
            params: IQuoter::QuoteExactInputSingleParams {
                tokenIn: token_in,
                tokenOut: token_out,
                amountIn: amount_in,
                tickSpacing: spacing,
                sqrtPriceLimitX96: U160::ZERO,
            },
        };
        let raw = self
            .eth
            .eth_call(CallRequest::new(self.quoter, call.abi_encode()))
            .await
            .map_err(|err| {
                tracing::trace!(tick_spacing, ?err, "quote call failed");
                "rpc_error"
            })?;
        let bytes = response_bytes(&raw).ok_or("empty")?;
        let returns = IQuoter::quoteExactInputSingleCall::abi_decode_returns(&bytes)
            .map_err(|_| "undecodable")?;
        if returns.amountOut.is_zero() {
            return Err("zero_output");
        }
        Ok(Quote {
            amount_out: returns.amountOut,
            sqrt_price_x96_after: returns.sqrtPriceX96After,
            initialized_ticks_crossed: returns.initializedTicksCrossed,
            gas_estimate: returns.gasEstimate,
            tick_spacing,
            pool_exists: true,
        })
    }

    /// Quotes `token_in -> intermediate -> token_out`, using for each leg the
    /// smallest tick spacing that has a pool.
    pub async fn multi_hop_quote(
        &self,
        token_in: Address,
        intermediate: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<MultiHopQuote, QuoteError> {
        let (first, second) = future::join(
            self.find_pool_tier(token_in, intermediate),
            self.find_pool_tier(intermediate, token_out),
        )
        .await;
        let (Some(first), Some(second)) = (first, second) else {
            return Err(QuoteError::NoMultiHopRoute);
        };

        let path = contracts::path::encode(token_in, &[(first, intermediate), (second, token_out)]);
        let call = IQuoter::quoteExactInputCall {
            path,
            amountIn: amount_in,
        };
        let raw = self
            .eth
            .eth_call(CallRequest::new(self.quoter, call.abi_encode()))
            .await?;
        let bytes = response_bytes(&raw).ok_or(QuoteError::InvalidResponse)?;
        let returns = IQuoter::quoteExactInputCall::abi_decode_returns(&bytes)
            .map_err(|_| QuoteError::InvalidResponse)?;
        if returns.amountOut.is_zero() {
            return Err(QuoteError::NoMultiHopRoute);
        }
        Ok(MultiHopQuote {
            amount_out: returns.amountOut,
            gas_estimate: returns.gasEstimate,
            tick_spacings: [first, second],
            sqrt_prices_x96_after: returns.sqrtPriceX96AfterList,
        })
    }

    /// First tick spacing in ascending order for which the factory knows a
    /// pool of the pair.
    async fn find_pool_tier(&self, token_a: Address, token_b: Address) -> Option<i32> {
        for tick_spacing in self.tick_spacings.iter().copied().sorted() {
            let Ok(spacing) = I24::try_from(tick_spacing) else {
                continue;
            };
            let call = ICLFactory::getPoolCall {
                tokenA: token_a,
                tokenB: token_b,
                tickSpacing: spacing,
            };
            let pool = match self
                .eth
                .eth_call(CallRequest::new(self.factory, call.abi_encode()))
                .await
            {
                Ok(raw) => response_bytes(&raw)
                    .and_then(|bytes| ICLFactory::getPoolCall::abi_decode_returns(&bytes).ok()),
                Err(err) => {
                    tracing::debug!(%token_a, %token_b, tick_spacing, ?err, "pool lookup failed");
                    None
                }
            };
            if pool.is_some_and(|pool| !pool.is_zero()) {
                return Some(tick_spacing);
            }
        }
        None
    }
}

fn response_bytes(raw: &str) -> Option<Vec<u8>> {
    if raw.len() < MIN_RESPONSE_LEN {
        return None;
    }
    const_hex::decode(raw).ok()
}

#[derive(prometheus_metric_storage::MetricStorage)]
#[metric(subsystem = "quote_router")]
struct Metrics {
    /// Per tier quote attempts by outcome.
    #[metric(labels("tick_spacing", "result"))]
    tier_quotes: prometheus::IntCounterVec,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}
