use {super::tick::tick_to_price, alloy::primitives::Address, serde::Deserialize};

/// Which token of a pool the pool is used to price.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PricedToken {
    /// token0 priced in token1, e.g. a protocol token / stablecoin pool.
    Token0,
    /// token1 priced in token0, e.g. a stablecoin / wrapped native pool.
    Token1,
}

/// A pool whose current tick determines the USD price of one of its tokens.
/// The other token is expected to be a USD stablecoin.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PoolReference {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    pub decimals0: u8,
    pub decimals1: u8,
    pub priced: PricedToken,
}

impl PoolReference {
    /// USD price of the priced token when the pool is at `tick`.
    pub fn price(&self, tick: i32) -> f64 {
        let decimals = i32::from(self.decimals0) - i32::from(self.decimals1);
        let adjusted = tick_to_price(tick) * 10_f64.powi(decimals);
        match self.priced {
            PricedToken::Token0 => adjusted,
            PricedToken::Token1 => adjusted.recip(),
        }
    }
}

/// Open interval of prices that are considered plausible.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(from = "[f64; 2]")]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    pub const fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, price: f64) -> bool {
        price > self.lower && price < self.upper
    }
}

impl From<[f64; 2]> for Bounds {
    fn from([lower, upper]: [f64; 2]) -> Self {
        Self { lower, upper }
    }
}
