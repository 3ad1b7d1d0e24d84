//! Annualized returns of liquidity providers from gauge reward emissions.
//!
//! All functions are total: degenerate inputs produce `0` or `None`, never a
//! panic.

use {alloy::primitives::U256, number::conversions::u256_to_f64_units};

pub const SECONDS_PER_YEAR: f64 = 31_536_000.;

/// Width of the full tick range, `887272 - (-887272)`.
pub const FULL_RANGE_TICKS: f64 = 1_774_544.;

const REWARD_TOKEN_DECIMALS: u8 = 18;
const MAX_POOL_MULTIPLIER: f64 = 500.;
const MAX_POSITION_MULTIPLIER: f64 = 1000.;

/// Fraction of the concentration multiplier credited to positions whose
/// range does not contain the current tick. This is a heuristic: out of range
/// liquidity does not earn swap fees but keeps accruing gauge rewards.
pub const OUT_OF_RANGE_FACTOR: f64 = 0.5;

fn non_positive(value: f64) -> bool {
    value.is_nan() || value <= 0.
}

/// APR in percent (`100.0` is 100%) of full range liquidity.
///
/// `reward_rate` is in wei of an 18 decimal reward token per second.
pub fn base_apr(reward_rate: U256, token_price_usd: f64, tvl_usd: f64) -> f64 {
    if non_positive(tvl_usd) || non_positive(token_price_usd) {
        return 0.;
    }
    let tokens_per_second =
        u256_to_f64_units(&reward_rate, REWARD_TOKEN_DECIMALS).unwrap_or_default();
    let annual_rewards_usd = tokens_per_second * SECONDS_PER_YEAR * token_price_usd;
    annual_rewards_usd / tvl_usd * 100.
}

/// How much more concentrated the liquidity of a pool with the given tick
/// spacing is compared to full range liquidity.
pub fn concentration_multiplier(tick_spacing: Option<i32>) -> f64 {
    match tick_spacing {
        Some(tick_spacing) if tick_spacing > 0 => (FULL_RANGE_TICKS / f64::from(tick_spacing))
            .sqrt()
            .clamp(1., MAX_POOL_MULTIPLIER),
        _ => 1.,
    }
}

/// [`base_apr`] adjusted for the concentration of the pool.
pub fn pool_apr(
    reward_rate: U256,
    token_price_usd: f64,
    tvl_usd: f64,
    tick_spacing: Option<i32>,
) -> f64 {
    base_apr(reward_rate, token_price_usd, tvl_usd) * concentration_multiplier(tick_spacing)
}

/// APR of a position in `[tick_lower, tick_upper)` given the pool's base APR.
///
/// `None` for a non-positive base APR or an empty range.
pub fn range_adjusted_apr(
    base_apr: f64,
    tick_lower: i32,
    tick_upper: i32,
    current_tick: i32,
) -> Option<f64> {
    if non_positive(base_apr) || tick_lower >= tick_upper {
        return None;
    }
    let width = f64::from(tick_upper) - f64::from(tick_lower);
    let multiplier = (FULL_RANGE_TICKS / width)
        .sqrt()
        .clamp(1., MAX_POSITION_MULTIPLIER);
    let multiplier = if (tick_lower..tick_upper).contains(&current_tick) {
        multiplier
    } else {
        multiplier * OUT_OF_RANGE_FACTOR
    };
    Some(base_apr * multiplier)
}
