use {
    alloy::primitives::U256,
    bigdecimal::{
        BigDecimal,
        num_bigint::{BigInt, BigUint, Sign},
    },
    num::ToPrimitive,
};

pub fn u256_to_big_uint(input: &U256) -> BigUint {
    BigUint::from_bytes_be(&input.to_be_bytes::<32>())
}

pub fn u256_to_big_int(input: &U256) -> BigInt {
    BigInt::from_biguint(Sign::Plus, u256_to_big_uint(input))
}

pub fn u256_to_big_decimal(input: &U256) -> BigDecimal {
    BigDecimal::from(u256_to_big_int(input))
}

/// Converts an integer token amount into whole token units, e.g. `1e18` wei
/// of an 18 decimal token into `1`.
pub fn u256_to_units(amount: &U256, decimals: u8) -> BigDecimal {
    BigDecimal::new(u256_to_big_int(amount), i64::from(decimals))
}

/// Like [`u256_to_units`] but returns the (lossy) floating point value.
pub fn u256_to_f64_units(amount: &U256, decimals: u8) -> Option<f64> {
    u256_to_units(amount, decimals)
        .to_f64()
        .filter(|value| value.is_finite())
}
