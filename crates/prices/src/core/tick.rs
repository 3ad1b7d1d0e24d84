//! Reading the current tick out of a raw `slot0()` response.
//!
//! `slot0()` returns `(uint160 sqrtPriceX96, int24 tick, ...)`. The tick is
//! the second ABI word and, being an `int24`, is fully determined by the last
//! six hex characters of that word.

/// Offset of the tick word in a `0x` prefixed hex response.
const TICK_WORD_START: usize = 2 + 64;
const TICK_WORD_END: usize = TICK_WORD_START + 64;
const INT24_HEX_LEN: usize = 6;
const INT24_MAX: i32 = 0x7f_ffff;
const INT24_MODULUS: i32 = 0x100_0000;

/// Decodes the tick of a hex encoded `slot0()` response.
///
/// Returns `None` for missing, empty or truncated responses as well as
/// responses with non-hex characters in the tick position.
pub fn decode_slot0_tick(raw: Option<&str>) -> Option<i32> {
    let word = raw?.get(TICK_WORD_START..TICK_WORD_END)?;
    let hex = word.get(word.len() - INT24_HEX_LEN..)?;
    if !hex.bytes().all(|byte| byte.is_ascii_hexdigit()) {
        return None;
    }
    let value = i32::from_str_radix(hex, 16).ok()?;
    Some(if value > INT24_MAX {
        value - INT24_MODULUS
    } else {
        value
    })
}

/// Price of token0 in token1 at `tick`, in raw token amounts.
pub fn tick_to_price(tick: i32) -> f64 {
    1.0001_f64.powi(tick)
}

/// Builds a `slot0()` response with the given tick and otherwise arbitrary
/// words.
#[cfg(test)]
pub fn encode_slot0(tick: i32) -> String {
    let sign = if tick < 0 { "f" } else { "0" };
    format!(
        "0x{sqrt_price:064x}{sign_extension}{tick:06x}{rest}",
        sqrt_price = 1_u128 << 96,
        sign_extension = sign.repeat(64 - INT24_HEX_LEN),
        tick = tick.rem_euclid(INT24_MODULUS),
        rest = "0".repeat(4 * 64),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_positive_and_negative_ticks() {
        for tick in [0, 1, -1, 887_272, -887_272, 200_000, -276_324] {
            assert_eq!(decode_slot0_tick(Some(&encode_slot0(tick))), Some(tick));
        }
    }

    #[test]
    fn decodes_every_int24_value() {
        // Every 24 bit pattern maps to itself below the sign bit and is
        // shifted down by 2^24 above it.
        for unsigned in (0..INT24_MODULUS).step_by(997).chain([INT24_MAX, INT24_MAX + 1]) {
            let raw = format!("0x{}{:064x}", "0".repeat(64), unsigned);
            let expected = if unsigned <= INT24_MAX {
                unsigned
            } else {
                unsigned - INT24_MODULUS
            };
            assert_eq!(decode_slot0_tick(Some(&raw)), Some(expected));
        }
    }

    #[test]
    fn round_trips_full_int24_range() {
        for tick in (-8_388_608..=8_388_607).step_by(4099).chain([-8_388_608, 8_388_607]) {
            assert_eq!(decode_slot0_tick(Some(&encode_slot0(tick))), Some(tick));
        }
    }

    #[test]
    fn only_last_six_characters_matter() {
        // Garbage in the upper part of the word is ignored.
        let raw = format!("0x{}{}{}", "0".repeat(64), "ab".repeat(29), "000064");
        assert_eq!(decode_slot0_tick(Some(&raw)), Some(100));
    }

    #[test]
    fn malformed_input_is_none() {
        assert_eq!(decode_slot0_tick(None), None);
        assert_eq!(decode_slot0_tick(Some("")), None);
        assert_eq!(decode_slot0_tick(Some("0x")), None);
        let truncated = encode_slot0(5);
        assert_eq!(decode_slot0_tick(Some(&truncated[..129])), None);
        let not_hex = format!("0x{}{}zz0001", "0".repeat(64), "0".repeat(58));
        assert_eq!(decode_slot0_tick(Some(&not_hex)), None);
        let multibyte = format!("0x{}{}ü0001", "0".repeat(64), "0".repeat(58));
        assert_eq!(decode_slot0_tick(Some(&multibyte)), None);
    }

    #[test]
    fn exactly_two_words_are_enough() {
        let raw = &encode_slot0(-42)[..130];
        assert_eq!(decode_slot0_tick(Some(raw)), Some(-42));
    }

    #[test]
    fn tick_zero_is_parity() {
        assert_eq!(tick_to_price(0), 1.0);
        assert!((tick_to_price(6_932) - 2.0).abs() < 1e-3);
    }
}
