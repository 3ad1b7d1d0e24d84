//! Encoding of multi-hop swap paths for `IQuoter::quoteExactInput`.
//!
//! A path is the packed concatenation `token | spacing | token | ... | token`
//! where every token is a 20 byte address and every spacing a 3 byte big
//! endian two's complement `int24`.

use alloy::primitives::{Address, Bytes};

const ADDRESS_LEN: usize = 20;
const TICK_SPACING_LEN: usize = 3;

/// Encodes a path starting at `token_in` and following each `(tick_spacing,
/// token)` hop in order.
pub fn encode(token_in: Address, hops: &[(i32, Address)]) -> Bytes {
    let mut path =
        Vec::with_capacity(ADDRESS_LEN + hops.len() * (TICK_SPACING_LEN + ADDRESS_LEN));
    path.extend_from_slice(token_in.as_slice());
    for (tick_spacing, token) in hops {
        path.extend_from_slice(&tick_spacing.to_be_bytes()[1..]);
        path.extend_from_slice(token.as_slice());
    }
    path.into()
}
