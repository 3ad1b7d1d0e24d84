//! Numeric helpers for moving between on-chain integer amounts and the
//! floating point values used for USD prices and APRs.
pub mod conversions;
