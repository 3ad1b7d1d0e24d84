//! Pure price and APR math. Nothing in here performs I/O.

pub mod apr;
pub mod price;
pub mod tick;
