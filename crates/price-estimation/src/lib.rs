//! Swap quotes across the fee tiers of the concentrated liquidity exchange.

pub mod fence;
pub mod router;
pub mod session;

pub use self::{
    fence::{Fence, Ticket},
    router::{DEFAULT_TICK_SPACINGS, MultiHopQuote, Quote, QuoteError, QuoteRouter},
    session::{QuoteSession, Superseded},
};
