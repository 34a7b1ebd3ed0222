//! Cost accounting for Attaché sessions.
//!
//! A session accumulates token usage per LLM call; the pricing table turns
//! that into the dollar figure reported in the session outcome.

pub mod pricing;

pub use pricing::{ModelPricing, PricingTable};
