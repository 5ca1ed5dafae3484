//! Token-bucket rate limiting — per-client admission control with tiered
//! refill policies and per-route cost weighting.

mod bucket;
mod registry;
mod tier;

pub use bucket::{TakeResult, TokenBucket};
pub use registry::{ClientRecordSnapshot, RateLimiterRegistry};
pub use tier::Tier;
