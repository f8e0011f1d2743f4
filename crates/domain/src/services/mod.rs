//! Shared service helpers: the checkout-result cache and telemetry wiring.

pub mod cache;
pub mod telemetry;

pub use cache::*;
pub use telemetry::*;
