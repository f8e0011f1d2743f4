//! Domain-level building blocks shared across the API, storage, and gateway
//! crates: validated records, storage trait contracts, the derived-balance
//! calculator, and the ambient configuration/telemetry plumbing.

pub mod balance;
pub mod config;
pub mod model;
pub mod services;
pub mod storage;

pub use balance::balance_for;
pub use model::*;
pub use services::*;
pub use storage::*;
