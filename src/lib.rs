pub mod core;
pub mod edgar;
pub mod utils;
pub mod web;

// Re-exports
pub use crate::core::{HoldingsBackend, HoldingsConfig, HoldingsService};
pub use edgar::{Cik, FetchError, FilingHoldings, Holding};
