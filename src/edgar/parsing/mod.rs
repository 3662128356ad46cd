pub mod holdings;
pub mod types;

pub use holdings::parse_holdings;
pub use types::{Holding, ParseDiagnostic, ParsedHoldings};
