pub mod config;
pub mod service;
pub mod types;

pub use config::HoldingsConfig;
pub use service::HoldingsService;
pub use types::HoldingsBackend;
