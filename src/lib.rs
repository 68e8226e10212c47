pub mod app_config;
pub mod error;
pub mod export;
pub mod logging;
pub mod notifier;
pub mod nse;
pub mod utility;

// Re-exports for convenience
pub use app_config::{AppConfig, RunMode};
pub use error::AnalysisError;
pub use notifier::{LogNotifier, Notifier, TelegramNotifier};
