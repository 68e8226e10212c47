pub mod analysis;
pub mod bias;
pub mod call_log;
pub mod config;
pub mod greeks;
pub mod levels;
pub mod models;
pub mod nse_api_server;
pub mod nse_client;
pub mod nse_commands;
pub mod processor;
pub mod signals;
pub mod state;

// Re-exports (public API)
pub use analysis::{CycleInput, CycleMode, CycleReport, CycleStatus, run_cycle};
pub use bias::{Bias, BiasRow, DvpTable, SubBias, Verdict, VerdictThresholds};
pub use call_log::{Call, CallLogSummary, CallStatus, CallTransition, update_calls};
pub use config::{EngineConfig, InstrumentProfile};
pub use greeks::{Greeks, calculate_greeks};
pub use levels::{Level, ZonePair, classify_level, is_in_zone, support_resistance_zones};
pub use models::{Instrument, OptionChain, OptionChainRow, OptionSide, SecurityType, SideQuote};
pub use nse_client::{MarketDataSource, NSEClient};
pub use nse_commands::{Engine, NSECommands};
pub use signals::{Signal, SignalType};
pub use state::{InstrumentSnapshot, InstrumentState, SharedState, StateStore, TradeLogEntry};
