use anyhow::{Result, bail};
use colored::Colorize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::nse::config::{DEFAULT_MAX_HISTORY, DEFAULT_REFRESH_SECS};
use crate::nse::models::Instrument;

pub const DEFAULT_PORT: u16 = 3001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// One cycle per instrument, then exit
    Once,
    /// Cycles on a fixed interval
    Watch,
    /// Watch loop plus the HTTP API
    Server,
}

impl FromStr for RunMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "once" | "batch" => Ok(RunMode::Once),
            "watch" => Ok(RunMode::Watch),
            "server" => Ok(RunMode::Server),
            other => bail!("unknown mode '{}', expected once|watch|server", other),
        }
    }
}

/// Runtime settings, from `NSE_*` environment variables
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mode: RunMode,
    pub instruments: Vec<Instrument>,
    pub port: u16,
    pub refresh: Duration,
    pub export_dir: Option<PathBuf>,
    pub max_history: usize,
    pub ignore_market_hours: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Once,
            instruments: Instrument::ALL.to_vec(),
            port: DEFAULT_PORT,
            refresh: Duration::from_secs(DEFAULT_REFRESH_SECS),
            export_dir: None,
            max_history: DEFAULT_MAX_HISTORY,
            ignore_market_hours: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(mode) = lookup("NSE_MODE") {
            cfg.mode = mode.parse()?;
        }

        if let Some(symbols) = lookup("NSE_SYMBOLS") {
            cfg.instruments = symbols
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<Instrument>().map_err(anyhow::Error::from))
                .collect::<Result<Vec<_>>>()?;
            cfg.instruments.dedup();
        }

        if let Some(port) = lookup("NSE_PORT") {
            cfg.port = port
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("NSE_PORT '{}': {}", port, e))?;
        }

        if let Some(secs) = lookup("NSE_REFRESH_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("NSE_REFRESH_SECS '{}': {}", secs, e))?;
            cfg.refresh = Duration::from_secs(secs);
        }

        cfg.export_dir = lookup("NSE_EXPORT_DIR")
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from);

        if let Some(max) = lookup("NSE_MAX_HISTORY") {
            cfg.max_history = max
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("NSE_MAX_HISTORY '{}': {}", max, e))?;
        }

        if let Some(flag) = lookup("NSE_IGNORE_MARKET_HOURS") {
            cfg.ignore_market_hours = matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.instruments.is_empty() {
            bail!("NSE_SYMBOLS selects no instruments");
        }
        if self.refresh.is_zero() {
            bail!("NSE_REFRESH_SECS must be positive");
        }
        if self.max_history == 0 {
            bail!("NSE_MAX_HISTORY must be positive");
        }
        Ok(())
    }

    pub fn print_summary(&self) {
        let symbols: Vec<&str> = self.instruments.iter().map(|i| i.symbol()).collect();
        println!("{} Mode: {:?}", "→".cyan(), self.mode);
        println!("{} Instruments: {}", "→".cyan(), symbols.join(", ").yellow());
        if self.mode != RunMode::Once {
            println!("{} Refresh: {}s", "→".cyan(), self.refresh.as_secs());
        }
        if self.mode == RunMode::Server {
            println!("{} Port: {}", "→".cyan(), self.port);
        }
        if self.ignore_market_hours {
            println!("{} Market-hours gate disabled", "⚠".yellow());
        }
    }
}
