use chrono::{DateTime, FixedOffset, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::bias::{DvpTable, SubBias, VerdictThresholds};
use super::models::{Instrument, SecurityType};
use crate::error::AnalysisError;

// -----------------------------------------------
// NSE API ENDPOINTS
// -----------------------------------------------
pub const NSE_BASE_URL: &str = "https://www.nseindia.com";

pub fn nse_option_chain_url(instrument: Instrument) -> String {
    let path = match instrument.security_type() {
        SecurityType::Indices => "option-chain-indices",
        SecurityType::Equity => "option-chain-equities",
    };
    format!(
        "{}/api/{}?symbol={}",
        NSE_BASE_URL,
        path,
        urlencoding::encode(instrument.symbol())
    )
}

pub fn nse_previous_close_url(instrument: Instrument) -> String {
    match instrument.security_type() {
        SecurityType::Indices => format!(
            "{}/api/equity-stockIndices?index={}",
            NSE_BASE_URL,
            urlencoding::encode(&format!("{} INDEX", instrument.symbol()))
        ),
        SecurityType::Equity => format!(
            "{}/api/quote-equity?symbol={}",
            NSE_BASE_URL,
            urlencoding::encode(instrument.symbol())
        ),
    }
}

// -----------------------------------------------
// HTTP CLIENT CONFIG
// -----------------------------------------------
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                               AppleWebKit/537.36 (KHTML, like Gecko) \
                               Chrome/131.0.0.0 Safari/537.36";

pub const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-GB,en;q=0.8",
    "en-IN,en;q=0.9",
];

pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
pub const WARMUP_DELAY_MS: u64 = 200;

pub const RETRY_BASE_DELAY_MS: u64 = 100;
pub const RETRY_FACTOR: u64 = 2;
pub const RETRY_MAX_DELAY_SECS: u64 = 3;
pub const RETRY_MAX_ATTEMPTS: usize = 3;

pub const HEADER_REFERER: &str = "https://www.nseindia.com/";
pub const HEADER_X_REQUESTED_WITH: &str = "XMLHttpRequest";
pub const HEADER_ACCEPT_HTML: &str = "text/html";

// -----------------------------------------------
// MARKET CALENDAR
// -----------------------------------------------
pub const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// Asia/Kolkata (no DST)
pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECS).unwrap_or(Utc.fix())
}

pub fn now_ist() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&ist())
}

pub const MARKET_OPEN: (u32, u32) = (9, 0);
pub const MARKET_CLOSE: (u32, u32) = (15, 40);

pub fn market_open_time() -> NaiveTime {
    NaiveTime::from_hms_opt(MARKET_OPEN.0, MARKET_OPEN.1, 0).unwrap_or(NaiveTime::MIN)
}

pub fn market_close_time() -> NaiveTime {
    NaiveTime::from_hms_opt(MARKET_CLOSE.0, MARKET_CLOSE.1, 0).unwrap_or(NaiveTime::MIN)
}

// -----------------------------------------------
// ENGINE DEFAULTS
// -----------------------------------------------

/// PE OI must exceed CE OI by this factor (or vice versa) for a strike to be
/// classified as Support (Resistance). Must stay strictly above 1.
pub const DEFAULT_DOMINANCE_MULTIPLIER: f64 = 1.12;

/// Hand-tuned entry thresholds. No documented derivation; candidates for
/// calibration rather than trusted values.
pub const DEFAULT_SCORE_THRESHOLD_REGULAR: f64 = 4.0;
pub const DEFAULT_SCORE_THRESHOLD_EXPIRY: f64 = 1.5;

pub const DEFAULT_STOP_LOSS_FRACTION: f64 = 0.8;
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.06;
pub const DEFAULT_EXPIRY_TARGET_MULTIPLIER: f64 = 1.2;

pub const EXPIRY_BID_DOMINANCE_RATIO: f64 = 1.5;
pub const EXPIRY_CHURN_RATIO: f64 = 2.0;

pub const DEFAULT_MAX_HISTORY: usize = 5_000;
pub const DEFAULT_REFRESH_SECS: u64 = 120;

/// Static per-instrument sizing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstrumentProfile {
    /// Contract lot size. Informational only: listed by `/api/instruments`,
    /// never used in scoring or signals.
    pub lot_size: u32,
    /// Price tolerance around a strike for "spot is in zone"
    pub zone_size: f64,
    /// Half-width of the strike window analyzed around ATM
    pub atm_range: f64,
}

impl InstrumentProfile {
    pub const fn new(lot_size: u32, zone_size: f64, atm_range: f64) -> Self {
        Self { lot_size, zone_size, atm_range }
    }

    pub fn default_for(instrument: Instrument) -> Self {
        match instrument {
            Instrument::Nifty => Self::new(75, 20.0, 200.0),
            Instrument::BankNifty => Self::new(25, 100.0, 500.0),
            Instrument::NiftyIt => Self::new(50, 50.0, 300.0),
            Instrument::NiftyAuto => Self::new(50, 50.0, 300.0),
            Instrument::Tcs => Self::new(150, 30.0, 150.0),
            Instrument::Reliance => Self::new(250, 40.0, 200.0),
            Instrument::HdfcBank => Self::new(550, 50.0, 250.0),
        }
    }

    /// Parses "lot,zone,atm"
    fn parse(raw: &str) -> Result<Self, AnalysisError> {
        let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(AnalysisError::Config(format!(
                "profile '{}' must be 'lot,zone,atm'",
                raw
            )));
        }
        let lot_size = parts[0]
            .parse::<u32>()
            .map_err(|e| AnalysisError::Config(format!("lot size '{}': {}", parts[0], e)))?;
        let zone_size = parse_f64("zone size", parts[1])?;
        let atm_range = parse_f64("atm range", parts[2])?;
        Ok(Self::new(lot_size, zone_size, atm_range))
    }
}

/// Tunables for one analysis pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub dominance_multiplier: f64,
    pub score_threshold_regular: f64,
    pub score_threshold_expiry: f64,
    pub stop_loss_fraction: f64,
    pub risk_free_rate: f64,
    pub expiry_target_multiplier: f64,
    pub verdict: VerdictThresholds,
    pub weights: BTreeMap<SubBias, f64>,
    pub dvp_table: DvpTable,
    pub profiles: BTreeMap<Instrument, InstrumentProfile>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dominance_multiplier: DEFAULT_DOMINANCE_MULTIPLIER,
            score_threshold_regular: DEFAULT_SCORE_THRESHOLD_REGULAR,
            score_threshold_expiry: DEFAULT_SCORE_THRESHOLD_EXPIRY,
            stop_loss_fraction: DEFAULT_STOP_LOSS_FRACTION,
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            expiry_target_multiplier: DEFAULT_EXPIRY_TARGET_MULTIPLIER,
            verdict: VerdictThresholds::default(),
            weights: SubBias::ALL.into_iter().map(|b| (b, 1.0)).collect(),
            dvp_table: DvpTable::default(),
            profiles: Instrument::ALL
                .into_iter()
                .map(|i| (i, InstrumentProfile::default_for(i)))
                .collect(),
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `NSE_*` environment variables
    pub fn from_env() -> Result<Self, AnalysisError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AnalysisError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        let overlay = |key: &str, target: &mut f64| -> Result<(), AnalysisError> {
            if let Some(raw) = lookup(key) {
                *target = parse_f64(key, &raw)?;
            }
            Ok(())
        };
        overlay("NSE_DOMINANCE_MULTIPLIER", &mut cfg.dominance_multiplier)?;
        overlay("NSE_SCORE_THRESHOLD_REGULAR", &mut cfg.score_threshold_regular)?;
        overlay("NSE_SCORE_THRESHOLD_EXPIRY", &mut cfg.score_threshold_expiry)?;
        overlay("NSE_STOP_LOSS_FRACTION", &mut cfg.stop_loss_fraction)?;
        overlay("NSE_RISK_FREE_RATE", &mut cfg.risk_free_rate)?;
        overlay("NSE_EXPIRY_TARGET_MULTIPLIER", &mut cfg.expiry_target_multiplier)?;
        overlay("NSE_VERDICT_STRONG", &mut cfg.verdict.strong)?;
        overlay("NSE_VERDICT_MILD", &mut cfg.verdict.mild)?;

        if let Some(raw) = lookup("NSE_BIAS_WEIGHTS") {
            for (bias, weight) in parse_weights(&raw)? {
                cfg.weights.insert(bias, weight);
            }
        }

        if let Some(raw) = lookup("NSE_DVP_TABLE") {
            cfg.dvp_table = raw.parse()?;
        }

        for instrument in Instrument::ALL {
            if let Some(raw) = lookup(&format!("NSE_PROFILE_{}", instrument.env_key())) {
                cfg.profiles.insert(instrument, InstrumentProfile::parse(&raw)?);
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.dominance_multiplier <= 1.0 {
            return Err(AnalysisError::Config(format!(
                "dominance multiplier must be > 1, got {}",
                self.dominance_multiplier
            )));
        }
        if !(0.0..1.0).contains(&self.stop_loss_fraction) {
            return Err(AnalysisError::Config(format!(
                "stop-loss fraction must be in [0, 1), got {}",
                self.stop_loss_fraction
            )));
        }
        if self.verdict.mild <= 0.0 || self.verdict.strong < self.verdict.mild {
            return Err(AnalysisError::Config(format!(
                "verdict cutpoints need 0 < mild <= strong, got mild={} strong={}",
                self.verdict.mild, self.verdict.strong
            )));
        }
        for (instrument, profile) in &self.profiles {
            if profile.zone_size < 0.0 || profile.atm_range <= 0.0 {
                return Err(AnalysisError::Config(format!(
                    "{} profile has invalid zone/atm range",
                    instrument
                )));
            }
        }
        Ok(())
    }

    pub fn profile(&self, instrument: Instrument) -> InstrumentProfile {
        self.profiles
            .get(&instrument)
            .copied()
            .unwrap_or_else(|| InstrumentProfile::default_for(instrument))
    }

    pub fn weight(&self, bias: SubBias) -> f64 {
        self.weights.get(&bias).copied().unwrap_or(1.0)
    }
}

fn parse_f64(name: &str, raw: &str) -> Result<f64, AnalysisError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|e| AnalysisError::Config(format!("{} '{}': {}", name, raw, e)))
}

/// Parses "ChgOI_Bias=2,IV_Bias=0.5"
fn parse_weights(raw: &str) -> Result<Vec<(SubBias, f64)>, AnalysisError> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| AnalysisError::Config(format!("weight '{}' must be name=value", pair)))?;
            Ok((name.trim().parse::<SubBias>()?, parse_f64(name, value)?))
        })
        .collect()
}
