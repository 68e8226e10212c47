//! One analysis pass over an option-chain snapshot.
//!
//! Everything is computed first; instrument state is only touched once the
//! pass can no longer fail.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use super::bias::{BiasRow, Verdict, score_expiry_row, score_regular_row};
use super::call_log::{Call, CallStatus, CallTransition, update_calls};
use super::config::{EngineConfig, InstrumentProfile};
use super::levels::{Level, ZonePair, determine_level, support_resistance_zones};
use super::models::{Instrument, OptionChain, OptionChainRow};
use super::processor::{
    OiChangeSummary, StrikeZone, apply_previous_close, attach_greeks, classify_zone,
    filter_atm_window, find_atm_strike, is_expiry_day, nearest_expiry, oi_change_summary,
    pair_rows, parse_expiry, time_to_expiry_years,
};
use super::signals::{RegularContext, Signal, expiry_entry_signals, regular_entry_signal};
use super::state::{InstrumentState, TradeLogEntry};
use crate::error::AnalysisError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CycleMode {
    Regular,
    Expiry,
}

impl fmt::Display for CycleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleMode::Regular => f.write_str("Regular"),
            CycleMode::Expiry => f.write_str("Expiry"),
        }
    }
}

/// Outcome of one pass for one instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub instrument: Instrument,
    pub mode: CycleMode,
    pub timestamp: DateTime<FixedOffset>,
    pub spot: f64,
    pub expiry: String,
    pub atm_strike: Option<f64>,
    pub market_view: Verdict,
    pub total_score: f64,
    pub support_zone: ZonePair,
    pub resistance_zone: ZonePair,
    pub oi_summary: OiChangeSummary,
    pub signals: Vec<Signal>,
    pub transitions: Vec<CallTransition>,
    /// Outbound messages, in emission order
    pub notifications: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum CycleStatus {
    Completed(Box<CycleReport>),
    /// Outside trading hours; nothing fetched or mutated
    MarketClosed,
}

/// Inputs gathered by the caller before the pass
#[derive(Debug, Clone, Copy)]
pub struct CycleInput<'a> {
    pub snapshot: &'a OptionChain,
    /// Underlying's previous close; only read on expiry day
    pub previous_close: Option<f64>,
    pub now: DateTime<FixedOffset>,
}

/// Whether the nearest expiry falls on `now`'s trading date. Lets the caller
/// decide if a previous-close lookup is needed before running the pass.
pub fn needs_previous_close(
    snapshot: &OptionChain,
    now: DateTime<FixedOffset>,
) -> Result<bool, AnalysisError> {
    let expiry = parse_expiry(&nearest_expiry(snapshot)?)?;
    Ok(is_expiry_day(expiry, now))
}

/// Computed but not yet applied
struct Analysis {
    mode: CycleMode,
    atm_strike: Option<f64>,
    bias_rows: Vec<BiasRow>,
    total_score: f64,
    market_view: Verdict,
    support_zone: ZonePair,
    resistance_zone: ZonePair,
    oi_summary: OiChangeSummary,
    signals: Vec<Signal>,
}

pub fn run_cycle(
    state: &mut InstrumentState,
    input: CycleInput<'_>,
    profile: &InstrumentProfile,
    config: &EngineConfig,
) -> Result<CycleReport, AnalysisError> {
    let instrument = state.instrument;
    let now = input.now;

    let spot = input
        .snapshot
        .records
        .underlying_value
        .ok_or(AnalysisError::MissingField("underlyingValue"))?;
    let expiry = nearest_expiry(input.snapshot)?;
    let expiry_date = parse_expiry(&expiry)?;

    let rows = pair_rows(input.snapshot, &expiry);
    if rows.is_empty() {
        return Err(AnalysisError::EmptyChain(expiry));
    }

    let analysis = if is_expiry_day(expiry_date, now) {
        analyze_expiry(rows, spot, input.previous_close, config)?
    } else {
        let time = time_to_expiry_years(expiry_date, now);
        analyze_regular(rows, spot, time, profile, config)
    };

    debug!(
        "{} {} pass: {} bias rows, total score {:.2}, view {}",
        instrument,
        analysis.mode,
        analysis.bias_rows.len(),
        analysis.total_score,
        analysis.market_view
    );

    // Apply
    state.push_price(now, spot);
    state.support_zone = analysis.support_zone;
    state.resistance_zone = analysis.resistance_zone;
    state.bias_table = analysis.bias_rows.clone();

    let transitions = update_calls(&mut state.call_log, spot, now);

    let mut notifications = Vec::new();
    if analysis.mode == CycleMode::Expiry {
        notifications.push(format!("⚠️ {} Expiry Day Detected", instrument));
    }

    for signal in &analysis.signals {
        info!(
            "{} {} at {} (score {:.2}, ltp {}, target {}, sl {})",
            instrument, signal.signal_type, signal.strike, signal.score, signal.ltp, signal.target, signal.stop_loss
        );
        state.append_trade(TradeLogEntry::from_signal(signal, analysis.mode, now));
        state.call_log.push(Call::from_signal(signal, spot, now));
        notifications.push(signal_message(
            instrument,
            signal,
            &analysis.support_zone,
            &analysis.resistance_zone,
        ));
    }

    for transition in &transitions {
        info!(
            "{} {} {} call {} at {}",
            instrument, transition.strike, transition.side, transition.status, transition.exit_price
        );
        notifications.push(transition_message(instrument, transition));
    }

    let report = CycleReport {
        instrument,
        mode: analysis.mode,
        timestamp: now,
        spot,
        expiry,
        atm_strike: analysis.atm_strike,
        market_view: analysis.market_view,
        total_score: analysis.total_score,
        support_zone: analysis.support_zone,
        resistance_zone: analysis.resistance_zone,
        oi_summary: analysis.oi_summary,
        signals: analysis.signals,
        transitions,
        notifications,
    };
    state.last_report = Some(report.clone());

    Ok(report)
}

fn analyze_regular(
    rows: Vec<OptionChainRow>,
    spot: f64,
    time: f64,
    profile: &InstrumentProfile,
    config: &EngineConfig,
) -> Analysis {
    let atm = find_atm_strike(&rows, spot);

    let mut window = match atm {
        Some(atm) => filter_atm_window(&rows, atm, profile.atm_range),
        None => Vec::new(),
    };
    attach_greeks(&mut window, spot, time, config.risk_free_rate);

    let levels: Vec<Level> = window
        .iter()
        .map(|r| determine_level(r, config.dominance_multiplier))
        .collect();
    let (support_zone, resistance_zone) = support_resistance_zones(
        window.iter().map(|r| r.strike_price).zip(levels.iter().copied()),
        spot,
    );

    // Scoring uses the inner half of the window
    let bias_rows: Vec<BiasRow> = match atm {
        Some(atm) => window
            .iter()
            .zip(levels.iter().copied())
            .filter(|(r, _)| (r.strike_price - atm).abs() <= profile.atm_range / 2.0)
            .map(|(r, level)| {
                score_regular_row(r, classify_zone(r.strike_price, atm, spot), level, config)
            })
            .collect(),
        None => Vec::new(),
    };

    let total_score: f64 = bias_rows.iter().map(|b| b.bias_score).sum();
    let market_view = market_view(&bias_rows);

    let ctx = RegularContext {
        spot,
        total_score,
        market_view,
        zone_size: profile.zone_size,
    };
    let signals = regular_entry_signal(&window, &bias_rows, &ctx, config)
        .into_iter()
        .collect();

    Analysis {
        mode: CycleMode::Regular,
        atm_strike: atm,
        oi_summary: oi_change_summary(&window),
        bias_rows,
        total_score,
        market_view,
        support_zone,
        resistance_zone,
        signals,
    }
}

fn analyze_expiry(
    mut rows: Vec<OptionChainRow>,
    spot: f64,
    previous_close: Option<f64>,
    config: &EngineConfig,
) -> Result<Analysis, AnalysisError> {
    if let Some(close) = previous_close {
        apply_previous_close(&mut rows, close);
    }

    let atm = find_atm_strike(&rows, spot);
    let levels: Vec<Level> = rows
        .iter()
        .map(|r| determine_level(r, config.dominance_multiplier))
        .collect();
    let (support_zone, resistance_zone) = support_resistance_zones(
        rows.iter().map(|r| r.strike_price).zip(levels.iter().copied()),
        spot,
    );

    let bias_rows = rows
        .iter()
        .zip(levels.iter().copied())
        .map(|(r, level)| {
            let zone = match atm {
                Some(atm) => classify_zone(r.strike_price, atm, spot),
                None => StrikeZone::Otm,
            };
            score_expiry_row(r, zone, level, spot, config)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let total_score: f64 = bias_rows.iter().map(|b| b.bias_score).sum();
    let signals = expiry_entry_signals(&rows, &bias_rows, config);

    Ok(Analysis {
        mode: CycleMode::Expiry,
        atm_strike: atm,
        oi_summary: oi_change_summary(&rows),
        market_view: market_view(&bias_rows),
        bias_rows,
        total_score,
        support_zone,
        resistance_zone,
        signals,
    })
}

/// Verdict of the ATM row, Neutral without one
fn market_view(bias_rows: &[BiasRow]) -> Verdict {
    bias_rows
        .iter()
        .find(|b| b.zone == StrikeZone::Atm)
        .map(|b| b.verdict)
        .unwrap_or(Verdict::Neutral)
}

pub fn signal_message(
    instrument: Instrument,
    signal: &Signal,
    support: &ZonePair,
    resistance: &ZonePair,
) -> String {
    format!(
        "📍 {} {} Signal\nStrike: {}\nScore: {:.2}\nLTP: {}\nTarget: {}\nSL: {}\nSupport Zone: {}\nResistance Zone: {}\nReason: {}",
        instrument,
        signal.signal_type,
        signal.strike,
        signal.score,
        signal.ltp,
        signal.target,
        signal.stop_loss,
        support,
        resistance,
        signal.reason
    )
}

pub fn transition_message(instrument: Instrument, transition: &CallTransition) -> String {
    let icon = match transition.status {
        CallStatus::HitTarget => "✅",
        _ => "🛑",
    };
    format!(
        "{} {} {} {} call {} at {:.2}",
        icon, instrument, transition.strike, transition.side, transition.status, transition.exit_price
    )
}

pub fn error_message(instrument: Instrument, error: &dyn fmt::Display) -> String {
    format!("❌ {} Error: {}", instrument, error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nse::config::ist;
    use crate::nse::models::{OptionData, OptionDetail, Records};
    use chrono::TimeZone;

    fn detail(oi: f64, ltp: f64) -> OptionDetail {
        OptionDetail {
            expiry_date: Some("23-Oct-2026".to_string()),
            last_price: Some(ltp),
            open_interest: Some(oi),
            change_in_oi: Some(10.0),
            total_traded_volume: Some(100.0),
            implied_volatility: Some(12.0),
            bid_qty: Some(10.0),
            ask_qty: Some(10.0),
            ..Default::default()
        }
    }

    fn snapshot(spot: f64) -> OptionChain {
        let data = [19900.0, 20000.0, 20100.0]
            .into_iter()
            .map(|k| OptionData {
                strike_price: Some(k),
                expiry_date: Some("23-Oct-2026".to_string()),
                call: Some(detail(1000.0, 50.0)),
                put: Some(detail(1000.0, 50.0)),
            })
            .collect();
        OptionChain {
            records: Records {
                timestamp: None,
                underlying_value: Some(spot),
                expiry_dates: vec!["23-Oct-2026".to_string()],
                data,
            },
        }
    }

    fn at(day: u32) -> DateTime<FixedOffset> {
        ist().with_ymd_and_hms(2026, 10, day, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_missing_spot_is_input_error() {
        let mut snap = snapshot(20000.0);
        snap.records.underlying_value = None;
        let mut state = InstrumentState::new(Instrument::Nifty, 10);
        let config = EngineConfig::default();
        let input = CycleInput { snapshot: &snap, previous_close: None, now: at(19) };

        let err = run_cycle(&mut state, input, &config.profile(Instrument::Nifty), &config).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingField("underlyingValue")));
        assert!(state.price_history.is_empty());
    }

    #[test]
    fn test_expiry_without_previous_close_leaves_state() {
        let snap = snapshot(20000.0);
        let mut state = InstrumentState::new(Instrument::Nifty, 10);
        let config = EngineConfig::default();
        let input = CycleInput { snapshot: &snap, previous_close: None, now: at(23) };

        assert!(needs_previous_close(&snap, at(23)).unwrap());
        let err = run_cycle(&mut state, input, &config.profile(Instrument::Nifty), &config).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingPreviousClose));
        assert!(state.price_history.is_empty());
        assert!(state.last_report.is_none());
    }

    #[test]
    fn test_balanced_chain_is_neutral() {
        let snap = snapshot(20000.0);
        let mut state = InstrumentState::new(Instrument::Nifty, 10);
        let config = EngineConfig::default();
        let input = CycleInput { snapshot: &snap, previous_close: None, now: at(19) };

        assert!(!needs_previous_close(&snap, at(19)).unwrap());
        let report = run_cycle(&mut state, input, &config.profile(Instrument::Nifty), &config).unwrap();
        assert_eq!(report.mode, CycleMode::Regular);
        assert_eq!(report.atm_strike, Some(20000.0));
        assert!(report.signals.is_empty());
        assert_eq!(report.support_zone, ZonePair::EMPTY);
        assert_eq!(state.bias_table.len(), 3);
        assert_eq!(state.price_history.len(), 1);
        assert!(report.notifications.is_empty());
    }

    #[test]
    fn test_messages() {
        assert_eq!(error_message(Instrument::NiftyIt, &"timeout"), "❌ NIFTY IT Error: timeout");
    }
}
