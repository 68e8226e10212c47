use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::analysis::{CycleMode, CycleReport};
use super::bias::BiasRow;
use super::call_log::{Call, CallLogSummary, summarize};
use super::levels::ZonePair;
use super::models::{Instrument, OptionSide};
use super::signals::{Signal, SignalType};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PricePoint {
    pub time: DateTime<FixedOffset>,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeLogEntry {
    #[serde(rename = "Time")]
    pub time: DateTime<FixedOffset>,
    #[serde(rename = "Strike")]
    pub strike: f64,
    #[serde(rename = "Type")]
    pub side: OptionSide,
    #[serde(rename = "Signal")]
    pub signal_type: SignalType,
    #[serde(rename = "LTP")]
    pub ltp: f64,
    #[serde(rename = "Target")]
    pub target: f64,
    #[serde(rename = "SL")]
    pub stop_loss: f64,
    #[serde(rename = "Score")]
    pub score: f64,
    #[serde(rename = "Reason")]
    pub reason: String,
    #[serde(rename = "Mode")]
    pub mode: CycleMode,
}

impl TradeLogEntry {
    pub fn from_signal(signal: &Signal, mode: CycleMode, time: DateTime<FixedOffset>) -> Self {
        Self {
            time,
            strike: signal.strike,
            side: signal.side(),
            signal_type: signal.signal_type,
            ltp: signal.ltp,
            target: signal.target,
            stop_loss: signal.stop_loss,
            score: signal.score,
            reason: signal.reason.clone(),
            mode,
        }
    }
}

/// Everything accumulated for one instrument since start-up
#[derive(Debug, Clone)]
pub struct InstrumentState {
    pub instrument: Instrument,
    max_history: usize,
    pub price_history: VecDeque<PricePoint>,
    pub trade_log: Vec<TradeLogEntry>,
    pub call_log: Vec<Call>,
    pub support_zone: ZonePair,
    pub resistance_zone: ZonePair,
    pub bias_table: Vec<BiasRow>,
    pub last_report: Option<CycleReport>,
}

impl InstrumentState {
    pub fn new(instrument: Instrument, max_history: usize) -> Self {
        Self {
            instrument,
            max_history: max_history.max(1),
            price_history: VecDeque::new(),
            trade_log: Vec::new(),
            call_log: Vec::new(),
            support_zone: ZonePair::EMPTY,
            resistance_zone: ZonePair::EMPTY,
            bias_table: Vec::new(),
            last_report: None,
        }
    }

    /// Appends a spot observation, dropping the oldest beyond the bound
    pub fn push_price(&mut self, time: DateTime<FixedOffset>, price: f64) {
        self.price_history.push_back(PricePoint { time, price });
        while self.price_history.len() > self.max_history {
            self.price_history.pop_front();
        }
    }

    /// Appends to the trade log. A timestamp older than the last entry is
    /// raised to it so the log stays ordered.
    pub fn append_trade(&mut self, mut entry: TradeLogEntry) {
        if let Some(last) = self.trade_log.last() {
            if entry.time < last.time {
                entry.time = last.time;
            }
        }
        self.trade_log.push(entry);
    }

    pub fn snapshot(&self) -> InstrumentSnapshot {
        InstrumentSnapshot {
            instrument: self.instrument,
            price_history: self.price_history.iter().copied().collect(),
            support_zone: self.support_zone,
            resistance_zone: self.resistance_zone,
            bias_table: self.bias_table.clone(),
            trade_log: self.trade_log.clone(),
            call_log: self.call_log.clone(),
            call_summary: summarize(&self.call_log),
            last_report: self.last_report.clone(),
        }
    }
}

/// Read-only copy of one instrument's state for rendering and export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentSnapshot {
    pub instrument: Instrument,
    pub price_history: Vec<PricePoint>,
    pub support_zone: ZonePair,
    pub resistance_zone: ZonePair,
    pub bias_table: Vec<BiasRow>,
    pub trade_log: Vec<TradeLogEntry>,
    pub call_log: Vec<Call>,
    pub call_summary: CallLogSummary,
    pub last_report: Option<CycleReport>,
}

/// Process-wide state keyed by instrument
#[derive(Debug, Clone)]
pub struct StateStore {
    max_history: usize,
    instruments: HashMap<Instrument, InstrumentState>,
}

pub type SharedState = Arc<RwLock<StateStore>>;

impl StateStore {
    pub fn new(instruments: &[Instrument], max_history: usize) -> Self {
        let instruments = instruments
            .iter()
            .map(|i| (*i, InstrumentState::new(*i, max_history)))
            .collect();
        Self { max_history, instruments }
    }

    pub fn into_shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    pub fn get(&self, instrument: Instrument) -> Option<&InstrumentState> {
        self.instruments.get(&instrument)
    }

    /// State for `instrument`, created on first use
    pub fn state_mut(&mut self, instrument: Instrument) -> &mut InstrumentState {
        let max_history = self.max_history;
        self.instruments
            .entry(instrument)
            .or_insert_with(|| InstrumentState::new(instrument, max_history))
    }

    pub fn snapshot(&self, instrument: Instrument) -> Option<InstrumentSnapshot> {
        self.get(instrument).map(InstrumentState::snapshot)
    }

    /// Tracked instruments in their declared order
    pub fn instruments(&self) -> Vec<Instrument> {
        let mut list: Vec<Instrument> = self.instruments.keys().copied().collect();
        list.sort();
        list
    }

    pub fn reset(&mut self, instrument: Instrument) {
        if let Some(state) = self.instruments.get_mut(&instrument) {
            *state = InstrumentState::new(instrument, self.max_history);
        }
    }

    pub fn clear(&mut self) {
        for (instrument, state) in self.instruments.iter_mut() {
            *state = InstrumentState::new(*instrument, self.max_history);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nse::config::ist;
    use chrono::{Duration, TimeZone};

    fn at(minute: u32) -> DateTime<FixedOffset> {
        ist().with_ymd_and_hms(2026, 10, 19, 10, minute, 0).unwrap()
    }

    fn entry(time: DateTime<FixedOffset>) -> TradeLogEntry {
        TradeLogEntry {
            time,
            strike: 20000.0,
            side: OptionSide::Call,
            signal_type: SignalType::BuyCall,
            ltp: 100.0,
            target: 115.0,
            stop_loss: 80.0,
            score: 5.0,
            reason: "test".to_string(),
            mode: CycleMode::Regular,
        }
    }

    #[test]
    fn test_price_history_bounded() {
        let mut state = InstrumentState::new(Instrument::Nifty, 3);
        for i in 0..5 {
            state.push_price(at(i), 20000.0 + i as f64);
        }
        assert_eq!(state.price_history.len(), 3);
        assert_eq!(state.price_history.front().map(|p| p.price), Some(20002.0));
    }

    #[test]
    fn test_trade_log_ordered() {
        let mut state = InstrumentState::new(Instrument::Nifty, 10);
        state.append_trade(entry(at(5)));
        state.append_trade(entry(at(5) - Duration::seconds(30)));
        state.append_trade(entry(at(7)));

        let times: Vec<_> = state.trade_log.iter().map(|e| e.time).collect();
        assert_eq!(times, vec![at(5), at(5), at(7)]);
    }

    #[test]
    fn test_store_lifecycle() {
        let mut store = StateStore::new(&[Instrument::Tcs, Instrument::Nifty], 10);
        assert_eq!(store.instruments(), vec![Instrument::Nifty, Instrument::Tcs]);

        store.state_mut(Instrument::Nifty).push_price(at(0), 20000.0);
        store.state_mut(Instrument::Tcs).append_trade(entry(at(1)));
        assert_eq!(store.snapshot(Instrument::Nifty).unwrap().price_history.len(), 1);

        store.reset(Instrument::Nifty);
        assert!(store.get(Instrument::Nifty).unwrap().price_history.is_empty());
        assert_eq!(store.get(Instrument::Tcs).unwrap().trade_log.len(), 1);

        store.clear();
        assert!(store.get(Instrument::Tcs).unwrap().trade_log.is_empty());
        assert!(store.snapshot(Instrument::BankNifty).is_none());

        store.state_mut(Instrument::BankNifty);
        assert!(store.snapshot(Instrument::BankNifty).is_some());
    }
}
