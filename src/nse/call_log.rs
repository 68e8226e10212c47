//! Lifecycle of suggested trades.
//!
//! A call starts `Active` and moves once to `Hit Target` or `Hit Stoploss`
//! when the underlying crosses one of its levels. Terminal calls are kept for
//! audit and never change again.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::models::OptionSide;
use super::processor::round2;
use super::signals::Signal;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CallStatus {
    Active,
    #[serde(rename = "Hit Target")]
    HitTarget,
    #[serde(rename = "Hit Stoploss")]
    HitStoploss,
}

impl CallStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CallStatus::Active)
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallStatus::Active => "Active",
            CallStatus::HitTarget => "Hit Target",
            CallStatus::HitStoploss => "Hit Stoploss",
        };
        f.write_str(s)
    }
}

/// Tracked trade. `Targets` and `Stoploss` are levels on the underlying.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Call {
    #[serde(rename = "Strike")]
    pub strike: f64,
    #[serde(rename = "Type")]
    pub side: OptionSide,
    #[serde(rename = "Targets")]
    pub targets: BTreeMap<String, f64>,
    #[serde(rename = "Stoploss")]
    pub stoploss: f64,
    #[serde(rename = "Status")]
    pub status: CallStatus,
    #[serde(rename = "Entry_Time")]
    pub entry_time: DateTime<FixedOffset>,
    #[serde(rename = "Entry_Price")]
    pub entry_price: Option<f64>,
    #[serde(rename = "Entry_Spot")]
    pub entry_spot: Option<f64>,
    #[serde(rename = "Exit_Time")]
    pub exit_time: Option<DateTime<FixedOffset>>,
    #[serde(rename = "Exit_Price")]
    pub exit_price: Option<f64>,
}

impl Call {
    pub fn new(
        side: OptionSide,
        strike: f64,
        targets: BTreeMap<String, f64>,
        stoploss: f64,
        entry_time: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            strike,
            side,
            targets,
            stoploss,
            status: CallStatus::Active,
            entry_time,
            entry_price: None,
            entry_spot: None,
            exit_time: None,
            exit_price: None,
        }
    }

    /// Opens a call from a premium-denominated signal. The premium distance to
    /// target and stop is carried over to the underlying at entry spot.
    pub fn from_signal(signal: &Signal, spot: f64, entry_time: DateTime<FixedOffset>) -> Self {
        let reward = signal.target - signal.ltp;
        let risk = signal.ltp - signal.stop_loss;

        let (target, stoploss) = match signal.side() {
            OptionSide::Call => (spot + reward, spot - risk),
            OptionSide::Put => (spot - reward, spot + risk),
        };

        let mut targets = BTreeMap::new();
        targets.insert("T1".to_string(), round2(target));

        let mut call = Self::new(signal.side(), signal.strike, targets, round2(stoploss), entry_time);
        call.entry_price = Some(signal.ltp);
        call.entry_spot = Some(spot);
        call
    }

    /// Highest target for CE, lowest for PE
    fn decisive_target(&self) -> Option<f64> {
        let values = self.targets.values().copied();
        match self.side {
            OptionSide::Call => values.reduce(f64::max),
            OptionSide::Put => values.reduce(f64::min),
        }
    }

    /// Applies one spot observation. Returns the new status on transition.
    /// Target is checked first and wins when both levels are crossed.
    pub fn update(&mut self, spot: f64, now: DateTime<FixedOffset>) -> Option<CallStatus> {
        if self.status.is_terminal() {
            return None;
        }

        let target = self.decisive_target();
        let next = match self.side {
            OptionSide::Call if target.is_some_and(|t| spot >= t) => CallStatus::HitTarget,
            OptionSide::Call if spot <= self.stoploss => CallStatus::HitStoploss,
            OptionSide::Put if target.is_some_and(|t| spot <= t) => CallStatus::HitTarget,
            OptionSide::Put if spot >= self.stoploss => CallStatus::HitStoploss,
            _ => return None,
        };

        self.status = next;
        self.exit_time = Some(now);
        self.exit_price = Some(spot);
        Some(next)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallTransition {
    pub strike: f64,
    pub side: OptionSide,
    pub status: CallStatus,
    pub exit_price: f64,
    pub exit_time: DateTime<FixedOffset>,
}

/// Evaluates every Active call against `spot`
pub fn update_calls(calls: &mut [Call], spot: f64, now: DateTime<FixedOffset>) -> Vec<CallTransition> {
    calls
        .iter_mut()
        .filter_map(|call| {
            let status = call.update(spot, now)?;
            Some(CallTransition {
                strike: call.strike,
                side: call.side,
                status,
                exit_price: spot,
                exit_time: now,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct CallLogSummary {
    pub total: usize,
    pub active: usize,
    pub hit_target: usize,
    pub hit_stoploss: usize,
    /// Share of closed calls that hit target, in percent
    pub hit_rate: Option<f64>,
}

pub fn summarize(calls: &[Call]) -> CallLogSummary {
    let mut summary = CallLogSummary {
        total: calls.len(),
        ..Default::default()
    };
    for call in calls {
        match call.status {
            CallStatus::Active => summary.active += 1,
            CallStatus::HitTarget => summary.hit_target += 1,
            CallStatus::HitStoploss => summary.hit_stoploss += 1,
        }
    }

    let closed = summary.hit_target + summary.hit_stoploss;
    if closed > 0 {
        summary.hit_rate = Some(round2(summary.hit_target as f64 * 100.0 / closed as f64));
    }
    summary
}
