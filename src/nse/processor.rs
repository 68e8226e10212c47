use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::config::{ist, market_close_time, market_open_time};
use super::greeks::calculate_greeks;
use super::models::{OptionChain, OptionChainRow, OptionDetail, OptionSide, SideQuote};
use crate::error::AnalysisError;

/// Expiry dates as published, e.g. "23-Oct-2026"
pub const EXPIRY_FORMAT: &str = "%d-%b-%Y";

/// Moneyness of a strike relative to ATM and spot
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StrikeZone {
    #[serde(rename = "ATM")]
    Atm,
    #[serde(rename = "ITM")]
    Itm,
    #[serde(rename = "OTM")]
    Otm,
}

impl fmt::Display for StrikeZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StrikeZone::Atm => "ATM",
            StrikeZone::Itm => "ITM",
            StrikeZone::Otm => "OTM",
        };
        f.write_str(s)
    }
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// First listed expiry is the nearest one
pub fn nearest_expiry(chain: &OptionChain) -> Result<String, AnalysisError> {
    chain
        .records
        .expiry_dates
        .first()
        .cloned()
        .ok_or(AnalysisError::NoExpiry)
}

pub fn parse_expiry(value: &str) -> Result<NaiveDate, AnalysisError> {
    NaiveDate::parse_from_str(value.trim(), EXPIRY_FORMAT).map_err(|source| {
        AnalysisError::InvalidExpiry {
            value: value.to_string(),
            source,
        }
    })
}

/// Joins CE and PE sides per strike for one expiry, ascending by strike.
/// Each leg must carry that expiry and the record's strike; a leg without
/// its own expiry takes the record's. Records with either side absent,
/// mismatched or incomplete are dropped.
pub fn pair_rows(chain: &OptionChain, expiry: &str) -> Vec<OptionChainRow> {
    let mut rows: Vec<OptionChainRow> = chain
        .records
        .data
        .iter()
        .filter_map(|record| {
            let strike = record.strike_price?;
            let ce = record.call.as_ref()?;
            let pe = record.put.as_ref()?;

            let belongs = |leg: &OptionDetail| {
                let leg_expiry = leg.expiry_date.as_deref().or(record.expiry_date.as_deref());
                leg_expiry == Some(expiry) && leg.strike_price.is_none_or(|k| k == strike)
            };
            if !belongs(ce) || !belongs(pe) {
                return None;
            }

            Some(OptionChainRow {
                strike_price: strike,
                expiry_date: expiry.to_string(),
                call: SideQuote::from_detail(ce)?,
                put: SideQuote::from_detail(pe)?,
            })
        })
        .collect();

    rows.sort_by(|a, b| a.strike_price.total_cmp(&b.strike_price));
    rows
}

/// Strike closest to spot; ties go to the lower strike
pub fn find_atm_strike(rows: &[OptionChainRow], spot: f64) -> Option<f64> {
    let mut closest: Option<f64> = None;
    let mut min_distance = f64::MAX;

    for row in rows {
        let strike = row.strike_price;
        let distance = (strike - spot).abs();

        let lower_tie = distance == min_distance && closest.is_some_and(|c| strike < c);
        if distance < min_distance || lower_tie {
            min_distance = distance;
            closest = Some(strike);
        }
    }

    closest
}

/// Keeps strikes within `[atm - atm_range, atm + atm_range]`
pub fn filter_atm_window(rows: &[OptionChainRow], atm: f64, atm_range: f64) -> Vec<OptionChainRow> {
    rows.iter()
        .filter(|r| (r.strike_price - atm).abs() <= atm_range)
        .cloned()
        .collect()
}

pub fn classify_zone(strike: f64, atm: f64, spot: f64) -> StrikeZone {
    if strike == atm {
        StrikeZone::Atm
    } else if strike < spot {
        StrikeZone::Itm
    } else {
        StrikeZone::Otm
    }
}

/// Years to expiry in whole days elapsed until expiry midnight IST, floored
/// at one day. At 10:00 ten calendar days out this counts nine.
pub fn time_to_expiry_years(expiry: NaiveDate, now: DateTime<FixedOffset>) -> f64 {
    let days = expiry
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(ist()).single())
        .map(|midnight| (midnight - now).num_days())
        .unwrap_or(0)
        .max(1);
    days as f64 / 365.0
}

/// Fills Greeks on both sides of every row. Sides with non-positive IV are
/// left without Greeks.
pub fn attach_greeks(rows: &mut [OptionChainRow], spot: f64, time: f64, rate: f64) {
    for row in rows.iter_mut() {
        let strike = row.strike_price;
        for (side, quote) in [(OptionSide::Call, &mut row.call), (OptionSide::Put, &mut row.put)] {
            quote.greeks = if quote.implied_volatility > 0.0 {
                calculate_greeks(side, spot, strike, time, rate, quote.implied_volatility / 100.0)
            } else {
                None
            };
        }
    }
}

/// Fills each side's missing previous close with the underlying's value
pub fn apply_previous_close(rows: &mut [OptionChainRow], previous_close: f64) {
    for row in rows.iter_mut() {
        row.call.previous_close.get_or_insert(previous_close);
        row.put.previous_close.get_or_insert(previous_close);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OiDominance {
    Call,
    Put,
    Balanced,
}

/// Aggregate change-in-OI for the analyzed window
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OiChangeSummary {
    pub ce_change_lakhs: f64,
    pub pe_change_lakhs: f64,
    pub dominance: OiDominance,
}

pub fn oi_change_summary(rows: &[OptionChainRow]) -> OiChangeSummary {
    let ce: f64 = rows.iter().map(|r| r.call.change_in_oi).sum();
    let pe: f64 = rows.iter().map(|r| r.put.change_in_oi).sum();

    let dominance = if pe > ce {
        OiDominance::Put
    } else if ce > pe {
        OiDominance::Call
    } else {
        OiDominance::Balanced
    };

    OiChangeSummary {
        ce_change_lakhs: round2(ce / 100_000.0),
        pe_change_lakhs: round2(pe / 100_000.0),
        dominance,
    }
}

/// Monday to Friday, 09:00 to 15:40 Asia/Kolkata
pub fn is_market_open(now: DateTime<FixedOffset>) -> bool {
    let local = now.with_timezone(&ist());
    if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    let time = local.time();
    time >= market_open_time() && time <= market_close_time()
}

pub fn is_expiry_day(expiry: NaiveDate, now: DateTime<FixedOffset>) -> bool {
    now.with_timezone(&ist()).date_naive() == expiry
}
