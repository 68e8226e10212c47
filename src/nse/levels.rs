use serde::{Deserialize, Serialize};
use std::fmt;

use super::models::OptionChainRow;

/// Open-interest skew classification of a strike
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Level {
    Support,
    Resistance,
    Neutral,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Support => "Support",
            Level::Resistance => "Resistance",
            Level::Neutral => "Neutral",
        };
        f.write_str(s)
    }
}

/// Support when PE OI dominates CE OI by `multiplier`, Resistance when CE OI
/// dominates PE OI, otherwise Neutral. Checked in that order.
pub fn classify_level(ce_oi: f64, pe_oi: f64, multiplier: f64) -> Level {
    if pe_oi > multiplier * ce_oi {
        Level::Support
    } else if ce_oi > multiplier * pe_oi {
        Level::Resistance
    } else {
        Level::Neutral
    }
}

pub fn determine_level(row: &OptionChainRow, multiplier: f64) -> Level {
    classify_level(row.call.open_interest, row.put.open_interest, multiplier)
}

/// `|strike - spot| <= zone_size`
pub fn is_in_zone(spot: f64, strike: f64, zone_size: f64) -> bool {
    (strike - spot).abs() <= zone_size
}

/// Price band; both bounds `None` when no strike qualified
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct ZonePair {
    pub low: Option<f64>,
    pub high: Option<f64>,
}

impl ZonePair {
    pub const EMPTY: ZonePair = ZonePair { low: None, high: None };

    fn from_strikes(strikes: &[f64]) -> Self {
        let low = strikes.iter().copied().reduce(f64::min);
        let high = strikes.iter().copied().reduce(f64::max);
        Self { low, high }
    }
}

impl fmt::Display for ZonePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.low, self.high) {
            (Some(low), Some(high)) => write!(f, "{} to {}", low, high),
            _ => f.write_str("N/A"),
        }
    }
}

/// Strikes nearest to spot on each side, per level
const ZONE_DEPTH: usize = 2;

/// Derives (support, resistance) zones from classified strikes.
///
/// Support uses the two Support strikes at or below spot closest to it;
/// Resistance the two Resistance strikes at or above spot. One qualifying
/// strike gives a degenerate `(x, x)` band, none gives `ZonePair::EMPTY`.
pub fn support_resistance_zones<I>(levels: I, spot: f64) -> (ZonePair, ZonePair)
where
    I: IntoIterator<Item = (f64, Level)>,
{
    let mut supports = Vec::new();
    let mut resistances = Vec::new();

    for (strike, level) in levels {
        match level {
            Level::Support if strike <= spot => supports.push(strike),
            Level::Resistance if strike >= spot => resistances.push(strike),
            _ => {}
        }
    }

    supports.sort_by(|a, b| b.total_cmp(a));
    supports.truncate(ZONE_DEPTH);

    resistances.sort_by(|a, b| a.total_cmp(b));
    resistances.truncate(ZONE_DEPTH);

    (
        ZonePair::from_strikes(&supports),
        ZonePair::from_strikes(&resistances),
    )
}
