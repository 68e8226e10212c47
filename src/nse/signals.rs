use serde::{Deserialize, Serialize};
use std::fmt;

use super::bias::{BiasRow, Verdict};
use super::config::EngineConfig;
use super::levels::{Level, is_in_zone};
use super::models::{OptionChainRow, OptionSide};
use super::processor::round2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SignalType {
    #[serde(rename = "BUY CALL")]
    BuyCall,
    #[serde(rename = "BUY PUT")]
    BuyPut,
}

impl SignalType {
    pub fn side(&self) -> OptionSide {
        match self {
            SignalType::BuyCall => OptionSide::Call,
            SignalType::BuyPut => OptionSide::Put,
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalType::BuyCall => f.write_str("BUY CALL"),
            SignalType::BuyPut => f.write_str("BUY PUT"),
        }
    }
}

/// One suggested trade. Prices are option premiums.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub strike: f64,
    pub score: f64,
    pub ltp: f64,
    pub target: f64,
    #[serde(rename = "stopLoss")]
    pub stop_loss: f64,
    pub reason: String,
}

impl Signal {
    pub fn side(&self) -> OptionSide {
        self.signal_type.side()
    }
}

/// Inputs shared by every row in a regular-mode scan
#[derive(Debug, Clone, Copy)]
pub struct RegularContext {
    pub spot: f64,
    pub total_score: f64,
    pub market_view: Verdict,
    pub zone_size: f64,
}

fn row_for(rows: &[OptionChainRow], strike: f64) -> Option<&OptionChainRow> {
    rows.iter().find(|r| r.strike_price == strike)
}

/// First in-zone strike, ascending, whose level agrees with the aggregate
/// score and market view. At most one signal.
pub fn regular_entry_signal(
    rows: &[OptionChainRow],
    bias_rows: &[BiasRow],
    ctx: &RegularContext,
    config: &EngineConfig,
) -> Option<Signal> {
    let threshold = config.score_threshold_regular;

    let mut ordered: Vec<&BiasRow> = bias_rows.iter().collect();
    ordered.sort_by(|a, b| a.strike.total_cmp(&b.strike));

    ordered.into_iter().find_map(|bias_row| {
        if !is_in_zone(ctx.spot, bias_row.strike, ctx.zone_size) {
            return None;
        }

        let signal_type = match bias_row.level {
            Level::Support if ctx.total_score >= threshold && ctx.market_view.is_bullish() => {
                SignalType::BuyCall
            }
            Level::Resistance if ctx.total_score <= -threshold && ctx.market_view.is_bearish() => {
                SignalType::BuyPut
            }
            _ => return None,
        };

        let quote = row_for(rows, bias_row.strike)?.side(signal_type.side());
        let ltp = quote.last_price;

        Some(Signal {
            signal_type,
            strike: bias_row.strike,
            score: ctx.total_score,
            ltp,
            target: round2(ltp * (1.0 + quote.implied_volatility / 100.0)),
            stop_loss: round2(ltp * config.stop_loss_fraction),
            reason: format!(
                "{} zone, total bias {:.2}, market view {}",
                bias_row.level, ctx.total_score, ctx.market_view
            ),
        })
    })
}

/// Every Support/Resistance strike clearing the expiry threshold, ascending
pub fn expiry_entry_signals(
    rows: &[OptionChainRow],
    bias_rows: &[BiasRow],
    config: &EngineConfig,
) -> Vec<Signal> {
    let threshold = config.score_threshold_expiry;

    let mut ordered: Vec<&BiasRow> = bias_rows.iter().collect();
    ordered.sort_by(|a, b| a.strike.total_cmp(&b.strike));

    ordered
        .into_iter()
        .filter_map(|bias_row| {
            let signal_type = match bias_row.level {
                Level::Support if bias_row.bias_score >= threshold => SignalType::BuyCall,
                Level::Resistance if bias_row.bias_score <= -threshold => SignalType::BuyPut,
                _ => return None,
            };

            let ltp = row_for(rows, bias_row.strike)?
                .side(signal_type.side())
                .last_price;

            Some(Signal {
                signal_type,
                strike: bias_row.strike,
                score: bias_row.bias_score,
                ltp,
                target: round2(ltp * config.expiry_target_multiplier),
                stop_loss: round2(ltp * config.stop_loss_fraction),
                reason: format!("Expiry day {}, score {:.2}", bias_row.level, bias_row.bias_score),
            })
        })
        .collect()
}
