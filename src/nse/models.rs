use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::greeks::Greeks;
use crate::error::AnalysisError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SecurityType {
    Equity,
    Indices,
}

/// Instruments tracked by the engine. Identity is fixed; the numeric profile
/// for each lives in `config::InstrumentProfile` and can be overridden.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Instrument {
    #[serde(rename = "NIFTY")]
    Nifty,
    #[serde(rename = "BANKNIFTY")]
    BankNifty,
    #[serde(rename = "NIFTY IT")]
    NiftyIt,
    #[serde(rename = "NIFTY AUTO")]
    NiftyAuto,
    #[serde(rename = "TCS")]
    Tcs,
    #[serde(rename = "RELIANCE")]
    Reliance,
    #[serde(rename = "HDFCBANK")]
    HdfcBank,
}

impl Instrument {
    pub const ALL: [Instrument; 7] = [
        Instrument::Nifty,
        Instrument::BankNifty,
        Instrument::NiftyIt,
        Instrument::NiftyAuto,
        Instrument::Tcs,
        Instrument::Reliance,
        Instrument::HdfcBank,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Instrument::Nifty => "NIFTY",
            Instrument::BankNifty => "BANKNIFTY",
            Instrument::NiftyIt => "NIFTY IT",
            Instrument::NiftyAuto => "NIFTY AUTO",
            Instrument::Tcs => "TCS",
            Instrument::Reliance => "RELIANCE",
            Instrument::HdfcBank => "HDFCBANK",
        }
    }

    pub fn security_type(&self) -> SecurityType {
        match self {
            Instrument::Nifty | Instrument::BankNifty | Instrument::NiftyIt | Instrument::NiftyAuto => {
                SecurityType::Indices
            }
            Instrument::Tcs | Instrument::Reliance | Instrument::HdfcBank => SecurityType::Equity,
        }
    }

    /// Symbol as used in environment variable names ("NIFTY IT" -> "NIFTY_IT")
    pub fn env_key(&self) -> String {
        self.symbol().replace(' ', "_")
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Instrument {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('_', " ").to_uppercase();
        Instrument::ALL
            .into_iter()
            .find(|i| i.symbol() == wanted)
            .ok_or_else(|| AnalysisError::UnknownInstrument(s.to_string()))
    }
}

/// Call or put side of a strike
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OptionSide {
    #[serde(rename = "CE")]
    Call,
    #[serde(rename = "PE")]
    Put,
}

impl OptionSide {
    pub fn code(&self) -> &'static str {
        match self {
            OptionSide::Call => "CE",
            OptionSide::Put => "PE",
        }
    }
}

impl fmt::Display for OptionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// -----------------------------------------------
// RAW SNAPSHOT (as returned by the option-chain API)
// -----------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionChain {
    pub records: Records,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Records {
    #[serde(default)]
    pub timestamp: Option<String>,

    #[serde(rename = "underlyingValue")]
    pub underlying_value: Option<f64>,

    #[serde(rename = "expiryDates", default)]
    pub expiry_dates: Vec<String>,

    #[serde(default)]
    pub data: Vec<OptionData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionData {
    #[serde(rename = "strikePrice")]
    pub strike_price: Option<f64>,

    #[serde(rename = "expiryDate", default)]
    pub expiry_date: Option<String>,

    #[serde(rename = "CE", default)]
    pub call: Option<OptionDetail>,

    #[serde(rename = "PE", default)]
    pub put: Option<OptionDetail>,
}

/// One side (CE or PE) of a strike as published. Every numeric field is
/// optional; rows with a missing required field are dropped during pairing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionDetail {
    #[serde(rename = "strikePrice", default)]
    pub strike_price: Option<f64>,

    #[serde(rename = "expiryDate", default)]
    pub expiry_date: Option<String>,

    #[serde(rename = "lastPrice", default)]
    pub last_price: Option<f64>,

    #[serde(rename = "previousClose", default)]
    pub previous_close: Option<f64>,

    #[serde(rename = "openInterest", default)]
    pub open_interest: Option<f64>,

    #[serde(rename = "changeinOpenInterest", default)]
    pub change_in_oi: Option<f64>,

    #[serde(rename = "totalTradedVolume", default)]
    pub total_traded_volume: Option<f64>,

    #[serde(rename = "impliedVolatility", default)]
    pub implied_volatility: Option<f64>,

    #[serde(rename = "bidQty", default)]
    pub bid_qty: Option<f64>,

    #[serde(rename = "askQty", default)]
    pub ask_qty: Option<f64>,
}

// -----------------------------------------------
// PAIRED ROWS
// -----------------------------------------------

/// Market fields of one side after validation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SideQuote {
    pub last_price: f64,
    pub previous_close: Option<f64>,
    pub open_interest: f64,
    pub change_in_oi: f64,
    pub total_traded_volume: f64,
    /// Percent, as published (18.5 means 18.5%)
    pub implied_volatility: f64,
    pub bid_qty: f64,
    pub ask_qty: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeks: Option<Greeks>,
}

impl SideQuote {
    /// Validates a raw side. `None` when any required field is missing.
    pub fn from_detail(detail: &OptionDetail) -> Option<Self> {
        Some(Self {
            last_price: detail.last_price?,
            previous_close: detail.previous_close,
            open_interest: detail.open_interest?,
            change_in_oi: detail.change_in_oi?,
            total_traded_volume: detail.total_traded_volume?,
            implied_volatility: detail.implied_volatility?,
            bid_qty: detail.bid_qty?,
            ask_qty: detail.ask_qty?,
            greeks: None,
        })
    }
}

/// One strike with both sides for the same expiry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptionChainRow {
    #[serde(rename = "strikePrice")]
    pub strike_price: f64,
    #[serde(rename = "expiryDate")]
    pub expiry_date: String,
    #[serde(rename = "CE")]
    pub call: SideQuote,
    #[serde(rename = "PE")]
    pub put: SideQuote,
}

impl OptionChainRow {
    pub fn side(&self, side: OptionSide) -> &SideQuote {
        match side {
            OptionSide::Call => &self.call,
            OptionSide::Put => &self.put,
        }
    }
}
