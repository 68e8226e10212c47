#![allow(dead_code)]

use chrono::{DateTime, FixedOffset, TimeZone};
use nse_bias_engine::nse::config::ist;
use nse_bias_engine::nse::models::{OptionData, OptionDetail, Records};
use nse_bias_engine::nse::{EngineConfig, Instrument, InstrumentProfile, OptionChain, SubBias};

pub const EXPIRY: &str = "29-Oct-2026";

/// 2026-10-19 is a Monday, ten days before EXPIRY
pub fn monday(hour: u32, minute: u32) -> DateTime<FixedOffset> {
    ist().with_ymd_and_hms(2026, 10, 19, hour, minute, 0).unwrap()
}

pub fn expiry_day(hour: u32, minute: u32) -> DateTime<FixedOffset> {
    ist().with_ymd_and_hms(2026, 10, 29, hour, minute, 0).unwrap()
}

pub struct Side {
    pub ltp: f64,
    pub oi: f64,
    pub chg_oi: f64,
    pub volume: f64,
    pub iv: f64,
    pub bid: f64,
    pub ask: f64,
}

impl Side {
    pub fn detail(&self, strike: f64) -> OptionDetail {
        OptionDetail {
            strike_price: Some(strike),
            expiry_date: Some(EXPIRY.to_string()),
            last_price: Some(self.ltp),
            previous_close: None,
            open_interest: Some(self.oi),
            change_in_oi: Some(self.chg_oi),
            total_traded_volume: Some(self.volume),
            implied_volatility: Some(self.iv),
            bid_qty: Some(self.bid),
            ask_qty: Some(self.ask),
        }
    }
}

/// CE leg that loses every quantity comparison to `put_leg`
pub fn call_leg(ltp: f64, oi: f64) -> Side {
    Side { ltp, oi, chg_oi: 100.0, volume: 1000.0, iv: 15.0, bid: 80.0, ask: 50.0 }
}

pub fn put_leg(ltp: f64, oi: f64) -> Side {
    Side { ltp, oi, chg_oi: 200.0, volume: 2000.0, iv: 15.0, bid: 50.0, ask: 80.0 }
}

pub fn chain(spot: f64, strikes: Vec<(f64, Side, Side)>) -> OptionChain {
    let data = strikes
        .into_iter()
        .map(|(strike, ce, pe)| OptionData {
            strike_price: Some(strike),
            expiry_date: Some(EXPIRY.to_string()),
            call: Some(ce.detail(strike)),
            put: Some(pe.detail(strike)),
        })
        .collect();

    OptionChain {
        records: Records {
            timestamp: None,
            underlying_value: Some(spot),
            expiry_dates: vec![EXPIRY.to_string(), "26-Nov-2026".to_string()],
            data,
        },
    }
}

/// Spot 20000, ATM 20000, a Support strike at 19950 (PE/CE OI = 1.2) and a
/// far strike outside the ATM window.
///
/// Each scored row carries ChgOI, Volume, AskQty, BidQty bullish, Gamma and
/// IV bearish (equal IV on both legs) and a neutral DVP.
pub fn bullish_chain(spot: f64) -> OptionChain {
    chain(
        spot,
        vec![
            (19950.0, call_leg(120.0, 1000.0), put_leg(70.0, 1200.0)),
            (20000.0, call_leg(95.0, 1000.0), put_leg(85.0, 1000.0)),
            (20400.0, call_leg(10.0, 5000.0), put_leg(400.0, 100.0)),
        ],
    )
}

/// Gamma weighted at 0.75: each scored row sums to 2.25 (Bullish) and the
/// two rows inside the scoring window total 4.5.
pub fn bullish_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.weights.insert(SubBias::Gamma, 0.75);
    config
        .profiles
        .insert(Instrument::Nifty, InstrumentProfile::new(75, 50.0, 200.0));
    config
}
