use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::config::{EXPIRY_BID_DOMINANCE_RATIO, EXPIRY_CHURN_RATIO, EngineConfig};
use super::levels::Level;
use super::models::OptionChainRow;
use super::processor::StrikeZone;
use crate::error::AnalysisError;

/// Directional reading of one Call-vs-Put comparison
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl Bias {
    pub fn sign(&self) -> f64 {
        match self {
            Bias::Bullish => 1.0,
            Bias::Bearish => -1.0,
            Bias::Neutral => 0.0,
        }
    }
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Bias::Bullish => "Bullish",
            Bias::Bearish => "Bearish",
            Bias::Neutral => "Neutral",
        };
        f.write_str(s)
    }
}

/// The seven regular-mode factors. Names double as weight keys.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubBias {
    #[serde(rename = "ChgOI_Bias")]
    ChgOi,
    #[serde(rename = "Volume_Bias")]
    Volume,
    #[serde(rename = "Gamma_Bias")]
    Gamma,
    #[serde(rename = "AskQty_Bias")]
    AskQty,
    #[serde(rename = "BidQty_Bias")]
    BidQty,
    #[serde(rename = "IV_Bias")]
    Iv,
    #[serde(rename = "DVP_Bias")]
    Dvp,
}

impl SubBias {
    pub const ALL: [SubBias; 7] = [
        SubBias::ChgOi,
        SubBias::Volume,
        SubBias::Gamma,
        SubBias::AskQty,
        SubBias::BidQty,
        SubBias::Iv,
        SubBias::Dvp,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SubBias::ChgOi => "ChgOI_Bias",
            SubBias::Volume => "Volume_Bias",
            SubBias::Gamma => "Gamma_Bias",
            SubBias::AskQty => "AskQty_Bias",
            SubBias::BidQty => "BidQty_Bias",
            SubBias::Iv => "IV_Bias",
            SubBias::Dvp => "DVP_Bias",
        }
    }
}

impl fmt::Display for SubBias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SubBias {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        SubBias::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| AnalysisError::Config(format!("unknown sub-bias '{}'", s)))
    }
}

/// Classification table for the Delta-Volume-Price composite
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DvpTable {
    /// Full alignment, plus price+volume agreement against the OI delta
    #[default]
    PriceVolume,
    /// Full alignment only
    Aligned,
}

impl FromStr for DvpTable {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "price_volume" => Ok(DvpTable::PriceVolume),
            "aligned" => Ok(DvpTable::Aligned),
            other => Err(AnalysisError::Config(format!(
                "unknown DVP table '{}', expected price_volume or aligned",
                other
            ))),
        }
    }
}

/// Cutpoints for the verdict label. `strong >= mild > 0`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct VerdictThresholds {
    pub strong: f64,
    pub mild: f64,
}

impl Default for VerdictThresholds {
    fn default() -> Self {
        Self { strong: 4.0, mild: 2.0 }
    }
}

/// Ordered from most bearish to most bullish
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verdict {
    #[serde(rename = "Strong Bearish")]
    StrongBearish,
    Bearish,
    Neutral,
    Bullish,
    #[serde(rename = "Strong Bullish")]
    StrongBullish,
}

impl Verdict {
    pub fn is_bullish(&self) -> bool {
        matches!(self, Verdict::Bullish | Verdict::StrongBullish)
    }

    pub fn is_bearish(&self) -> bool {
        matches!(self, Verdict::Bearish | Verdict::StrongBearish)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::StrongBearish => "Strong Bearish",
            Verdict::Bearish => "Bearish",
            Verdict::Neutral => "Neutral",
            Verdict::Bullish => "Bullish",
            Verdict::StrongBullish => "Strong Bullish",
        };
        f.write_str(s)
    }
}

pub fn verdict_for(score: f64, thresholds: &VerdictThresholds) -> Verdict {
    if score >= thresholds.strong {
        Verdict::StrongBullish
    } else if score >= thresholds.mild {
        Verdict::Bullish
    } else if score <= -thresholds.strong {
        Verdict::StrongBearish
    } else if score <= -thresholds.mild {
        Verdict::Bearish
    } else {
        Verdict::Neutral
    }
}

/// DVP composite from (CE-PE) deltas of price, volume and change-in-OI
pub fn delta_volume_bias(price: f64, volume: f64, chg_oi: f64, table: DvpTable) -> Bias {
    if price > 0.0 && volume > 0.0 && chg_oi > 0.0 {
        return Bias::Bullish;
    }
    if price < 0.0 && volume < 0.0 && chg_oi < 0.0 {
        return Bias::Bearish;
    }

    match table {
        DvpTable::Aligned => Bias::Neutral,
        DvpTable::PriceVolume => {
            if price > 0.0 && volume > 0.0 && chg_oi < 0.0 {
                Bias::Bullish
            } else if price < 0.0 && volume < 0.0 && chg_oi > 0.0 {
                Bias::Bearish
            } else {
                Bias::Neutral
            }
        }
    }
}

fn bullish_if(cond: bool) -> Bias {
    if cond { Bias::Bullish } else { Bias::Bearish }
}

/// Evaluates all seven sub-biases for one paired row
pub fn sub_biases(row: &OptionChainRow, table: DvpTable) -> BTreeMap<SubBias, Bias> {
    let ce = &row.call;
    let pe = &row.put;

    // Skipped Greeks leave the comparison false
    let gamma_bullish = match (&ce.greeks, &pe.greeks) {
        (Some(cg), Some(pg)) => cg.gamma < pg.gamma,
        _ => false,
    };

    let mut biases = BTreeMap::new();
    biases.insert(SubBias::ChgOi, bullish_if(ce.change_in_oi < pe.change_in_oi));
    biases.insert(SubBias::Volume, bullish_if(ce.total_traded_volume < pe.total_traded_volume));
    biases.insert(SubBias::Gamma, bullish_if(gamma_bullish));
    biases.insert(SubBias::AskQty, bullish_if(pe.ask_qty > ce.ask_qty));
    biases.insert(SubBias::BidQty, bullish_if(pe.bid_qty <= ce.bid_qty));
    biases.insert(SubBias::Iv, bullish_if(ce.implied_volatility > pe.implied_volatility));
    biases.insert(
        SubBias::Dvp,
        delta_volume_bias(
            ce.last_price - pe.last_price,
            ce.total_traded_volume - pe.total_traded_volume,
            ce.change_in_oi - pe.change_in_oi,
            table,
        ),
    );
    biases
}

/// Signed weighted sum over every sub-bias present
pub fn weighted_score(weights: &BTreeMap<SubBias, f64>, values: &BTreeMap<SubBias, Bias>) -> f64 {
    values
        .iter()
        .map(|(bias, value)| weights.get(bias).copied().unwrap_or(1.0) * value.sign())
        .sum()
}

/// Per-strike scoring result, shared by both modes.
/// `biases` is empty for expiry-day rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BiasRow {
    #[serde(rename = "Strike")]
    pub strike: f64,
    #[serde(rename = "Zone")]
    pub zone: StrikeZone,
    #[serde(rename = "Level")]
    pub level: Level,
    #[serde(rename = "Biases")]
    pub biases: BTreeMap<SubBias, Bias>,
    #[serde(rename = "BiasScore")]
    pub bias_score: f64,
    #[serde(rename = "Verdict")]
    pub verdict: Verdict,
}

impl BiasRow {
    pub fn bias(&self, sub: SubBias) -> Option<Bias> {
        self.biases.get(&sub).copied()
    }
}

pub fn score_regular_row(
    row: &OptionChainRow,
    zone: StrikeZone,
    level: Level,
    config: &EngineConfig,
) -> BiasRow {
    let biases = sub_biases(row, config.dvp_table);
    let bias_score = weighted_score(&config.weights, &biases);

    BiasRow {
        strike: row.strike_price,
        zone,
        level,
        verdict: verdict_for(bias_score, &config.verdict),
        biases,
        bias_score,
    }
}

/// Expiry-day score for one row. Both sides need a previous close.
pub fn expiry_bias_score(row: &OptionChainRow, spot: f64) -> Result<f64, AnalysisError> {
    let ce = &row.call;
    let pe = &row.put;
    let ce_prev = ce.previous_close.ok_or(AnalysisError::MissingPreviousClose)?;
    let pe_prev = pe.previous_close.ok_or(AnalysisError::MissingPreviousClose)?;

    let mut score = 0.0;

    // OI build-up with price: long build-up vs writing
    if ce.change_in_oi > 0.0 && ce.last_price > ce_prev {
        score += 1.0;
    } else if ce.change_in_oi > 0.0 && ce.last_price < ce_prev {
        score -= 1.0;
    }
    if pe.change_in_oi > 0.0 && pe.last_price > pe_prev {
        score -= 1.0;
    } else if pe.change_in_oi > 0.0 && pe.last_price < pe_prev {
        score += 1.0;
    }

    if ce.bid_qty > EXPIRY_BID_DOMINANCE_RATIO * pe.bid_qty {
        score += 1.0;
    } else if pe.bid_qty > EXPIRY_BID_DOMINANCE_RATIO * ce.bid_qty {
        score -= 1.0;
    }

    // Churn penalties
    if ce.total_traded_volume > EXPIRY_CHURN_RATIO * ce.open_interest {
        score -= 0.5;
    }
    if pe.total_traded_volume > EXPIRY_CHURN_RATIO * pe.open_interest {
        score += 0.5;
    }

    if (ce.last_price - spot).abs() < (pe.last_price - spot).abs() {
        score += 0.5;
    } else {
        score -= 0.5;
    }

    Ok(score)
}

pub fn score_expiry_row(
    row: &OptionChainRow,
    zone: StrikeZone,
    level: Level,
    spot: f64,
    config: &EngineConfig,
) -> Result<BiasRow, AnalysisError> {
    let bias_score = expiry_bias_score(row, spot)?;
    Ok(BiasRow {
        strike: row.strike_price,
        zone,
        level,
        biases: BTreeMap::new(),
        bias_score,
        verdict: verdict_for(bias_score, &config.verdict),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nse::models::SideQuote;

    fn quote(ltp: f64, oi: f64, chg: f64, vol: f64, iv: f64, bid: f64, ask: f64) -> SideQuote {
        SideQuote {
            last_price: ltp,
            previous_close: None,
            open_interest: oi,
            change_in_oi: chg,
            total_traded_volume: vol,
            implied_volatility: iv,
            bid_qty: bid,
            ask_qty: ask,
            greeks: None,
        }
    }

    fn row(call: SideQuote, put: SideQuote) -> OptionChainRow {
        OptionChainRow {
            strike_price: 20000.0,
            expiry_date: "23-Oct-2026".to_string(),
            call,
            put,
        }
    }

    #[test]
    fn test_verdict_cutpoints() {
        let t = VerdictThresholds::default();
        assert_eq!(verdict_for(4.0, &t), Verdict::StrongBullish);
        assert_eq!(verdict_for(3.9, &t), Verdict::Bullish);
        assert_eq!(verdict_for(2.0, &t), Verdict::Bullish);
        assert_eq!(verdict_for(1.9, &t), Verdict::Neutral);
        assert_eq!(verdict_for(0.0, &t), Verdict::Neutral);
        assert_eq!(verdict_for(-1.9, &t), Verdict::Neutral);
        assert_eq!(verdict_for(-2.0, &t), Verdict::Bearish);
        assert_eq!(verdict_for(-4.0, &t), Verdict::StrongBearish);
        assert_eq!(verdict_for(-7.0, &t), Verdict::StrongBearish);
    }

    #[test]
    fn test_verdict_monotone() {
        let t = VerdictThresholds::default();
        let mut prev = verdict_for(-8.0, &t);
        let mut score = -8.0;
        while score <= 8.0 {
            let v = verdict_for(score, &t);
            assert!(v >= prev, "verdict dropped at {}", score);
            prev = v;
            score += 0.25;
        }
    }

    #[test]
    fn test_dvp_tables() {
        assert_eq!(delta_volume_bias(1.0, 1.0, 1.0, DvpTable::PriceVolume), Bias::Bullish);
        assert_eq!(delta_volume_bias(-1.0, -1.0, -1.0, DvpTable::PriceVolume), Bias::Bearish);
        assert_eq!(delta_volume_bias(1.0, 1.0, -1.0, DvpTable::PriceVolume), Bias::Bullish);
        assert_eq!(delta_volume_bias(-1.0, -1.0, 1.0, DvpTable::PriceVolume), Bias::Bearish);
        assert_eq!(delta_volume_bias(1.0, -1.0, 1.0, DvpTable::PriceVolume), Bias::Neutral);
        assert_eq!(delta_volume_bias(0.0, 1.0, 1.0, DvpTable::PriceVolume), Bias::Neutral);

        assert_eq!(delta_volume_bias(1.0, 1.0, 1.0, DvpTable::Aligned), Bias::Bullish);
        assert_eq!(delta_volume_bias(1.0, 1.0, -1.0, DvpTable::Aligned), Bias::Neutral);
    }

    #[test]
    fn test_sub_bias_rules() {
        // CE lighter on OI change and volume, PE heavier on asks
        let r = row(
            quote(120.0, 1000.0, 10.0, 500.0, 14.0, 300.0, 100.0),
            quote(90.0, 1500.0, 40.0, 900.0, 12.0, 200.0, 400.0),
        );
        let b = sub_biases(&r, DvpTable::PriceVolume);

        assert_eq!(b.len(), 7);
        assert_eq!(b[&SubBias::ChgOi], Bias::Bullish);
        assert_eq!(b[&SubBias::Volume], Bias::Bullish);
        assert_eq!(b[&SubBias::Gamma], Bias::Bearish); // no greeks
        assert_eq!(b[&SubBias::AskQty], Bias::Bullish);
        assert_eq!(b[&SubBias::BidQty], Bias::Bullish);
        assert_eq!(b[&SubBias::Iv], Bias::Bullish);
        // price up, volume down, oi down
        assert_eq!(b[&SubBias::Dvp], Bias::Neutral);
    }

    #[test]
    fn test_score_is_weighted_sum_of_seven() {
        let r = row(
            quote(120.0, 1000.0, 10.0, 500.0, 14.0, 300.0, 100.0),
            quote(90.0, 1500.0, 40.0, 900.0, 12.0, 200.0, 400.0),
        );
        let mut config = EngineConfig::default();
        let scored = score_regular_row(&r, StrikeZone::Atm, Level::Support, &config);
        // 5 bullish, 1 bearish, 1 neutral
        assert_eq!(scored.bias_score, 4.0);
        assert_eq!(scored.verdict, Verdict::StrongBullish);

        config.weights.insert(SubBias::ChgOi, 2.0);
        config.weights.insert(SubBias::Gamma, 0.5);
        let scored = score_regular_row(&r, StrikeZone::Atm, Level::Support, &config);
        let expected: f64 = SubBias::ALL
            .iter()
            .map(|b| config.weight(*b) * scored.bias(*b).map(|v| v.sign()).unwrap_or(0.0))
            .sum();
        assert_eq!(scored.bias_score, expected);
        assert_eq!(scored.bias_score, 5.5);
    }

    #[test]
    fn test_expiry_score() {
        let mut call = quote(60.0, 1000.0, 200.0, 1500.0, 10.0, 900.0, 100.0);
        let mut put = quote(20.0, 1000.0, 200.0, 1000.0, 10.0, 300.0, 100.0);
        call.previous_close = Some(50.0); // CE long build-up: +1
        put.previous_close = Some(30.0); // PE writing: +1
        let r = row(call, put);

        // bid dominance +1, no churn, CE premium nearer spot +0.5
        let score = expiry_bias_score(&r, 20000.0).unwrap();
        assert_eq!(score, 3.5);
    }

    #[test]
    fn test_expiry_score_bearish() {
        let mut call = quote(40.0, 1000.0, 200.0, 1000.0, 10.0, 100.0, 100.0);
        let mut put = quote(80.0, 1000.0, 200.0, 1000.0, 10.0, 300.0, 100.0);
        call.previous_close = Some(50.0); // CE writing: -1
        put.previous_close = Some(60.0); // PE long build-up: -1
        let r = row(call, put);

        // PE bid dominance -1, no churn, PE premium nearer spot -0.5
        assert_eq!(expiry_bias_score(&r, 20000.0).unwrap(), -3.5);

        let scored = score_expiry_row(&r, StrikeZone::Atm, Level::Resistance, 20000.0, &EngineConfig::default()).unwrap();
        assert_eq!(scored.bias_score, -3.5);
        assert_eq!(scored.verdict, Verdict::Bearish);
        assert!(scored.biases.is_empty());
    }

    #[test]
    fn test_expiry_score_churn_and_missing_close() {
        let mut call = quote(60.0, 100.0, 0.0, 500.0, 10.0, 100.0, 100.0);
        let mut put = quote(20.0, 100.0, 0.0, 500.0, 10.0, 100.0, 100.0);
        let r = row(call.clone(), put.clone());
        assert!(matches!(
            expiry_bias_score(&r, 20000.0),
            Err(AnalysisError::MissingPreviousClose)
        ));

        call.previous_close = Some(60.0);
        put.previous_close = Some(20.0);
        let r = row(call, put);
        // both churn penalties cancel, CE premium nearer spot
        assert_eq!(expiry_bias_score(&r, 20000.0).unwrap(), 0.5);
    }

    #[test]
    fn test_sub_bias_names_parse() {
        assert_eq!("chgoi_bias".parse::<SubBias>().unwrap(), SubBias::ChgOi);
        assert_eq!("DVP_Bias".parse::<SubBias>().unwrap(), SubBias::Dvp);
        assert!("Theta_Bias".parse::<SubBias>().is_err());
        assert_eq!("PRICE_VOLUME".parse::<DvpTable>().unwrap(), DvpTable::PriceVolume);
    }
}
