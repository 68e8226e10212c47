use std::collections::BTreeMap;

use nse_bias_engine::nse::bias::{score_regular_row, sub_biases, verdict_for, weighted_score};
use nse_bias_engine::nse::models::{OptionChainRow, SideQuote};
use nse_bias_engine::nse::processor::StrikeZone;
use nse_bias_engine::nse::{Bias, DvpTable, EngineConfig, Level, SubBias, Verdict, VerdictThresholds};

fn quote(ltp: f64, chg: f64, vol: f64, iv: f64, bid: f64, ask: f64) -> SideQuote {
    SideQuote {
        last_price: ltp,
        previous_close: None,
        open_interest: 1000.0,
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
        expiry_date: "29-Oct-2026".to_string(),
        call,
        put,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_is_weighted_sum_of_sub_biases() {
        let rows = [
            row(quote(100.0, 10.0, 100.0, 20.0, 50.0, 10.0), quote(80.0, 30.0, 300.0, 15.0, 40.0, 60.0)),
            row(quote(50.0, 90.0, 900.0, 12.0, 10.0, 90.0), quote(80.0, 30.0, 300.0, 15.0, 40.0, 60.0)),
            row(quote(60.0, 30.0, 300.0, 15.0, 40.0, 60.0), quote(60.0, 30.0, 300.0, 15.0, 40.0, 60.0)),
        ];

        let mut config = EngineConfig::default();
        let weights = [0.5, 1.5, 2.0, 0.25, 1.0, 3.0, 0.75];
        for (bias, w) in SubBias::ALL.into_iter().zip(weights) {
            config.weights.insert(bias, w);
        }

        for r in &rows {
            let scored = score_regular_row(r, StrikeZone::Atm, Level::Neutral, &config);
            assert_eq!(scored.biases.len(), 7);

            let expected: f64 = SubBias::ALL
                .into_iter()
                .map(|b| config.weight(b) * scored.bias(b).unwrap().sign())
                .sum();
            assert!((scored.bias_score - expected).abs() < 1e-9);
            assert_eq!(scored.verdict, verdict_for(scored.bias_score, &config.verdict));
        }
    }

    #[test]
    fn test_sub_bias_directions() {
        // CE quieter than PE everywhere, CE richer on IV and bid
        let r = row(quote(100.0, 10.0, 100.0, 20.0, 50.0, 10.0), quote(80.0, 30.0, 300.0, 15.0, 40.0, 60.0));
        let biases = sub_biases(&r, DvpTable::PriceVolume);

        assert_eq!(biases[&SubBias::ChgOi], Bias::Bullish);
        assert_eq!(biases[&SubBias::Volume], Bias::Bullish);
        assert_eq!(biases[&SubBias::AskQty], Bias::Bullish);
        assert_eq!(biases[&SubBias::BidQty], Bias::Bullish);
        assert_eq!(biases[&SubBias::Iv], Bias::Bullish);
        // no Greeks attached
        assert_eq!(biases[&SubBias::Gamma], Bias::Bearish);
        assert_eq!(biases[&SubBias::Dvp], Bias::Neutral);

        let unit: BTreeMap<SubBias, f64> = SubBias::ALL.into_iter().map(|b| (b, 1.0)).collect();
        assert_eq!(weighted_score(&unit, &biases), 4.0);
    }

    #[test]
    fn test_verdict_is_monotone() {
        let thresholds = VerdictThresholds::default();
        let mut previous = Verdict::StrongBearish;
        let mut score = -8.0;
        while score <= 8.0 {
            let verdict = verdict_for(score, &thresholds);
            assert!(verdict >= previous, "score {} gave {} after {}", score, verdict, previous);
            previous = verdict;
            score += 0.25;
        }
        assert_eq!(previous, Verdict::StrongBullish);
    }

    #[test]
    fn test_verdict_labels() {
        let thresholds = VerdictThresholds::default();
        assert_eq!(verdict_for(4.5, &thresholds).to_string(), "Strong Bullish");
        assert_eq!(verdict_for(2.0, &thresholds).to_string(), "Bullish");
        assert_eq!(verdict_for(0.0, &thresholds).to_string(), "Neutral");
        assert_eq!(verdict_for(-2.0, &thresholds).to_string(), "Bearish");
        assert_eq!(verdict_for(-4.0, &thresholds).to_string(), "Strong Bearish");
    }
}
