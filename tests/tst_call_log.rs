use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, TimeZone};
use nse_bias_engine::nse::call_log::summarize;
use nse_bias_engine::nse::config::ist;
use nse_bias_engine::nse::{Call, CallStatus, OptionSide, update_calls};

fn at(minute: u32) -> DateTime<FixedOffset> {
    ist().with_ymd_and_hms(2026, 10, 19, 11, minute, 0).unwrap()
}

fn ce_call(strike: f64) -> Call {
    let mut targets = BTreeMap::new();
    targets.insert("T1".to_string(), 110.0);
    Call::new(OptionSide::Call, strike, targets, 90.0, at(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spot_sequence_resolves_each_call_once() {
        let mut calls = vec![ce_call(100.0), ce_call(105.0)];

        let transitions = update_calls(&mut calls, 110.0, at(1));
        assert_eq!(transitions.len(), 2);
        assert!(calls.iter().all(|c| c.status == CallStatus::HitTarget));

        // Terminal calls ignore later prices
        assert!(update_calls(&mut calls, 89.0, at(2)).is_empty());
        assert!(update_calls(&mut calls, 100.0, at(3)).is_empty());
        assert!(calls.iter().all(|c| c.status == CallStatus::HitTarget));
        assert!(calls.iter().all(|c| c.exit_price == Some(110.0) && c.exit_time == Some(at(1))));
    }

    #[test]
    fn test_stoploss_then_frozen() {
        let mut calls = vec![ce_call(100.0)];

        assert!(update_calls(&mut calls, 100.0, at(1)).is_empty());
        assert_eq!(calls[0].status, CallStatus::Active);

        let transitions = update_calls(&mut calls, 89.0, at(2));
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].status, CallStatus::HitStoploss);
        assert_eq!(transitions[0].exit_price, 89.0);

        assert!(update_calls(&mut calls, 110.0, at(3)).is_empty());
        assert_eq!(calls[0].status, CallStatus::HitStoploss);
    }

    #[test]
    fn test_summary_over_mixed_log() {
        let mut calls = vec![ce_call(100.0), ce_call(101.0), ce_call(102.0)];
        calls[0].update(111.0, at(1));
        calls[1].update(80.0, at(1));

        let summary = summarize(&calls);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.active, 1);
        assert_eq!(summary.hit_target, 1);
        assert_eq!(summary.hit_stoploss, 1);
        assert_eq!(summary.hit_rate, Some(50.0));
    }
}
