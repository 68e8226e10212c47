//! Black-Scholes Greeks with continuous compounding.
//!
//! Vega and Rho are per 1% move, Theta is per calendar day. Values are
//! rounded to 4 decimals, matching what the bias table shows.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::models::OptionSide;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub vega: f64,
    pub theta: f64,
    pub rho: f64,
}

/// Computes Greeks for one option side.
///
/// `volatility` is a fraction (0.15 = 15%). Returns `None` when any input is
/// non-positive; callers keep the row with its raw market fields only.
pub fn calculate_greeks(
    side: OptionSide,
    spot: f64,
    strike: f64,
    time: f64,
    rate: f64,
    volatility: f64,
) -> Option<Greeks> {
    if volatility <= 0.0 || spot <= 0.0 || strike <= 0.0 || time <= 0.0 {
        return None;
    }

    let sqrt_t = time.sqrt();
    let d1 = ((spot / strike).ln() + (rate + 0.5 * volatility * volatility) * time) / (volatility * sqrt_t);
    let d2 = d1 - volatility * sqrt_t;
    let pdf_d1 = norm_pdf(d1);
    let discount = (-rate * time).exp();

    // Side-independent
    let gamma = pdf_d1 / (spot * volatility * sqrt_t);
    let vega = spot * pdf_d1 * sqrt_t / 100.0;
    let decay = -(spot * pdf_d1 * volatility) / (2.0 * sqrt_t);

    let (delta, theta, rho) = match side {
        OptionSide::Call => (
            norm_cdf(d1),
            (decay - rate * strike * discount * norm_cdf(d2)) / 365.0,
            strike * time * discount * norm_cdf(d2) / 100.0,
        ),
        OptionSide::Put => (
            -norm_cdf(-d1),
            (decay + rate * strike * discount * norm_cdf(-d2)) / 365.0,
            -strike * time * discount * norm_cdf(-d2) / 100.0,
        ),
    };

    Some(Greeks {
        delta: round4(delta),
        gamma: round4(gamma),
        vega: round4(vega),
        theta: round4(theta),
        rho: round4(rho),
    })
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / 2.0_f64.sqrt()))
}

fn norm_pdf(x: f64) -> f64 {
    (-(x * x) / 2.0).exp() / (2.0 * PI).sqrt()
}

// Abramowitz & Stegun 7.1.26
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}
