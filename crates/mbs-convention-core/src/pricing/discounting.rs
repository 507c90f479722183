//! Discounting of the bond's future cash flows under a periodic yield or a
//! zero curve plus spread, and the root finders that invert them.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::MbsError;
use crate::math::{decimal_exp, iterative_pow, power_decimal};
use crate::types::{Money, Rate, Years};
use crate::MbsResult;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Price tolerance in currency units.
pub const PRICE_TOLERANCE: Decimal = dec!(0.0001);
pub const MAX_ITERATIONS: u32 = 100;

/// Yield search bracket.
pub const YIELD_LOWER: Rate = dec!(-0.5);
pub const YIELD_UPPER: Rate = dec!(5.0);

/// Z-spread search bracket.
pub const SPREAD_LOWER: Rate = dec!(-0.5);
pub const SPREAD_UPPER: Rate = dec!(0.5);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A point on the benchmark zero curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ZeroRatePoint {
    /// Time to maturity in years
    pub maturity: Years,
    /// Continuously compounded zero rate
    pub rate: Rate,
}

/// A bond cash flow positioned in time relative to settlement.
#[derive(Debug, Clone, Copy)]
pub struct TimedCashflow {
    pub period: u32,
    pub amount: Money,
    pub principal: Money,
    /// Fraction of the first future period left after settlement
    pub first_fraction: Decimal,
    /// Whole periods after the first future period
    pub whole_periods: u32,
    /// Time in periods: first_fraction + whole_periods
    pub tau: Decimal,
    /// Time in years
    pub years: Years,
}

/// Result of a root search.
#[derive(Debug, Clone, Copy)]
pub struct Solution {
    pub value: Rate,
    pub iterations: u32,
}

// ---------------------------------------------------------------------------
// Periodic-yield discounting
// ---------------------------------------------------------------------------

/// PV and its first two derivatives with respect to the yield.
#[derive(Debug, Clone, Copy, Default)]
pub struct YieldValuation {
    pub present_value: Money,
    pub first_derivative: Decimal,
    pub second_derivative: Decimal,
    /// Sum of years * PV_k, for Macaulay duration
    pub time_weighted: Decimal,
}

/// PV(y) = sum CF_k * (1 + y/f)^-tau_k, with the discount factor built as
/// v^frac * v^n so that only the fractional part needs exp/ln.
pub fn value_at_yield(cashflows: &[TimedCashflow], yield_rate: Rate, periods_per_year: u32) -> YieldValuation {
    let f = Decimal::from(periods_per_year);
    let base = Decimal::ONE + yield_rate / f;
    if base <= Decimal::ZERO {
        return YieldValuation::default();
    }
    let v = Decimal::ONE / base;

    // every flow shares the stub of the first future period
    let stub_df = match cashflows.first() {
        Some(cf) if cf.first_fraction == Decimal::ONE => v,
        Some(cf) => power_decimal(v, cf.first_fraction),
        None => Decimal::ONE,
    };

    let mut out = YieldValuation::default();
    for cf in cashflows {
        let df = stub_df * iterative_pow(v, cf.whole_periods);
        let pv = cf.amount * df;
        out.present_value += pv;
        out.first_derivative -= cf.tau / f * v * pv;
        out.second_derivative += cf.tau * (cf.tau + Decimal::ONE) / (f * f) * v * v * pv;
        out.time_weighted += cf.years * pv;
    }
    out
}

/// Solve PV(y) = target for y with Newton steps kept inside a shrinking
/// bisection bracket.
pub fn solve_yield(cashflows: &[TimedCashflow], target: Money, periods_per_year: u32) -> MbsResult<Solution> {
    let pv = |y: Rate| value_at_yield(cashflows, y, periods_per_year);
    safeguarded_newton("yield_from_price", target, YIELD_LOWER, YIELD_UPPER, dec!(0.05), |y| {
        let v = pv(y);
        (v.present_value, v.first_derivative)
    })
}

// ---------------------------------------------------------------------------
// Curve discounting
// ---------------------------------------------------------------------------

/// Linear interpolation on the zero curve, flat beyond both ends.
pub fn interpolate_zero_rate(zero_rates: &[ZeroRatePoint], maturity: Years) -> Rate {
    let (first, last) = match (zero_rates.first(), zero_rates.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Decimal::ZERO,
    };
    if maturity <= first.maturity {
        return first.rate;
    }
    if maturity >= last.maturity {
        return last.rate;
    }

    for window in zero_rates.windows(2) {
        let p0 = &window[0];
        let p1 = &window[1];
        if maturity >= p0.maturity && maturity <= p1.maturity {
            let span = p1.maturity - p0.maturity;
            if span.is_zero() {
                return p0.rate;
            }
            let frac = (maturity - p0.maturity) / span;
            return p0.rate + frac * (p1.rate - p0.rate);
        }
    }

    last.rate
}

/// PV(s) = sum CF_k * exp(-(z(t_k) + s) * t_k) and dPV/ds.
///
/// Deeply negative curve rates push the discount factor past the Decimal
/// range; the sums then saturate and the solvers report no convergence.
pub fn value_on_curve(cashflows: &[TimedCashflow], zero_rates: &[ZeroRatePoint], spread: Rate) -> (Money, Decimal) {
    let mut pv = Decimal::ZERO;
    let mut derivative = Decimal::ZERO;
    for cf in cashflows {
        let z = interpolate_zero_rate(zero_rates, cf.years);
        let df = decimal_exp(-(z + spread).saturating_mul(cf.years));
        let leg = cf.amount.checked_mul(df).unwrap_or(Decimal::MAX);
        pv = pv.saturating_add(leg);
        derivative = derivative.saturating_sub(cf.years.saturating_mul(leg));
    }
    (pv, derivative)
}

/// Constant spread over the zero curve that reproduces `target`.
pub fn solve_z_spread(cashflows: &[TimedCashflow], zero_rates: &[ZeroRatePoint], target: Money) -> MbsResult<Solution> {
    safeguarded_newton("z_spread", target, SPREAD_LOWER, SPREAD_UPPER, Decimal::ZERO, |s| {
        value_on_curve(cashflows, zero_rates, s)
    })
}

/// Root search for a price function decreasing in its argument.
fn safeguarded_newton<F>(
    function: &str,
    target: Money,
    lower: Rate,
    upper: Rate,
    guess: Rate,
    value: F,
) -> MbsResult<Solution>
where
    F: Fn(Rate) -> (Money, Decimal),
{
    let mut lo = lower;
    let mut hi = upper;
    let (pv_lo, _) = value(lo);
    let (pv_hi, _) = value(hi);
    if (pv_lo > target) == (pv_hi > target) {
        return Err(MbsError::NoConvergence {
            function: function.into(),
            iterations: 0,
            last_delta: (pv_lo - target).abs().min((pv_hi - target).abs()),
        });
    }

    let mut x = guess.max(lo).min(hi);
    let mut last_delta = Decimal::ZERO;
    for iteration in 1..=MAX_ITERATIONS {
        let (pv, derivative) = value(x);
        let delta = pv - target;
        last_delta = delta;
        if delta.abs() < PRICE_TOLERANCE {
            return Ok(Solution {
                value: x,
                iterations: iteration,
            });
        }

        // price falls as the rate rises
        if delta > Decimal::ZERO {
            lo = x;
        } else {
            hi = x;
        }

        let newton = if derivative.is_zero() {
            None
        } else {
            Some(x - delta / derivative)
        };
        x = match newton {
            Some(candidate) if candidate > lo && candidate < hi => candidate,
            _ => (lo + hi) / dec!(2),
        };
    }

    Err(MbsError::NoConvergence {
        function: function.into(),
        iterations: MAX_ITERATIONS,
        last_delta,
    })
}
