use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::discounting::{value_at_yield, TimedCashflow};
use crate::types::{Money, Rate, Years};

/// Risk measures evaluated at a solved yield.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub macaulay_duration: Years,
    pub modified_duration: Decimal,
    pub convexity: Decimal,
    /// Change in value for a one basis point fall in yield, in currency
    pub dv01: Money,
}

/// Principal-weighted average time to principal receipt, in years.
pub fn weighted_average_life(cashflows: &[TimedCashflow]) -> Years {
    let total: Money = cashflows.iter().map(|cf| cf.principal).sum();
    if total <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    cashflows.iter().map(|cf| cf.principal * cf.years).sum::<Decimal>() / total
}

/// Macaulay and modified duration, convexity and DV01 at `yield_rate`.
pub fn risk_metrics(cashflows: &[TimedCashflow], yield_rate: Rate, periods_per_year: u32) -> RiskMetrics {
    let valuation = value_at_yield(cashflows, yield_rate, periods_per_year);
    let pv = valuation.present_value;
    if pv <= Decimal::ZERO {
        return RiskMetrics::default();
    }
    let modified_duration = -valuation.first_derivative / pv;
    RiskMetrics {
        macaulay_duration: valuation.time_weighted / pv,
        modified_duration,
        convexity: valuation.second_derivative / pv,
        dv01: modified_duration * pv * dec!(0.0001),
    }
}
