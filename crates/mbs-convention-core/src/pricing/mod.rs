//! Bond valuation: price, yield, spread and risk metrics from the bond
//! schedule.

pub mod discounting;
pub mod metrics;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug_span, warn};

use crate::convention::params::IssueParameters;
use crate::day_count::DayCountConvention;
use crate::error::MbsError;
use crate::mbs::BondSchedule;
use crate::types::{round_money, Money, Rate, Years};
use crate::MbsResult;

pub use discounting::{
    interpolate_zero_rate, solve_yield, solve_z_spread, value_at_yield, value_on_curve,
    TimedCashflow, ZeroRatePoint, PRICE_TOLERANCE,
};
pub use metrics::{risk_metrics, weighted_average_life, RiskMetrics};

const PRICE_DP: u32 = 6;
const RATE_DP: u32 = 8;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How future cash flows are discounted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DiscountAssumption {
    /// Periodically compounded yield at the payment frequency
    FlatYield { yield_rate: Rate },
    /// Constant spread over the benchmark zero curve
    CurveSpread { spread_bps: Decimal },
    /// Clean price in percent of the outstanding balance
    TargetPrice { clean_price: Decimal },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccruedConvention {
    /// Coupon accrued since the last payment date
    #[default]
    FromLastPayment,
    /// Trade flat: no accrued interest
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingInput {
    pub settlement_date: NaiveDate,
    pub discount: DiscountAssumption,
    /// Continuously compounded zero curve; required for `CurveSpread`
    #[serde(default)]
    pub benchmark_curve: Option<Vec<ZeroRatePoint>>,
    /// Must match the cash-flow day count when given
    #[serde(default)]
    pub day_count: Option<DayCountConvention>,
    #[serde(default)]
    pub accrued: AccruedConvention,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingResult {
    pub settlement_date: NaiveDate,
    /// Bond balance outstanding at settlement
    pub outstanding_balance: Money,
    /// Percent of outstanding balance
    pub dirty_price: Decimal,
    pub clean_price: Decimal,
    pub accrued_interest: Money,
    pub present_value: Money,
    pub yield_to_maturity: Rate,
    pub weighted_average_life: Years,
    pub macaulay_duration: Years,
    pub modified_duration: Decimal,
    pub convexity: Decimal,
    pub dv01: Money,
    /// Spread over the benchmark curve, when a curve is supplied
    pub z_spread_bps: Option<Decimal>,
    /// Root-finder iterations spent
    pub iterations: u32,
    #[serde(default)]
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

/// Value the bond cash flows remaining after settlement.
pub fn price_bond(
    params: &IssueParameters,
    bond: &BondSchedule,
    input: &PricingInput,
) -> MbsResult<PricingResult> {
    validate_pricing_input(params, input)?;
    let _span = debug_span!("pricing", issue = %params.issue_id, settlement = %input.settlement_date).entered();

    let periods_per_year = params.payment_frequency;
    let schedule = future_cashflows(params, bond, input.settlement_date)?;
    let cashflows = &schedule.cashflows;
    let outstanding = schedule.outstanding_balance;
    let curve = input.benchmark_curve.as_deref();

    let accrued_interest = match input.accrued {
        AccruedConvention::FromLastPayment => round_money(schedule.accrued_interest),
        AccruedConvention::None => Decimal::ZERO,
    };
    let accrued_pct = percent_of(accrued_interest, outstanding);

    let mut iterations = 0;
    let (present_value, yield_rate) = match &input.discount {
        DiscountAssumption::FlatYield { yield_rate } => {
            let pv = value_at_yield(cashflows, *yield_rate, periods_per_year).present_value;
            (pv, *yield_rate)
        }
        DiscountAssumption::CurveSpread { spread_bps } => {
            let zero_rates = curve.ok_or_else(|| {
                MbsError::config(
                    "pricing.benchmark_curve",
                    "A benchmark curve is required for curve-spread discounting",
                )
            })?;
            let (pv, _) = value_on_curve(cashflows, zero_rates, *spread_bps / dec!(10000));
            let solved = solve_yield(cashflows, pv, periods_per_year)?;
            iterations += solved.iterations;
            (pv, solved.value)
        }
        DiscountAssumption::TargetPrice { clean_price } => {
            let pv = (*clean_price + accrued_pct) * outstanding / dec!(100);
            let solved = solve_yield(cashflows, pv, periods_per_year)?;
            iterations += solved.iterations;
            (pv, solved.value)
        }
    };

    // The z-spread is reported alongside the yield; failing to bracket it
    // leaves the price intact.
    let mut warnings = Vec::new();
    let z_spread_bps = match (&input.discount, curve) {
        (DiscountAssumption::CurveSpread { spread_bps }, _) => Some(*spread_bps),
        (_, Some(zero_rates)) => match solve_z_spread(cashflows, zero_rates, present_value) {
            Ok(solved) => {
                iterations += solved.iterations;
                Some((solved.value * dec!(10000)).round_dp(4))
            }
            Err(MbsError::NoConvergence { .. }) => {
                let msg = format!(
                    "Z-spread not found for present value {} against the benchmark curve",
                    round_money(present_value)
                );
                warn!(issue = %params.issue_id, "{msg}");
                warnings.push(msg);
                None
            }
            Err(e) => return Err(e),
        },
        (_, None) => None,
    };

    let risk = risk_metrics(cashflows, yield_rate, periods_per_year);
    let dirty_price = percent_of(present_value, outstanding);

    Ok(PricingResult {
        settlement_date: input.settlement_date,
        outstanding_balance: outstanding,
        dirty_price: dirty_price.round_dp(PRICE_DP),
        clean_price: (dirty_price - accrued_pct).round_dp(PRICE_DP),
        accrued_interest,
        present_value: round_money(present_value),
        yield_to_maturity: yield_rate.round_dp(RATE_DP),
        weighted_average_life: weighted_average_life(cashflows).round_dp(PRICE_DP),
        macaulay_duration: risk.macaulay_duration.round_dp(PRICE_DP),
        modified_duration: risk.modified_duration.round_dp(PRICE_DP),
        convexity: risk.convexity.round_dp(PRICE_DP),
        dv01: round_money(risk.dv01),
        z_spread_bps,
        iterations,
        warnings,
    })
}

fn percent_of(amount: Money, base: Money) -> Decimal {
    if base.is_zero() {
        Decimal::ZERO
    } else {
        amount / base * dec!(100)
    }
}

/// Bond cash flows after settlement with their timing.
pub struct FutureCashflows {
    pub cashflows: Vec<TimedCashflow>,
    pub outstanding_balance: Money,
    /// Unrounded coupon accrued in the settlement period
    pub accrued_interest: Money,
}

/// Position every bond payment after `settlement` on the period grid:
/// tau_k = frac + (k - j) for the first future period j, where frac is the
/// share of period j still to run at settlement.
pub fn future_cashflows(
    params: &IssueParameters,
    bond: &BondSchedule,
    settlement: NaiveDate,
) -> MbsResult<FutureCashflows> {
    let first = bond
        .records
        .iter()
        .position(|r| r.payment_date > settlement)
        .ok_or_else(|| {
            MbsError::config(
                "pricing.settlement_date",
                format!("Settlement {settlement} is on or after the last bond cash flow"),
            )
        })?;

    let period_start = if first == 0 {
        params.issue_date
    } else {
        bond.records[first - 1].payment_date
    };
    let record = &bond.records[first];
    let period_length = params.day_count.year_fraction(period_start, record.payment_date);
    let remaining = params.day_count.year_fraction(settlement, record.payment_date);
    let frac = if period_length.is_zero() {
        Decimal::ONE
    } else {
        remaining / period_length
    };
    let elapsed = (Decimal::ONE - frac).max(Decimal::ZERO);

    let f = Decimal::from(params.payment_frequency);
    let cashflows = bond.records[first..]
        .iter()
        .enumerate()
        .map(|(n, r)| {
            let tau = frac + Decimal::from(n as u32);
            TimedCashflow {
                period: r.period,
                amount: r.total_cashflow,
                principal: r.principal_paid(),
                first_fraction: frac,
                whole_periods: n as u32,
                tau,
                years: tau / f,
            }
        })
        .collect();

    Ok(FutureCashflows {
        cashflows,
        outstanding_balance: record.beginning_balance,
        accrued_interest: record.interest_due * elapsed,
    })
}

fn validate_pricing_input(params: &IssueParameters, input: &PricingInput) -> MbsResult<()> {
    if let Some(dc) = input.day_count {
        if dc != params.day_count {
            return Err(MbsError::config(
                "pricing.day_count",
                format!(
                    "Pricing day count {:?} differs from the cash-flow day count {:?}",
                    dc, params.day_count
                ),
            ));
        }
    }
    if let Some(curve) = &input.benchmark_curve {
        if curve.is_empty() {
            return Err(MbsError::config("pricing.benchmark_curve", "Benchmark curve is empty"));
        }
        if curve.windows(2).any(|w| w[1].maturity <= w[0].maturity) {
            return Err(MbsError::config(
                "pricing.benchmark_curve",
                "Curve maturities must be strictly increasing",
            ));
        }
    }
    if let DiscountAssumption::TargetPrice { clean_price } = input.discount {
        if clean_price <= Decimal::ZERO {
            return Err(MbsError::config("pricing.discount.clean_price", "Price must be positive"));
        }
    }
    Ok(())
}
