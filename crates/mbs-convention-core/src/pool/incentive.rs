//! Refinancing-incentive curves: the mapping from the spread between the
//! pool coupon and the market mortgage rate to an annual prepayment rate.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::MbsError;
use crate::math::decimal_atan;
use crate::types::Rate;
use crate::MbsResult;

/// Strategy mapping a refinancing incentive to an annual CPR.
///
/// `incentive` is `wac - refinancing_rate` as a decimal. Implementations need
/// not clamp; the pool model applies the configured floor and cap.
pub trait IncentiveCurve {
    fn cpr(&self, incentive: Rate, loan_age_periods: u32, periods_per_year: u32) -> Rate;
}

impl<F> IncentiveCurve for F
where
    F: Fn(Rate, u32, u32) -> Rate,
{
    fn cpr(&self, incentive: Rate, loan_age_periods: u32, periods_per_year: u32) -> Rate {
        self(incentive, loan_age_periods, periods_per_year)
    }
}

// ---------------------------------------------------------------------------
// Configured curves
// ---------------------------------------------------------------------------

/// Age-independent constant CPR.
#[derive(Debug, Clone, Copy)]
pub struct ConstantCurve {
    pub cpr: Rate,
}

impl IncentiveCurve for ConstantCurve {
    fn cpr(&self, _incentive: Rate, _loan_age_periods: u32, _periods_per_year: u32) -> Rate {
        self.cpr
    }
}

/// cpr = base_cpr + slope * incentive
#[derive(Debug, Clone, Copy)]
pub struct LinearCurve {
    pub base_cpr: Rate,
    pub slope: Decimal,
}

impl IncentiveCurve for LinearCurve {
    fn cpr(&self, incentive: Rate, _loan_age_periods: u32, _periods_per_year: u32) -> Rate {
        self.base_cpr + self.slope * incentive
    }
}

/// Coefficients of one arctangent S-curve, valid from `loan_age_years` on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SCurveBetas {
    pub loan_age_years: u32,
    pub beta0: Decimal,
    pub beta1: Decimal,
    pub beta2: Decimal,
    pub beta3: Decimal,
    pub beta4: Decimal,
    pub beta5: Decimal,
    pub beta6: Decimal,
}

impl SCurveBetas {
    /// cpr = b0 + b1 * atan(b2 + b3 * i) + b4 * atan(b5 + b6 * i), with `i`
    /// the incentive in percentage points.
    pub fn evaluate(&self, incentive: Rate) -> Rate {
        let i = incentive * dec!(100);
        self.beta0
            + self.beta1 * decimal_atan(self.beta2 + self.beta3 * i)
            + self.beta4 * decimal_atan(self.beta5 + self.beta6 * i)
    }
}

/// Seasoning-dependent S-curves. The curve for the largest configured age is
/// used for all older loans.
#[derive(Debug, Clone)]
pub struct SCurve {
    curves: Vec<SCurveBetas>,
}

impl SCurve {
    pub fn new(mut curves: Vec<SCurveBetas>) -> Self {
        curves.sort_by_key(|c| c.loan_age_years);
        SCurve { curves }
    }

    fn betas_for_age(&self, age_years: u32) -> Option<&SCurveBetas> {
        self.curves
            .iter()
            .rev()
            .find(|c| c.loan_age_years <= age_years)
            .or_else(|| self.curves.first())
    }
}

impl IncentiveCurve for SCurve {
    fn cpr(&self, incentive: Rate, loan_age_periods: u32, periods_per_year: u32) -> Rate {
        let age_years = loan_age_periods / periods_per_year.max(1);
        self.betas_for_age(age_years)
            .map(|b| b.evaluate(incentive))
            .unwrap_or(Decimal::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Serializable description of the incentive curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IncentiveCurveSpec {
    Constant { cpr: Rate },
    Linear { base_cpr: Rate, slope: Decimal },
    SCurve { curves: Vec<SCurveBetas> },
}

impl Default for IncentiveCurveSpec {
    fn default() -> Self {
        IncentiveCurveSpec::Constant { cpr: Decimal::ZERO }
    }
}

impl IncentiveCurveSpec {
    pub fn build(&self) -> Box<dyn IncentiveCurve> {
        match self {
            IncentiveCurveSpec::Constant { cpr } => Box::new(ConstantCurve { cpr: *cpr }),
            IncentiveCurveSpec::Linear { base_cpr, slope } => Box::new(LinearCurve {
                base_cpr: *base_cpr,
                slope: *slope,
            }),
            IncentiveCurveSpec::SCurve { curves } => Box::new(SCurve::new(curves.clone())),
        }
    }

    /// Reject curves that are not non-decreasing in the incentive.
    pub fn validate(&self) -> MbsResult<()> {
        match self {
            IncentiveCurveSpec::Constant { cpr } => {
                if *cpr < Decimal::ZERO || *cpr > Decimal::ONE {
                    return Err(MbsError::config(
                        "prepayment.curve.cpr",
                        "Constant CPR must be between 0 and 1",
                    ));
                }
            }
            IncentiveCurveSpec::Linear { slope, .. } => {
                if *slope < Decimal::ZERO {
                    return Err(MbsError::config(
                        "prepayment.curve.slope",
                        "Incentive slope must be non-negative",
                    ));
                }
            }
            IncentiveCurveSpec::SCurve { curves } => {
                if curves.is_empty() {
                    return Err(MbsError::config(
                        "prepayment.curve.curves",
                        "At least one S-curve is required",
                    ));
                }
                for c in curves {
                    if c.beta1 * c.beta3 < Decimal::ZERO || c.beta4 * c.beta6 < Decimal::ZERO {
                        return Err(MbsError::config(
                            "prepayment.curve.curves",
                            format!(
                                "S-curve for loan age {} is decreasing in the incentive",
                                c.loan_age_years
                            ),
                        ));
                    }
                }
                let mut ages: Vec<u32> = curves.iter().map(|c| c.loan_age_years).collect();
                ages.sort_unstable();
                ages.dedup();
                if ages.len() != curves.len() {
                    return Err(MbsError::config(
                        "prepayment.curve.curves",
                        "Duplicate loan age in S-curve table",
                    ));
                }
            }
        }
        Ok(())
    }
}
