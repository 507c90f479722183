//! Static description of one MBS issue.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::day_count::DayCountConvention;
use crate::error::MbsError;
use crate::macro_model::projection::validate_macro_config;
use crate::macro_model::MacroModelConfig;
use crate::math::annual_to_period_rate;
use crate::pool::amortization::PaymentType;
use crate::pool::incentive::IncentiveCurveSpec;
use crate::pricing::PricingInput;
use crate::types::{Money, Rate};
use crate::MbsResult;

/// Longest remaining term or projection horizon accepted, in years.
pub const MAX_TERM_YEARS: u32 = 50;

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// State subsidy paid on a cohort's interest: the subsidy rate is the
/// reference rate plus `key_rate_deduction`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CohortSubsidy {
    pub key_rate_deduction: Rate,
}

/// An aggregated group of loans sharing coupon, term and repayment profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolCohort {
    pub name: String,
    pub balance: Money,
    /// Weighted-average coupon, annual
    pub wac: Rate,
    pub remaining_term_periods: u32,
    /// Periods elapsed since origination at the cut-off date
    #[serde(default)]
    pub age_periods: u32,
    #[serde(default)]
    pub payment_type: PaymentType,
    #[serde(default)]
    pub subsidy: Option<CohortSubsidy>,
    /// Number of loans aggregated into the cohort
    #[serde(default = "default_loan_count")]
    pub loan_count: u32,
}

fn default_loan_count() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolParameters {
    pub cohorts: Vec<PoolCohort>,
    /// Projection horizon cap; defaults to the longest cohort term
    #[serde(default)]
    pub max_periods: Option<u32>,
}

impl PoolParameters {
    pub fn total_balance(&self) -> Money {
        self.cohorts.iter().map(|c| c.balance).sum()
    }

    pub fn horizon(&self) -> u32 {
        let longest = self
            .cohorts
            .iter()
            .map(|c| c.remaining_term_periods)
            .max()
            .unwrap_or(0);
        self.max_periods.unwrap_or(longest)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepaymentAssumptions {
    pub curve: IncentiveCurveSpec,
    #[serde(default)]
    pub cpr_floor: Rate,
    #[serde(default = "default_cpr_cap")]
    pub cpr_cap: Rate,
    /// Periods from origination until the full incentive-implied CPR applies
    #[serde(default)]
    pub seasoning_periods: u32,
    /// The incentive uses the refinancing rate this many periods earlier
    #[serde(default)]
    pub incentive_lag_periods: u32,
}

fn default_cpr_cap() -> Rate {
    Decimal::ONE
}

impl Default for PrepaymentAssumptions {
    fn default() -> Self {
        PrepaymentAssumptions {
            curve: IncentiveCurveSpec::default(),
            cpr_floor: Decimal::ZERO,
            cpr_cap: Decimal::ONE,
            seasoning_periods: 0,
            incentive_lag_periods: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreditAssumptions {
    /// Annual constant default rate
    #[serde(default)]
    pub cdr: Rate,
    /// Share of defaulted principal recovered in the default period
    #[serde(default)]
    pub recovery_rate: Rate,
    /// Periods a loan spends delinquent before it defaults. Each period of
    /// the pipeline holds about one period's CDR share of the balance, and
    /// delinquent loans pay neither scheduled nor unscheduled principal.
    #[serde(default)]
    pub delinquency_periods: u32,
}

// ---------------------------------------------------------------------------
// Bond
// ---------------------------------------------------------------------------

/// Bond coupon formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CouponFormula {
    Fixed { rate: Rate },
    /// Pool weighted-average coupon minus `margin`
    PoolYieldSpread { margin: Rate },
    /// Projected reference rate plus `margin`
    ReferenceRateSpread { margin: Rate },
    /// All interest left after fees
    PassThrough,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveFundTerms {
    #[serde(default)]
    pub initial_balance: Money,
    /// Target as a share of the outstanding bond balance
    pub target_rate: Rate,
    #[serde(default)]
    pub floor_amount: Money,
    /// Share of collected principal retained while the reserve is below target
    #[serde(default)]
    pub principal_diversion_share: Rate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CleanupCall {
    /// Fraction of the initial pool balance
    pub threshold: Rate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BondStructure {
    /// Defaults to the pool balance
    #[serde(default)]
    pub initial_balance: Option<Money>,
    pub coupon: CouponFormula,
    #[serde(default)]
    pub servicing_fee_rate: Rate,
    #[serde(default)]
    pub guarantee_fee_rate: Rate,
    #[serde(default)]
    pub reserve: Option<ReserveFundTerms>,
    #[serde(default)]
    pub cleanup_call: Option<CleanupCall>,
}

// ---------------------------------------------------------------------------
// Issue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueParameters {
    pub issue_id: String,
    /// Cut-off date; accrual of the first period starts here
    pub issue_date: NaiveDate,
    pub first_payment_date: NaiveDate,
    /// Payment periods per year (divides 12)
    #[serde(default = "default_frequency")]
    pub payment_frequency: u32,
    #[serde(default)]
    pub day_count: DayCountConvention,
    pub pool: PoolParameters,
    #[serde(default)]
    pub prepayment: PrepaymentAssumptions,
    #[serde(default)]
    pub credit: CreditAssumptions,
    pub macro_model: MacroModelConfig,
    pub bond: BondStructure,
    pub pricing: PricingInput,
}

fn default_frequency() -> u32 {
    12
}

impl IssueParameters {
    pub fn bond_initial_balance(&self) -> Money {
        self.bond
            .initial_balance
            .unwrap_or_else(|| self.pool.total_balance())
    }

    /// Check that the parameters describe a consistent issue.
    pub fn validate(&self) -> MbsResult<()> {
        if self.issue_id.trim().is_empty() {
            return Err(MbsError::config("issue_id", "Issue identifier must not be empty"));
        }
        if self.payment_frequency == 0 || 12 % self.payment_frequency != 0 {
            return Err(MbsError::config(
                "payment_frequency",
                format!("{} periods per year does not divide 12", self.payment_frequency),
            ));
        }
        if self.first_payment_date <= self.issue_date {
            return Err(MbsError::config(
                "first_payment_date",
                "First payment date must be after the issue date",
            ));
        }

        validate_pool(&self.pool, self.payment_frequency)?;
        validate_prepayment(&self.prepayment)?;
        validate_credit(&self.credit, self.payment_frequency)?;
        validate_macro_config(&self.macro_model, self.payment_frequency)?;
        validate_bond(&self.bond, self.pool.total_balance())?;

        if let Some(dc) = self.pricing.day_count {
            if dc != self.day_count {
                return Err(MbsError::config(
                    "pricing.day_count",
                    format!(
                        "Pricing day count {:?} differs from the cash-flow day count {:?}",
                        dc, self.day_count
                    ),
                ));
            }
        }
        Ok(())
    }
}

fn validate_pool(pool: &PoolParameters, periods_per_year: u32) -> MbsResult<()> {
    if pool.cohorts.is_empty() {
        return Err(MbsError::config("pool.cohorts", "At least one cohort is required"));
    }
    let max_periods = MAX_TERM_YEARS * periods_per_year;
    for cohort in &pool.cohorts {
        if cohort.balance <= Decimal::ZERO {
            return Err(MbsError::config(
                "pool.cohorts.balance",
                format!("Cohort '{}' balance must be positive", cohort.name),
            ));
        }
        if cohort.remaining_term_periods == 0 {
            return Err(MbsError::config(
                "pool.cohorts.remaining_term_periods",
                format!("Cohort '{}' has zero remaining term", cohort.name),
            ));
        }
        if cohort.remaining_term_periods > max_periods {
            return Err(MbsError::config(
                "pool.cohorts.remaining_term_periods",
                format!(
                    "Cohort '{}' remaining term of {} periods exceeds {MAX_TERM_YEARS} years",
                    cohort.name, cohort.remaining_term_periods
                ),
            ));
        }
        if cohort.loan_count == 0 {
            return Err(MbsError::config(
                "pool.cohorts.loan_count",
                format!("Cohort '{}' must hold at least one loan", cohort.name),
            ));
        }
        if cohort.wac < Decimal::ZERO {
            return Err(MbsError::config(
                "pool.cohorts.wac",
                format!("Cohort '{}' coupon must be non-negative", cohort.name),
            ));
        }
    }
    match pool.max_periods {
        Some(0) => {
            return Err(MbsError::config("pool.max_periods", "Horizon cap must be positive"));
        }
        Some(cap) if cap > max_periods => {
            return Err(MbsError::config(
                "pool.max_periods",
                format!("Horizon cap of {cap} periods exceeds {MAX_TERM_YEARS} years"),
            ));
        }
        _ => {}
    }
    Ok(())
}

fn validate_unit_interval(field: &str, value: Rate) -> MbsResult<()> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(MbsError::config(field, format!("{value} is outside [0, 1]")));
    }
    Ok(())
}

fn validate_prepayment(prepayment: &PrepaymentAssumptions) -> MbsResult<()> {
    validate_unit_interval("prepayment.cpr_floor", prepayment.cpr_floor)?;
    validate_unit_interval("prepayment.cpr_cap", prepayment.cpr_cap)?;
    if prepayment.cpr_floor > prepayment.cpr_cap {
        return Err(MbsError::config(
            "prepayment.cpr_floor",
            "CPR floor exceeds CPR cap",
        ));
    }
    prepayment.curve.validate()
}

fn validate_credit(credit: &CreditAssumptions, periods_per_year: u32) -> MbsResult<()> {
    validate_unit_interval("credit.cdr", credit.cdr)?;
    validate_unit_interval("credit.recovery_rate", credit.recovery_rate)?;
    let delinquent = Decimal::from(credit.delinquency_periods)
        * annual_to_period_rate(credit.cdr, periods_per_year);
    if delinquent >= Decimal::ONE {
        return Err(MbsError::config(
            "credit.delinquency_periods",
            format!(
                "{} delinquent periods at CDR {} leave no performing balance",
                credit.delinquency_periods, credit.cdr
            ),
        ));
    }
    Ok(())
}

fn validate_bond(bond: &BondStructure, pool_balance: Money) -> MbsResult<()> {
    if let Some(balance) = bond.initial_balance {
        if balance <= Decimal::ZERO {
            return Err(MbsError::config("bond.initial_balance", "Bond balance must be positive"));
        }
        if balance > pool_balance {
            return Err(MbsError::config(
                "bond.initial_balance",
                format!("Bond balance {balance} exceeds pool balance {pool_balance}"),
            ));
        }
    }
    if let CouponFormula::Fixed { rate } = bond.coupon {
        if rate < Decimal::ZERO {
            return Err(MbsError::config("bond.coupon.rate", "Coupon rate must be non-negative"));
        }
    }
    validate_unit_interval("bond.servicing_fee_rate", bond.servicing_fee_rate)?;
    validate_unit_interval("bond.guarantee_fee_rate", bond.guarantee_fee_rate)?;
    if let Some(reserve) = &bond.reserve {
        if reserve.initial_balance < Decimal::ZERO || reserve.floor_amount < Decimal::ZERO {
            return Err(MbsError::config("bond.reserve", "Reserve amounts must be non-negative"));
        }
        validate_unit_interval("bond.reserve.target_rate", reserve.target_rate)?;
        validate_unit_interval(
            "bond.reserve.principal_diversion_share",
            reserve.principal_diversion_share,
        )?;
    }
    if let Some(call) = bond.cleanup_call {
        if call.threshold <= Decimal::ZERO || call.threshold >= Decimal::ONE {
            return Err(MbsError::config(
                "bond.cleanup_call.threshold",
                "Call threshold must be strictly between 0 and 1",
            ));
        }
    }
    Ok(())
}
