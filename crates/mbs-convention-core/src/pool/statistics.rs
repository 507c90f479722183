//! Cut-off statistics of the pool and pool interest accrued at a date.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::cashflow::{PoolPart, PoolPeriodRecord, PoolSchedule};
use crate::convention::params::{IssueParameters, PoolCohort, PoolParameters};
use crate::day_count::DayCountConvention;
use crate::types::{round_money, Money, Rate, Years};

const RATE_DP: u32 = 8;
const YEARS_DP: u32 = 2;

/// Balance-weighted description of a set of cohorts at the cut-off date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartStatistics {
    pub balance: Money,
    /// Share of the whole pool balance
    pub fraction: Rate,
    pub cohort_count: u32,
    pub loan_count: u32,
    pub wac: Rate,
    /// Weighted-average loan age
    pub wala: Years,
    /// Weighted-average remaining term
    pub wam: Years,
    /// Subsidy deduction; reported for the subsidised part only
    pub key_rate_deduction: Option<Rate>,
    /// Coupon plus subsidy deduction: what the lender earns over the
    /// reference rate. Reported for the subsidised part only.
    pub key_rate_premium: Option<Rate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolStatistics {
    pub total: PartStatistics,
    /// Absent when the pool holds no unsubsidised cohort
    pub fixed: Option<PartStatistics>,
    /// Absent when the pool holds no subsidised cohort
    pub subsidised: Option<PartStatistics>,
}

impl PoolStatistics {
    pub fn from_pool(pool: &PoolParameters, periods_per_year: u32) -> Self {
        let pool_balance = pool.total_balance();
        let all: Vec<&PoolCohort> = pool.cohorts.iter().collect();
        let statistics_of = |part: PoolPart| {
            let cohorts = cohorts_of(pool, part);
            if cohorts.is_empty() {
                None
            } else {
                let subsidised = part == PoolPart::Subsidised;
                Some(part_statistics(&cohorts, pool_balance, periods_per_year, subsidised))
            }
        };

        PoolStatistics {
            total: part_statistics(&all, pool_balance, periods_per_year, false),
            fixed: statistics_of(PoolPart::Fixed),
            subsidised: statistics_of(PoolPart::Subsidised),
        }
    }
}

fn cohorts_of(pool: &PoolParameters, part: PoolPart) -> Vec<&PoolCohort> {
    pool.cohorts.iter().filter(|c| PoolPart::of(c) == part).collect()
}

fn part_statistics(
    cohorts: &[&PoolCohort],
    pool_balance: Money,
    periods_per_year: u32,
    subsidised: bool,
) -> PartStatistics {
    let f = Decimal::from(periods_per_year.max(1));
    let mut balance = Decimal::ZERO;
    let mut wac_numerator = Decimal::ZERO;
    let mut age_numerator = Decimal::ZERO;
    let mut term_numerator = Decimal::ZERO;
    let mut deduction_numerator = Decimal::ZERO;

    for c in cohorts {
        balance += c.balance;
        wac_numerator += c.wac * c.balance;
        age_numerator += Decimal::from(c.age_periods) / f * c.balance;
        term_numerator += Decimal::from(c.remaining_term_periods) / f * c.balance;
        if let Some(subsidy) = c.subsidy {
            deduction_numerator += subsidy.key_rate_deduction * c.balance;
        }
    }

    let weighted = |numerator: Decimal| {
        if balance.is_zero() {
            Decimal::ZERO
        } else {
            numerator / balance
        }
    };
    let wac = weighted(wac_numerator);
    let deduction = weighted(deduction_numerator);

    PartStatistics {
        balance: round_money(balance),
        fraction: if pool_balance.is_zero() {
            Decimal::ZERO
        } else {
            (balance / pool_balance).round_dp(RATE_DP)
        },
        cohort_count: cohorts.len() as u32,
        loan_count: cohorts.iter().map(|c| c.loan_count).sum(),
        wac: wac.round_dp(RATE_DP),
        wala: weighted(age_numerator).round_dp(YEARS_DP),
        wam: weighted(term_numerator).round_dp(YEARS_DP),
        key_rate_deduction: subsidised.then(|| deduction.round_dp(RATE_DP)),
        key_rate_premium: subsidised.then(|| (wac + deduction).round_dp(RATE_DP)),
    }
}

// ---------------------------------------------------------------------------
// Accrued interest
// ---------------------------------------------------------------------------

/// Borrower interest accrued but not yet paid at a date, per pool part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccruedPoolInterest {
    pub as_of: NaiveDate,
    pub total: Money,
    pub fixed: Money,
    pub subsidised: Money,
}

impl PoolSchedule {
    /// Share of the running period's interest accrued by `as_of`. Nothing
    /// accrues before the cut-off date or after the last payment.
    pub fn accrued_interest(&self, params: &IssueParameters, as_of: NaiveDate) -> AccruedPoolInterest {
        let fixed = accrued_on(&self.fixed, params.issue_date, params.day_count, as_of);
        let subsidised = accrued_on(&self.subsidised, params.issue_date, params.day_count, as_of);
        AccruedPoolInterest {
            as_of,
            total: fixed + subsidised,
            fixed,
            subsidised,
        }
    }
}

fn accrued_on(
    records: &[PoolPeriodRecord],
    issue_date: NaiveDate,
    day_count: DayCountConvention,
    as_of: NaiveDate,
) -> Money {
    let Some(index) = records.iter().position(|r| r.payment_date > as_of) else {
        return Decimal::ZERO;
    };
    let start = match index {
        0 => issue_date,
        i => records[i - 1].payment_date,
    };
    if as_of <= start {
        return Decimal::ZERO;
    }
    let record = &records[index];
    let period_length = day_count.year_fraction(start, record.payment_date);
    if period_length.is_zero() {
        return Decimal::ZERO;
    }
    let elapsed = day_count.year_fraction(start, as_of) / period_length;
    round_money(record.interest * elapsed.min(Decimal::ONE))
}
