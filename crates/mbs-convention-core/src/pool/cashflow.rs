//! Pool cash-flow projection.
//!
//! Each cohort is amortized on its contractual schedule, then prepaid at the
//! incentive-implied CPR and defaulted at the configured CDR. Cohort amounts
//! are carried unrounded and summed per pool part (fixed and subsidised
//! loans); each part is rounded to currency minor units at the very end,
//! using cumulative sums so that rounding error never compounds across
//! periods. The pool record of a period is the sum of its part records.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug_span, warn};

use super::amortization::scheduled_principal;
use super::incentive::IncentiveCurve;
use super::statistics::PoolStatistics;
use crate::convention::params::{IssueParameters, PoolCohort, PrepaymentAssumptions};
use crate::convention::progress::ProgressObserver;
use crate::day_count::payment_date;
use crate::error::{MbsError, Stage};
use crate::macro_model::{RatePath, RatePathPoint};
use crate::math::annual_to_period_rate;
use crate::types::{round_money, Money, Rate};
use crate::MbsResult;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Balances at or below this amount are treated as fully repaid.
const BALANCE_EPSILON: Decimal = dec!(0.01);

/// Decimal places kept on reported rates.
const RATE_DP: u32 = 8;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One period of aggregated pool cash flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolPeriodRecord {
    pub period: u32,
    pub payment_date: NaiveDate,
    pub beginning_balance: Money,
    pub scheduled_principal: Money,
    pub prepaid_principal: Money,
    /// Principal of loans defaulting in the period
    pub default_amount: Money,
    pub loss_amount: Money,
    pub recovery_amount: Money,
    pub interest: Money,
    /// Subsidy income on subsidised cohorts
    pub subsidy: Money,
    pub ending_balance: Money,
    /// Effective annual prepayment rate after floor, cap and seasoning
    pub cpr: Rate,
    pub cdr: Rate,
    pub wac: Rate,
    pub reference_rate: Rate,
    /// Refinancing rate the incentive was measured against
    pub refinancing_rate: Rate,
    /// wac - refinancing_rate, balance-weighted across cohorts
    pub incentive: Rate,
    pub is_terminal: bool,
}

impl PoolPeriodRecord {
    /// Principal cash received: scheduled, prepaid and recovered.
    pub fn principal_collected(&self) -> Money {
        self.scheduled_principal + self.prepaid_principal + self.recovery_amount
    }
}

/// Split of the pool by subsidy status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolPart {
    /// Loans paying their own coupon only
    Fixed,
    /// Loans that also earn a subsidy indexed to the reference rate
    Subsidised,
}

impl PoolPart {
    pub fn of(cohort: &PoolCohort) -> Self {
        if cohort.subsidy.is_some() {
            PoolPart::Subsidised
        } else {
            PoolPart::Fixed
        }
    }

    fn index(self) -> usize {
        match self {
            PoolPart::Fixed => 0,
            PoolPart::Subsidised => 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSchedule {
    pub records: Vec<PoolPeriodRecord>,
    /// Fixed part records, ending when the last fixed cohort is repaid
    pub fixed: Vec<PoolPeriodRecord>,
    /// Subsidised part records, ending when the last subsidised cohort is repaid
    pub subsidised: Vec<PoolPeriodRecord>,
    pub initial_balance: Money,
    pub statistics: PoolStatistics,
    /// The horizon cap was reached with a positive balance
    pub horizon_exhausted: bool,
    pub warnings: Vec<String>,
}

impl PoolSchedule {
    pub fn terminal_period(&self) -> Option<u32> {
        self.records.iter().find(|r| r.is_terminal).map(|r| r.period)
    }

    pub fn part(&self, part: PoolPart) -> &[PoolPeriodRecord] {
        match part {
            PoolPart::Fixed => &self.fixed,
            PoolPart::Subsidised => &self.subsidised,
        }
    }
}

struct CohortState<'a> {
    cohort: &'a PoolCohort,
    balance: Money,
    remaining: u32,
    terminal: bool,
}

/// Market and timing inputs shared by every cohort in one period.
struct PeriodContext<'a> {
    period: u32,
    periods_per_year: u32,
    year_fraction: Decimal,
    current: RatePathPoint,
    lagged: RatePathPoint,
    period_cdr: Rate,
    /// Share of each cohort outside the delinquency pipeline
    performing_share: Rate,
    recovery_rate: Rate,
    prepayment: &'a PrepaymentAssumptions,
    curve: &'a dyn IncentiveCurve,
}

#[derive(Debug, Default)]
struct CohortFlows {
    beginning: Money,
    scheduled: Money,
    prepaid: Money,
    default: Money,
    loss: Money,
    interest: Money,
    subsidy: Money,
    cpr: Rate,
    incentive: Rate,
}

/// Unrounded period totals plus balance-weighted rate sums.
#[derive(Debug, Default)]
struct PeriodFlows {
    beginning: Money,
    scheduled: Money,
    prepaid: Money,
    default: Money,
    loss: Money,
    interest: Money,
    subsidy: Money,
    cpr_weighted: Decimal,
    wac_weighted: Decimal,
    incentive_weighted: Decimal,
}

impl PeriodFlows {
    fn add(&mut self, flows: &CohortFlows, wac: Rate) {
        self.beginning += flows.beginning;
        self.scheduled += flows.scheduled;
        self.prepaid += flows.prepaid;
        self.default += flows.default;
        self.loss += flows.loss;
        self.interest += flows.interest;
        self.subsidy += flows.subsidy;
        self.cpr_weighted += flows.cpr * flows.beginning;
        self.wac_weighted += wac * flows.beginning;
        self.incentive_weighted += flows.incentive * flows.beginning;
    }

    fn weighted(&self, sum: Decimal) -> Rate {
        if self.beginning.is_zero() {
            Decimal::ZERO
        } else {
            (sum / self.beginning).round_dp(RATE_DP)
        }
    }
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// Project the pool schedule from period 1 until every cohort is repaid or
/// the horizon cap is reached.
pub fn project_pool_cashflows(
    params: &IssueParameters,
    path: &RatePath,
    curve: &dyn IncentiveCurve,
    progress: &dyn ProgressObserver,
) -> MbsResult<PoolSchedule> {
    let periods_per_year = params.payment_frequency;
    let horizon = params.pool.horizon();
    let _span = debug_span!("pool_cashflow", issue = %params.issue_id, horizon).entered();

    let mut warnings = Vec::new();
    if (path.len() as u64) < u64::from(horizon) {
        warnings.push(format!(
            "Rate path covers {} of {} periods; later periods reuse the last known rate",
            path.len(),
            horizon
        ));
    }

    let mut cohorts: Vec<CohortState> = params
        .pool
        .cohorts
        .iter()
        .map(|cohort| CohortState {
            cohort,
            balance: cohort.balance,
            remaining: cohort.remaining_term_periods,
            terminal: false,
        })
        .collect();

    let initial_balance = params.pool.total_balance();
    let period_cdr = annual_to_period_rate(params.credit.cdr, periods_per_year);
    let performing_share =
        (Decimal::ONE - Decimal::from(params.credit.delinquency_periods) * period_cdr).max(Decimal::ZERO);

    let mut rounders = [PoolPart::Fixed, PoolPart::Subsidised].map(|part| {
        CumulativeRounder::new(
            cohorts
                .iter()
                .filter(|s| PoolPart::of(s.cohort) == part)
                .map(|s| s.balance)
                .sum(),
        )
    });
    let mut records = Vec::with_capacity(horizon as usize);
    let mut part_records: [Vec<PoolPeriodRecord>; 2] = [Vec::new(), Vec::new()];
    let mut accrual_start = params.issue_date;
    let mut terminal = false;

    for period in 1..=horizon {
        let pay_date = payment_date(params.first_payment_date, periods_per_year, period);
        let ctx = PeriodContext {
            period,
            periods_per_year,
            year_fraction: params.day_count.year_fraction(accrual_start, pay_date),
            current: path.rate_at(period),
            lagged: path.lagged_rate_at(period, params.prepayment.incentive_lag_periods),
            period_cdr,
            performing_share,
            recovery_rate: params.credit.recovery_rate,
            prepayment: &params.prepayment,
            curve,
        };

        let mut flows = PeriodFlows::default();
        let mut part_flows = [PeriodFlows::default(), PeriodFlows::default()];
        let mut live = [false, false];
        for state in cohorts.iter_mut().filter(|s| !s.terminal) {
            let part = PoolPart::of(state.cohort).index();
            let cohort_flows = project_cohort_period(state, &ctx)?;
            flows.add(&cohort_flows, state.cohort.wac);
            part_flows[part].add(&cohort_flows, state.cohort.wac);
            live[part] = true;
        }
        terminal = cohorts.iter().all(|s| s.terminal);

        let mut amounts = RoundedAmounts::default();
        for part in [PoolPart::Fixed, PoolPart::Subsidised] {
            let i = part.index();
            if !live[i] {
                continue;
            }
            let part_terminal = cohorts
                .iter()
                .filter(|s| PoolPart::of(s.cohort) == part)
                .all(|s| s.terminal);
            let rounded = rounders[i].record(&part_flows[i], part_terminal);
            amounts.add(&rounded);
            part_records[i].push(period_record(
                &ctx,
                pay_date,
                &rounded,
                &part_flows[i],
                params.credit.cdr,
                part_terminal,
            ));
        }
        records.push(period_record(&ctx, pay_date, &amounts, &flows, params.credit.cdr, terminal));
        progress.on_period(Stage::PoolCashflow, period, horizon);
        accrual_start = pay_date;

        if terminal {
            break;
        }
    }

    let horizon_exhausted = !terminal;
    if horizon_exhausted {
        let remaining = records.last().map(|r| r.ending_balance).unwrap_or(initial_balance);
        let msg = format!(
            "Projection horizon of {horizon} periods exhausted with outstanding pool balance {remaining}"
        );
        warn!(issue = %params.issue_id, "{msg}");
        warnings.push(msg);
    }

    let [fixed, subsidised] = part_records;
    Ok(PoolSchedule {
        records,
        fixed,
        subsidised,
        initial_balance: round_money(initial_balance),
        statistics: PoolStatistics::from_pool(&params.pool, periods_per_year),
        horizon_exhausted,
        warnings,
    })
}

fn project_cohort_period(state: &mut CohortState, ctx: &PeriodContext) -> MbsResult<CohortFlows> {
    let cohort = state.cohort;
    let beginning = state.balance;
    let age = cohort.age_periods + ctx.period;

    let scheduled_due = scheduled_principal(
        beginning,
        cohort.wac,
        ctx.periods_per_year,
        state.remaining,
        cohort.payment_type,
    );

    // Delinquent loans pay no principal; the final payment clears the cohort.
    let performing = if state.remaining > 1 {
        ctx.performing_share
    } else {
        Decimal::ONE
    };

    let incentive = cohort.wac - ctx.lagged.refinancing_rate;
    let cpr = effective_cpr(ctx.curve, ctx.prepayment, incentive, age, ctx.periods_per_year);
    let prepaid = (beginning - scheduled_due) * annual_to_period_rate(cpr, ctx.periods_per_year) * performing;
    let scheduled = scheduled_due * performing;

    let default = (beginning - scheduled - prepaid) * ctx.period_cdr;
    let loss = default * (Decimal::ONE - ctx.recovery_rate);

    // Defaulted principal earns nothing; prepayments arrive mid-period.
    let accrual_base = (beginning - default - prepaid / dec!(2)) * ctx.year_fraction;
    let interest = accrual_base * cohort.wac;
    let subsidy = match cohort.subsidy {
        Some(s) => (accrual_base * (ctx.current.reference_rate + s.key_rate_deduction)).max(Decimal::ZERO),
        None => Decimal::ZERO,
    };

    let raw_ending = beginning - scheduled - prepaid - default;
    let (ending, repaid) = close_balance(ctx.period, raw_ending)?;
    // a closed-out remainder is repaid with the scheduled payment
    let scheduled = scheduled + (raw_ending - ending);

    state.balance = ending;
    state.remaining = state.remaining.saturating_sub(1);
    state.terminal = repaid || state.remaining == 0;

    Ok(CohortFlows {
        beginning,
        scheduled,
        prepaid,
        default,
        loss,
        interest,
        subsidy,
        cpr,
        incentive,
    })
}

/// Incentive-implied CPR bounded by floor and cap, then scaled by the
/// seasoning ramp.
fn effective_cpr(
    curve: &dyn IncentiveCurve,
    prepayment: &PrepaymentAssumptions,
    incentive: Rate,
    age_periods: u32,
    periods_per_year: u32,
) -> Rate {
    let raw = curve.cpr(incentive, age_periods, periods_per_year);
    let bounded = raw.max(prepayment.cpr_floor).min(prepayment.cpr_cap);
    if prepayment.seasoning_periods > 0 && age_periods < prepayment.seasoning_periods {
        bounded * Decimal::from(age_periods) / Decimal::from(prepayment.seasoning_periods)
    } else {
        bounded
    }
}

/// Apply the zero-balance policy to a period's ending balance.
fn close_balance(period: u32, ending: Money) -> MbsResult<(Money, bool)> {
    if ending < -BALANCE_EPSILON {
        return Err(MbsError::NegativeBalance {
            period,
            balance: ending,
        });
    }
    if ending <= BALANCE_EPSILON {
        Ok((Decimal::ZERO, true))
    } else {
        Ok((ending, false))
    }
}

// ---------------------------------------------------------------------------
// Rounding
// ---------------------------------------------------------------------------

/// Rounded money amounts of one period.
#[derive(Debug, Default, Clone, Copy)]
struct RoundedAmounts {
    beginning: Money,
    scheduled: Money,
    prepaid: Money,
    default: Money,
    loss: Money,
    interest: Money,
    subsidy: Money,
    ending: Money,
}

impl RoundedAmounts {
    fn add(&mut self, other: &RoundedAmounts) {
        self.beginning += other.beginning;
        self.scheduled += other.scheduled;
        self.prepaid += other.prepaid;
        self.default += other.default;
        self.loss += other.loss;
        self.interest += other.interest;
        self.subsidy += other.subsidy;
        self.ending += other.ending;
    }
}

/// Rounds flows as differences of rounded running totals, so every
/// component is non-negative and rounding error never compounds. The ending
/// balance follows from the balance identity and is forced to zero on the
/// terminal period.
struct CumulativeRounder {
    previous_ending: Money,
    cum_scheduled: Money,
    cum_prepaid: Money,
    cum_default: Money,
    cum_loss: Money,
    cum_interest: Money,
    cum_subsidy: Money,
    /// Loss reported so far. Trails the rounded running loss while a
    /// period's loss is clipped to its defaults.
    reported_loss: Money,
}

impl CumulativeRounder {
    fn new(initial_balance: Money) -> Self {
        CumulativeRounder {
            previous_ending: round_money(initial_balance),
            cum_scheduled: Decimal::ZERO,
            cum_prepaid: Decimal::ZERO,
            cum_default: Decimal::ZERO,
            cum_loss: Decimal::ZERO,
            cum_interest: Decimal::ZERO,
            cum_subsidy: Decimal::ZERO,
            reported_loss: Decimal::ZERO,
        }
    }

    fn step(total: &mut Money, amount: Money) -> Money {
        let before = round_money(*total);
        *total += amount;
        (round_money(*total) - before).max(Decimal::ZERO)
    }

    fn record(&mut self, flows: &PeriodFlows, terminal: bool) -> RoundedAmounts {
        let beginning = self.previous_ending;
        let mut scheduled = Self::step(&mut self.cum_scheduled, flows.scheduled);
        let mut prepaid = Self::step(&mut self.cum_prepaid, flows.prepaid);
        let mut default = Self::step(&mut self.cum_default, flows.default);
        let interest = Self::step(&mut self.cum_interest, flows.interest);
        let subsidy = Self::step(&mut self.cum_subsidy, flows.subsidy);

        let mut ending = beginning - scheduled - prepaid - default;
        if terminal && ending > Decimal::ZERO {
            scheduled += ending;
            ending = Decimal::ZERO;
        }
        if ending < Decimal::ZERO {
            // cents of rounding beyond the balance: taken back from
            // scheduled, then unscheduled principal, then defaults
            let mut residue = -ending;
            for amount in [&mut scheduled, &mut prepaid, &mut default] {
                let taken = residue.min(*amount);
                *amount -= taken;
                residue -= taken;
            }
            ending = Decimal::ZERO;
        }

        self.cum_loss += flows.loss;
        let loss = (round_money(self.cum_loss) - self.reported_loss)
            .min(default)
            .max(Decimal::ZERO);
        self.reported_loss += loss;
        self.previous_ending = ending;

        RoundedAmounts {
            beginning,
            scheduled,
            prepaid,
            default,
            loss,
            interest,
            subsidy,
            ending,
        }
    }
}

fn period_record(
    ctx: &PeriodContext,
    payment_date: NaiveDate,
    amounts: &RoundedAmounts,
    flows: &PeriodFlows,
    cdr: Rate,
    terminal: bool,
) -> PoolPeriodRecord {
    PoolPeriodRecord {
        period: ctx.period,
        payment_date,
        beginning_balance: amounts.beginning,
        scheduled_principal: amounts.scheduled,
        prepaid_principal: amounts.prepaid,
        default_amount: amounts.default,
        loss_amount: amounts.loss,
        recovery_amount: amounts.default - amounts.loss,
        interest: amounts.interest,
        subsidy: amounts.subsidy,
        ending_balance: amounts.ending,
        cpr: flows.weighted(flows.cpr_weighted),
        cdr: if flows.beginning.is_zero() { Decimal::ZERO } else { cdr },
        wac: flows.weighted(flows.wac_weighted),
        reference_rate: ctx.current.reference_rate,
        refinancing_rate: ctx.lagged.refinancing_rate,
        incentive: flows.weighted(flows.incentive_weighted),
        is_terminal: terminal,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
