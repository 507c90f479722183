//! Bond cash-flow waterfall.
//!
//! Pool interest pays fees, then the bond coupon, then tops up the reserve;
//! what is left goes to the residual holder. Pool principal passes through to
//! the bond (scheduled first, then unscheduled) after any principal diverted
//! into the reserve. The bond is redeemed in full when the pool terminates or
//! when a cleanup call is exercised.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug_span, warn};

use super::reserve::ReserveAccount;
use crate::convention::params::{CouponFormula, IssueParameters};
use crate::convention::progress::ProgressObserver;
use crate::error::Stage;
use crate::pool::{PoolPeriodRecord, PoolSchedule};
use crate::types::{round_money, Money, Rate};
use crate::MbsResult;

const RATE_DP: u32 = 8;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One period of bond-holder cash flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BondPeriodRecord {
    pub period: u32,
    pub payment_date: NaiveDate,
    pub beginning_balance: Money,
    pub coupon_rate: Rate,
    pub interest_due: Money,
    pub interest_paid: Money,
    /// Coupon neither covered by interest nor by the reserve
    pub interest_shortfall: Money,
    pub scheduled_principal: Money,
    /// Unscheduled principal: prepayments and recoveries
    pub prepaid_principal: Money,
    /// Balance redeemed at the terminal or call period
    pub redemption_principal: Money,
    pub principal_writedown: Money,
    pub servicing_fee: Money,
    pub guarantee_fee: Money,
    /// Fees that interest could not cover, paid out of principal
    pub fee_from_principal: Money,
    /// Fees left unpaid after interest, principal and the reserve
    pub fee_shortfall: Money,
    pub reserve_beginning: Money,
    /// Interest deposited into the reserve
    pub reserve_contribution: Money,
    /// Principal diverted into the reserve
    pub reserve_principal_retention: Money,
    pub reserve_draw: Money,
    pub reserve_release: Money,
    pub reserve_ending: Money,
    /// Interest left after fees, coupon and reserve top-up
    pub excess_interest: Money,
    /// Collateral principal beyond the bond balance, released to the residual holder
    pub residual_principal: Money,
    pub call_collateral_proceeds: Money,
    pub total_cashflow: Money,
    pub ending_balance: Money,
    pub called: bool,
    pub reserve_shortfall: bool,
    pub is_terminal: bool,
}

impl BondPeriodRecord {
    /// Principal passed through from pool collections.
    pub fn pass_through_principal(&self) -> Money {
        self.scheduled_principal + self.prepaid_principal
    }

    /// All principal paid to bond holders in the period.
    pub fn principal_paid(&self) -> Money {
        self.pass_through_principal() + self.redemption_principal
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BondSchedule {
    pub records: Vec<BondPeriodRecord>,
    pub initial_balance: Money,
    /// Period in which the cleanup call was exercised
    pub called_at: Option<u32>,
    pub warnings: Vec<String>,
}

impl BondSchedule {
    pub fn shortfall_periods(&self) -> Vec<u32> {
        self.records
            .iter()
            .filter(|r| r.reserve_shortfall)
            .map(|r| r.period)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Waterfall
// ---------------------------------------------------------------------------

/// Convert the pool schedule into the bond schedule, period by period.
pub fn project_bond_cashflows(
    params: &IssueParameters,
    pool: &PoolSchedule,
    progress: &dyn ProgressObserver,
) -> MbsResult<BondSchedule> {
    let initial_balance = round_money(params.bond_initial_balance());
    let total = pool.records.len() as u32;
    let _span = debug_span!("mbs_cashflow", issue = %params.issue_id, periods = total).entered();

    let call_level = params
        .bond
        .cleanup_call
        .map(|c| round_money(c.threshold * pool.initial_balance));

    let mut reserve = ReserveAccount::new(params.bond.reserve.as_ref());
    let mut records = Vec::with_capacity(pool.records.len());
    let mut warnings = Vec::new();
    let mut balance = initial_balance;
    let mut accrual_start = params.issue_date;
    let mut called_at = None;

    for rec in &pool.records {
        let year_fraction = params.day_count.year_fraction(accrual_start, rec.payment_date);
        let call = match call_level {
            Some(level) => !rec.is_terminal && rec.ending_balance < level,
            None => false,
        };

        let bond_rec = waterfall_period(params, rec, balance, year_fraction, call, &mut reserve);

        if bond_rec.fee_shortfall > Decimal::ZERO {
            warn!(
                issue = %params.issue_id,
                period = rec.period,
                shortfall = %bond_rec.fee_shortfall,
                "fee shortfall not covered by reserve"
            );
            warnings.push(format!(
                "Period {}: fee shortfall of {} not covered by the reserve fund",
                rec.period, bond_rec.fee_shortfall
            ));
        }
        if bond_rec.interest_shortfall > Decimal::ZERO {
            warn!(
                issue = %params.issue_id,
                period = rec.period,
                shortfall = %bond_rec.interest_shortfall,
                "coupon shortfall not covered by reserve"
            );
            warnings.push(format!(
                "Period {}: coupon shortfall of {} not covered by the reserve fund",
                rec.period, bond_rec.interest_shortfall
            ));
        }
        if bond_rec.is_terminal && bond_rec.principal_writedown > Decimal::ZERO {
            warnings.push(format!(
                "Period {}: bond principal of {} written down (losses or unfunded redemption)",
                rec.period, bond_rec.principal_writedown
            ));
        }
        if bond_rec.called {
            called_at = Some(rec.period);
        }

        balance = bond_rec.ending_balance;
        accrual_start = rec.payment_date;
        let done = bond_rec.is_terminal;
        records.push(bond_rec);
        progress.on_period(Stage::MbsCashflow, rec.period, total);

        if done {
            break;
        }
    }

    if balance > Decimal::ZERO {
        let msg = format!("Bond balance of {balance} outstanding at the end of the pool schedule");
        warn!(issue = %params.issue_id, "{msg}");
        warnings.push(msg);
    }

    Ok(BondSchedule {
        records,
        initial_balance,
        called_at,
        warnings,
    })
}

fn coupon_rate(formula: &CouponFormula, rec: &PoolPeriodRecord) -> Option<Rate> {
    let rate = match formula {
        CouponFormula::Fixed { rate } => *rate,
        CouponFormula::PoolYieldSpread { margin } => rec.wac - *margin,
        CouponFormula::ReferenceRateSpread { margin } => rec.reference_rate + *margin,
        CouponFormula::PassThrough => return None,
    };
    Some(rate.max(Decimal::ZERO))
}

fn waterfall_period(
    params: &IssueParameters,
    rec: &PoolPeriodRecord,
    beginning_balance: Money,
    year_fraction: Decimal,
    call: bool,
    reserve: &mut ReserveAccount,
) -> BondPeriodRecord {
    let reserve_beginning = reserve.balance();

    // --- Fees: interest, then collected principal, then the reserve ---
    let servicing_fee = round_money(params.bond.servicing_fee_rate * rec.beginning_balance * year_fraction);
    let guarantee_fee = round_money(params.bond.guarantee_fee_rate * rec.beginning_balance * year_fraction);
    let available_interest = rec.interest + rec.subsidy;
    let fee_excess = (servicing_fee + guarantee_fee - available_interest).max(Decimal::ZERO);
    let fee_from_principal = fee_excess.min(rec.principal_collected());
    let mut reserve_draw = reserve.draw(fee_excess - fee_from_principal);
    let fee_shortfall = fee_excess - fee_from_principal - reserve_draw;
    let interest_after_fees = (available_interest - servicing_fee - guarantee_fee).max(Decimal::ZERO);

    // --- Coupon ---
    let accrual_base = beginning_balance * year_fraction;
    let (coupon_rate, interest_due) = match coupon_rate(&params.bond.coupon, rec) {
        Some(rate) => (rate, round_money(accrual_base * rate)),
        None => {
            let rate = if accrual_base > Decimal::ZERO {
                (interest_after_fees / accrual_base).round_dp(RATE_DP)
            } else {
                Decimal::ZERO
            };
            (rate, interest_after_fees)
        }
    };
    let paid_from_interest = interest_due.min(interest_after_fees);
    let coupon_draw = reserve.draw(interest_due - paid_from_interest);
    reserve_draw += coupon_draw;
    let interest_paid = paid_from_interest + coupon_draw;
    let interest_shortfall = interest_due - interest_paid;

    // --- Reserve top-up from interest ---
    let interest_left = interest_after_fees - paid_from_interest;
    let reserve_contribution = reserve.top_up(interest_left, beginning_balance);
    let excess_interest = interest_left - reserve_contribution;

    // --- Principal ---
    let principal_collected = rec.principal_collected() - fee_from_principal;
    let retention_wanted = round_money(principal_collected * reserve.diversion_share());
    let reserve_principal_retention = reserve.top_up(retention_wanted, beginning_balance);
    let distributable = principal_collected - reserve_principal_retention;

    let scheduled_principal = rec
        .scheduled_principal
        .min(distributable)
        .min(beginning_balance)
        .max(Decimal::ZERO);
    let prepaid_principal = (distributable - scheduled_principal)
        .min(beginning_balance - scheduled_principal)
        .max(Decimal::ZERO);
    let mut residual_principal = distributable - scheduled_principal - prepaid_principal;

    // Losses are written down once the bond exceeds the remaining collateral.
    let after_principal = beginning_balance - scheduled_principal - prepaid_principal;
    let uncovered = (after_principal - rec.ending_balance).max(Decimal::ZERO);
    let mut principal_writedown = rec.loss_amount.min(uncovered).min(after_principal);
    let mut outstanding = after_principal - principal_writedown;

    // --- Redemption ---
    let is_terminal = rec.is_terminal || call || outstanding.is_zero();
    let mut redemption_principal = Decimal::ZERO;
    let mut call_collateral_proceeds = Decimal::ZERO;
    if call {
        call_collateral_proceeds = rec.ending_balance;
        let from_collateral = outstanding.min(call_collateral_proceeds);
        redemption_principal += from_collateral;
        residual_principal += call_collateral_proceeds - from_collateral;
        outstanding -= from_collateral;
    }
    if is_terminal && outstanding > Decimal::ZERO {
        let from_reserve = reserve.draw(outstanding);
        reserve_draw += from_reserve;
        redemption_principal += from_reserve;
        outstanding -= from_reserve;
        principal_writedown += outstanding;
        outstanding = Decimal::ZERO;
    }

    // --- Reserve release ---
    let reserve_release = if is_terminal {
        reserve.release_all()
    } else {
        reserve.release_excess(outstanding)
    };

    let total_cashflow = interest_paid + scheduled_principal + prepaid_principal + redemption_principal;

    BondPeriodRecord {
        period: rec.period,
        payment_date: rec.payment_date,
        beginning_balance,
        coupon_rate,
        interest_due,
        interest_paid,
        interest_shortfall,
        scheduled_principal,
        prepaid_principal,
        redemption_principal,
        principal_writedown,
        servicing_fee,
        guarantee_fee,
        fee_from_principal,
        fee_shortfall,
        reserve_beginning,
        reserve_contribution,
        reserve_principal_retention,
        reserve_draw,
        reserve_release,
        reserve_ending: reserve.balance(),
        excess_interest,
        residual_principal,
        call_collateral_proceeds,
        total_cashflow,
        ending_balance: outstanding,
        called: call,
        reserve_shortfall: interest_shortfall > Decimal::ZERO || fee_shortfall > Decimal::ZERO,
        is_terminal,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
