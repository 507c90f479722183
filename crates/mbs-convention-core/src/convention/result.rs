use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::macro_model::RatePath;
use crate::mbs::{BondPeriodRecord, BondSchedule};
use crate::pool::{AccruedPoolInterest, PoolPeriodRecord, PoolSchedule};
use crate::pricing::PricingResult;
use crate::types::{Money, Rate, Years};

/// Everything one calculation run produced for an issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationResult {
    pub issue_id: String,
    pub rate_path: RatePath,
    pub pool: PoolSchedule,
    /// Borrower interest accrued at the pricing settlement date
    pub pool_accrued_interest: AccruedPoolInterest,
    pub bond: BondSchedule,
    pub pricing: PricingResult,
    /// Stage warnings in pipeline order
    pub warnings: Vec<String>,
}

/// Pool and bond cash flows of one period, flattened for export. Every pool
/// record field appears with a `pool_` prefix, every bond record field with
/// a `bond_` prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodRow {
    pub issue_id: String,
    pub period: u32,
    pub payment_date: NaiveDate,

    pub pool_beginning_balance: Money,
    pub pool_scheduled_principal: Money,
    pub pool_prepaid_principal: Money,
    pub pool_default_amount: Money,
    pub pool_loss_amount: Money,
    pub pool_recovery_amount: Money,
    pub pool_interest: Money,
    pub pool_subsidy: Money,
    pub pool_ending_balance: Money,
    pub pool_cpr: Rate,
    pub pool_cdr: Rate,
    pub pool_wac: Rate,
    pub pool_reference_rate: Rate,
    pub pool_refinancing_rate: Rate,
    pub pool_incentive: Rate,
    pub pool_is_terminal: bool,

    pub bond_beginning_balance: Money,
    pub bond_coupon_rate: Rate,
    pub bond_interest_due: Money,
    pub bond_interest_paid: Money,
    pub bond_interest_shortfall: Money,
    pub bond_scheduled_principal: Money,
    pub bond_prepaid_principal: Money,
    pub bond_redemption_principal: Money,
    /// Scheduled, prepaid and redemption principal together
    pub bond_principal_paid: Money,
    pub bond_principal_writedown: Money,
    pub bond_servicing_fee: Money,
    pub bond_guarantee_fee: Money,
    pub bond_fee_from_principal: Money,
    pub bond_fee_shortfall: Money,
    pub bond_reserve_beginning: Money,
    pub bond_reserve_contribution: Money,
    pub bond_reserve_principal_retention: Money,
    pub bond_reserve_draw: Money,
    pub bond_reserve_release: Money,
    pub bond_reserve_ending: Money,
    pub bond_excess_interest: Money,
    pub bond_residual_principal: Money,
    pub bond_call_collateral_proceeds: Money,
    pub bond_total_cashflow: Money,
    pub bond_ending_balance: Money,
    pub bond_called: bool,
    pub bond_reserve_shortfall: bool,
    pub bond_is_terminal: bool,
}

/// One-line summary of an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub issue_id: String,
    pub pool_initial_balance: Money,
    pub bond_initial_balance: Money,
    pub pool_loan_count: u32,
    pub pool_wac: Rate,
    pub pool_wam: Years,
    pub pool_periods: u32,
    pub bond_periods: u32,
    pub called_at: Option<u32>,
    pub total_pool_interest: Money,
    pub total_prepayments: Money,
    pub total_losses: Money,
    pub pool_accrued_interest: Money,
    pub total_bond_interest: Money,
    pub total_bond_principal: Money,
    pub total_writedowns: Money,
    pub shortfall_periods: u32,
    pub dirty_price: Decimal,
    pub clean_price: Decimal,
    pub yield_to_maturity: Rate,
    pub weighted_average_life: Years,
    pub modified_duration: Decimal,
    pub z_spread_bps: Option<Decimal>,
    pub warnings: u32,
}

impl CalculationResult {
    /// Join pool and bond records by period. Periods after the bond has
    /// retired carry zero bond amounts; a called issue ends at the call.
    pub fn period_table(&self) -> Vec<PeriodRow> {
        let last_period = self.bond.called_at.unwrap_or(u32::MAX);
        self.pool
            .records
            .iter()
            .take_while(|p| p.period <= last_period)
            .map(|p| {
                let bond = self.bond.records.iter().find(|b| b.period == p.period);
                self.row(p, bond)
            })
            .collect()
    }

    fn row(&self, p: &PoolPeriodRecord, b: Option<&BondPeriodRecord>) -> PeriodRow {
        let zero = Decimal::ZERO;
        let amount = |f: fn(&BondPeriodRecord) -> Money| b.map_or(zero, f);
        let flag = |f: fn(&BondPeriodRecord) -> bool| b.is_some_and(f);
        PeriodRow {
            issue_id: self.issue_id.clone(),
            period: p.period,
            payment_date: p.payment_date,

            pool_beginning_balance: p.beginning_balance,
            pool_scheduled_principal: p.scheduled_principal,
            pool_prepaid_principal: p.prepaid_principal,
            pool_default_amount: p.default_amount,
            pool_loss_amount: p.loss_amount,
            pool_recovery_amount: p.recovery_amount,
            pool_interest: p.interest,
            pool_subsidy: p.subsidy,
            pool_ending_balance: p.ending_balance,
            pool_cpr: p.cpr,
            pool_cdr: p.cdr,
            pool_wac: p.wac,
            pool_reference_rate: p.reference_rate,
            pool_refinancing_rate: p.refinancing_rate,
            pool_incentive: p.incentive,
            pool_is_terminal: p.is_terminal,

            bond_beginning_balance: amount(|b| b.beginning_balance),
            bond_coupon_rate: amount(|b| b.coupon_rate),
            bond_interest_due: amount(|b| b.interest_due),
            bond_interest_paid: amount(|b| b.interest_paid),
            bond_interest_shortfall: amount(|b| b.interest_shortfall),
            bond_scheduled_principal: amount(|b| b.scheduled_principal),
            bond_prepaid_principal: amount(|b| b.prepaid_principal),
            bond_redemption_principal: amount(|b| b.redemption_principal),
            bond_principal_paid: amount(|b| b.principal_paid()),
            bond_principal_writedown: amount(|b| b.principal_writedown),
            bond_servicing_fee: amount(|b| b.servicing_fee),
            bond_guarantee_fee: amount(|b| b.guarantee_fee),
            bond_fee_from_principal: amount(|b| b.fee_from_principal),
            bond_fee_shortfall: amount(|b| b.fee_shortfall),
            bond_reserve_beginning: amount(|b| b.reserve_beginning),
            bond_reserve_contribution: amount(|b| b.reserve_contribution),
            bond_reserve_principal_retention: amount(|b| b.reserve_principal_retention),
            bond_reserve_draw: amount(|b| b.reserve_draw),
            bond_reserve_release: amount(|b| b.reserve_release),
            bond_reserve_ending: amount(|b| b.reserve_ending),
            bond_excess_interest: amount(|b| b.excess_interest),
            bond_residual_principal: amount(|b| b.residual_principal),
            bond_call_collateral_proceeds: amount(|b| b.call_collateral_proceeds),
            bond_total_cashflow: amount(|b| b.total_cashflow),
            bond_ending_balance: amount(|b| b.ending_balance),
            bond_called: flag(|b| b.called),
            bond_reserve_shortfall: flag(|b| b.reserve_shortfall),
            bond_is_terminal: flag(|b| b.is_terminal),
        }
    }

    pub fn summary_row(&self) -> SummaryRow {
        let pool = &self.pool.records;
        let bond = &self.bond.records;
        let stats = &self.pool.statistics.total;
        SummaryRow {
            issue_id: self.issue_id.clone(),
            pool_initial_balance: self.pool.initial_balance,
            bond_initial_balance: self.bond.initial_balance,
            pool_loan_count: stats.loan_count,
            pool_wac: stats.wac,
            pool_wam: stats.wam,
            pool_periods: pool.len() as u32,
            bond_periods: bond.len() as u32,
            called_at: self.bond.called_at,
            total_pool_interest: pool.iter().map(|r| r.interest).sum(),
            total_prepayments: pool.iter().map(|r| r.prepaid_principal).sum(),
            total_losses: pool.iter().map(|r| r.loss_amount).sum(),
            pool_accrued_interest: self.pool_accrued_interest.total,
            total_bond_interest: bond.iter().map(|r| r.interest_paid).sum(),
            total_bond_principal: bond.iter().map(|r| r.principal_paid()).sum(),
            total_writedowns: bond.iter().map(|r| r.principal_writedown).sum(),
            shortfall_periods: self.bond.shortfall_periods().len() as u32,
            dirty_price: self.pricing.dirty_price,
            clean_price: self.pricing.clean_price,
            yield_to_maturity: self.pricing.yield_to_maturity,
            weighted_average_life: self.pricing.weighted_average_life,
            modified_duration: self.pricing.modified_duration,
            z_spread_bps: self.pricing.z_spread_bps,
            warnings: self.warnings.len() as u32,
        }
    }
}
