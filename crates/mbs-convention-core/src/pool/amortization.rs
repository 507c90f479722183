//! Contractual amortization of a cohort's remaining balance.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::math::iterative_pow_recip;
use crate::types::{Money, Rate};

/// Repayment profile of a cohort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentType {
    /// Level total payment (principal + interest)
    #[default]
    Annuity,
    /// Equal principal instalments
    Differentiated,
}

/// Level payment for `balance` over `remaining` periods at `period_rate`.
pub fn annuity_payment(balance: Money, period_rate: Rate, remaining: u32) -> Money {
    if remaining == 0 {
        return balance;
    }
    if period_rate <= Decimal::ZERO {
        return balance / Decimal::from(remaining);
    }
    let denom = Decimal::ONE - iterative_pow_recip(Decimal::ONE + period_rate, remaining);
    if denom > Decimal::ZERO {
        balance * period_rate / denom
    } else {
        balance
    }
}

/// Scheduled principal for one period, bounded to [0, balance].
///
/// The final remaining period always repays the whole balance.
pub fn scheduled_principal(
    balance: Money,
    annual_rate: Rate,
    periods_per_year: u32,
    remaining: u32,
    payment_type: PaymentType,
) -> Money {
    if balance <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    if remaining <= 1 {
        return balance;
    }
    let period_rate = annual_rate / Decimal::from(periods_per_year);

    let principal = match payment_type {
        PaymentType::Differentiated => balance / Decimal::from(remaining),
        PaymentType::Annuity if period_rate <= Decimal::ZERO => balance / Decimal::from(remaining),
        PaymentType::Annuity => {
            annuity_payment(balance, period_rate, remaining) - balance * period_rate
        }
    };

    principal.max(Decimal::ZERO).min(balance)
}
