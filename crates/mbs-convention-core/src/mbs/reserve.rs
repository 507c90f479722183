//! Reserve fund account.

use rust_decimal::Decimal;

use crate::convention::params::ReserveFundTerms;
use crate::types::{round_money, Money};

/// Cash reserve held for the bond holders. An issue without reserve terms
/// gets an account with zero balance and zero target.
#[derive(Debug, Clone)]
pub struct ReserveAccount {
    balance: Money,
    terms: Option<ReserveFundTerms>,
}

impl ReserveAccount {
    pub fn new(terms: Option<&ReserveFundTerms>) -> Self {
        ReserveAccount {
            balance: terms.map(|t| round_money(t.initial_balance)).unwrap_or(Decimal::ZERO),
            terms: terms.cloned(),
        }
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    /// Required balance for an outstanding bond balance. Nothing is required
    /// once the bond is repaid.
    pub fn target(&self, bond_balance: Money) -> Money {
        match &self.terms {
            Some(t) if bond_balance > Decimal::ZERO => {
                round_money(t.target_rate * bond_balance).max(round_money(t.floor_amount))
            }
            _ => Decimal::ZERO,
        }
    }

    pub fn deficit(&self, bond_balance: Money) -> Money {
        (self.target(bond_balance) - self.balance).max(Decimal::ZERO)
    }

    pub fn diversion_share(&self) -> Decimal {
        self.terms
            .as_ref()
            .map(|t| t.principal_diversion_share)
            .unwrap_or(Decimal::ZERO)
    }

    /// Withdraw up to `amount`; returns what was actually drawn.
    pub fn draw(&mut self, amount: Money) -> Money {
        let drawn = amount.max(Decimal::ZERO).min(self.balance);
        self.balance -= drawn;
        drawn
    }

    /// Deposit up to the current deficit; returns the amount accepted.
    pub fn top_up(&mut self, available: Money, bond_balance: Money) -> Money {
        let accepted = available.max(Decimal::ZERO).min(self.deficit(bond_balance));
        self.balance += accepted;
        accepted
    }

    /// Release the balance above target.
    pub fn release_excess(&mut self, bond_balance: Money) -> Money {
        let excess = (self.balance - self.target(bond_balance)).max(Decimal::ZERO);
        self.balance -= excess;
        excess
    }

    pub fn release_all(&mut self) -> Money {
        std::mem::take(&mut self.balance)
    }
}
