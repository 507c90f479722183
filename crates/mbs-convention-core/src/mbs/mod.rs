pub mod cashflow;
pub mod reserve;

pub use cashflow::{project_bond_cashflows, BondPeriodRecord, BondSchedule};
pub use reserve::ReserveAccount;
