pub mod amortization;
pub mod cashflow;
pub mod incentive;
pub mod statistics;

pub use amortization::PaymentType;
pub use cashflow::{project_pool_cashflows, PoolPart, PoolPeriodRecord, PoolSchedule};
pub use incentive::{IncentiveCurve, IncentiveCurveSpec, SCurveBetas};
pub use statistics::{AccruedPoolInterest, PartStatistics, PoolStatistics};
