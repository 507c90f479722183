pub mod convention;
pub mod day_count;
pub mod error;
pub mod macro_model;
pub mod math;
pub mod mbs;
pub mod pool;
pub mod pricing;
pub mod types;

pub use convention::{calculate_issue, CalculationResult, Convention, IssueParameters};
pub use error::{CalculationError, MbsError, Stage};
pub use types::*;

/// Standard result type for all stage operations
pub type MbsResult<T> = Result<T, MbsError>;
