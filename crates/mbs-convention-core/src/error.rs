use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MbsError {
    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Invalid horizon: projection horizon {horizon} is negative")]
    InvalidHorizon { horizon: i64 },

    #[error("Negative balance: period {period} would end at {balance}")]
    NegativeBalance { period: u32, balance: Decimal },

    #[error("No convergence: {function} did not converge after {iterations} iterations (delta: {last_delta})")]
    NoConvergence {
        function: String,
        iterations: u32,
        last_delta: Decimal,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl MbsError {
    pub(crate) fn config(field: &str, reason: impl Into<String>) -> Self {
        MbsError::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Period index the failure refers to, when there is one.
    pub fn period(&self) -> Option<u32> {
        match self {
            MbsError::NegativeBalance { period, .. } => Some(*period),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for MbsError {
    fn from(e: serde_json::Error) -> Self {
        MbsError::Serialization(e.to_string())
    }
}

/// Pipeline stage, used to attribute failures and progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Configuration,
    MacroModel,
    PoolCashflow,
    MbsCashflow,
    Pricing,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Configuration => "configuration",
            Stage::MacroModel => "macro model",
            Stage::PoolCashflow => "pool cash flow",
            Stage::MbsCashflow => "MBS cash flow",
            Stage::Pricing => "pricing",
        };
        f.write_str(name)
    }
}

/// A stage failure with enough context for a caller running many issues to
/// report it and move on.
#[derive(Debug, Error)]
#[error("issue '{issue_id}' failed in {stage} stage: {source}")]
pub struct CalculationError {
    pub issue_id: String,
    pub stage: Stage,
    pub period: Option<u32>,
    #[source]
    pub source: MbsError,
}

impl CalculationError {
    pub fn new(issue_id: &str, stage: Stage, source: MbsError) -> Self {
        CalculationError {
            issue_id: issue_id.to_string(),
            stage,
            period: source.period(),
            source,
        }
    }
}
