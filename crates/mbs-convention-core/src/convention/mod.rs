//! Issue-level orchestration of the four projection stages.
//!
//! A `Convention` owns the parameters of one issue and runs
//! macro model, pool cash flow, bond waterfall and pricing in order. Every
//! run starts from fresh state, so repeated calculations on the same issue
//! give identical results and issues never share anything.

pub mod params;
pub mod progress;
pub mod result;

use std::time::Instant;

use tracing::{debug, info_span};

use crate::error::{CalculationError, MbsError, Stage};
use crate::macro_model::project_rate_path;
use crate::mbs::project_bond_cashflows;
use crate::pool::{project_pool_cashflows, IncentiveCurve};
use crate::pricing::{price_bond, PricingInput};
use crate::types::{with_metadata, ComputationOutput};

pub use params::IssueParameters;
pub use progress::{NoProgress, ProgressObserver, TracingProgress};
pub use result::{CalculationResult, PeriodRow, SummaryRow};

pub struct Convention {
    params: IssueParameters,
    curve: Option<Box<dyn IncentiveCurve>>,
}

impl std::fmt::Debug for Convention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Convention")
            .field("issue_id", &self.params.issue_id)
            .field("custom_curve", &self.curve.is_some())
            .finish()
    }
}

impl Convention {
    /// Validate `params` and prepare the issue for calculation.
    pub fn new(params: IssueParameters) -> Result<Self, CalculationError> {
        params
            .validate()
            .map_err(|e| CalculationError::new(&params.issue_id, Stage::Configuration, e))?;
        Ok(Convention { params, curve: None })
    }

    /// Replace the configured incentive curve with a caller-supplied one.
    pub fn with_incentive_curve(mut self, curve: Box<dyn IncentiveCurve>) -> Self {
        self.curve = Some(curve);
        self
    }

    pub fn params(&self) -> &IssueParameters {
        &self.params
    }

    pub fn calculate(&self) -> Result<CalculationResult, CalculationError> {
        self.calculate_with_progress(&NoProgress)
    }

    pub fn calculate_with_progress(
        &self,
        progress: &dyn ProgressObserver,
    ) -> Result<CalculationResult, CalculationError> {
        self.run(&self.params.pricing, progress)
    }

    /// Run the pipeline with a pricing request other than the issue's own.
    pub fn calculate_priced(&self, pricing: &PricingInput) -> Result<CalculationResult, CalculationError> {
        self.run(pricing, &NoProgress)
    }

    fn run(
        &self,
        pricing: &PricingInput,
        progress: &dyn ProgressObserver,
    ) -> Result<CalculationResult, CalculationError> {
        let params = &self.params;
        let issue_id = params.issue_id.as_str();
        let fail = |stage: Stage| move |e: MbsError| CalculationError::new(issue_id, stage, e);
        let _span = info_span!("convention", issue = issue_id).entered();

        let rate_path = project_rate_path(
            &params.macro_model,
            i64::from(params.pool.horizon()),
            params.payment_frequency,
        )
        .map_err(fail(Stage::MacroModel))?;

        let configured;
        let curve: &dyn IncentiveCurve = match &self.curve {
            Some(curve) => curve.as_ref(),
            None => {
                configured = params.prepayment.curve.build();
                configured.as_ref()
            }
        };
        let pool = project_pool_cashflows(params, &rate_path, curve, progress)
            .map_err(fail(Stage::PoolCashflow))?;

        let bond = project_bond_cashflows(params, &pool, progress).map_err(fail(Stage::MbsCashflow))?;

        let pool_accrued_interest = pool.accrued_interest(params, pricing.settlement_date);
        let pricing = price_bond(params, &bond, pricing).map_err(fail(Stage::Pricing))?;

        let warnings: Vec<String> = rate_path
            .warnings
            .iter()
            .chain(&pool.warnings)
            .chain(&bond.warnings)
            .chain(&pricing.warnings)
            .cloned()
            .collect();
        debug!(
            pool_periods = pool.records.len(),
            bond_periods = bond.records.len(),
            warnings = warnings.len(),
            "calculation complete"
        );

        Ok(CalculationResult {
            issue_id: params.issue_id.clone(),
            rate_path,
            pool,
            pool_accrued_interest,
            bond,
            pricing,
            warnings,
        })
    }
}

/// Validate and calculate one issue, wrapped in the computation envelope.
pub fn calculate_issue(
    params: IssueParameters,
) -> Result<ComputationOutput<CalculationResult>, CalculationError> {
    let start = Instant::now();
    let convention = Convention::new(params)?;
    let result = convention.calculate_with_progress(&TracingProgress)?;
    let warnings = result.warnings.clone();
    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata(
        "MBS convention: macro rate path, pool cash flow, bond waterfall and pricing",
        convention.params(),
        warnings,
        elapsed,
        result,
    ))
}
