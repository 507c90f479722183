use napi::Result as NapiResult;
use napi_derive::napi;
use serde::Serialize;

use mbs_convention_core::convention::{calculate_issue as run_issue, Convention, IssueParameters};
use mbs_convention_core::macro_model::MacroModelConfig;
use mbs_convention_core::pricing::PricingInput;
use mbs_convention_core::types::ComputationOutput;
use mbs_convention_core::{CalculationResult, Stage};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Convention
// ---------------------------------------------------------------------------

#[napi]
pub fn calculate_issue(input_json: String) -> NapiResult<String> {
    let params: IssueParameters = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = run_issue(params).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

/// Outcome of one issue in a batch; exactly one of `output` and `error` is set.
#[derive(Serialize)]
struct IssueOutcome {
    issue_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<ComputationOutput<CalculationResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Run a list of issues independently; a failing issue is reported in its
/// slot and does not stop the others.
#[napi]
pub fn calculate_issues(input_json: String) -> NapiResult<String> {
    let issues: Vec<IssueParameters> = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let outcomes: Vec<IssueOutcome> = issues
        .into_iter()
        .map(|params| {
            let issue_id = params.issue_id.clone();
            match run_issue(params) {
                Ok(output) => IssueOutcome {
                    issue_id,
                    output: Some(output),
                    stage: None,
                    error: None,
                },
                Err(e) => IssueOutcome {
                    issue_id,
                    output: None,
                    stage: Some(e.stage),
                    error: Some(e.source.to_string()),
                },
            }
        })
        .collect();
    serde_json::to_string(&outcomes).map_err(to_napi_error)
}

#[napi]
pub fn price_issue(input_json: String, pricing_json: String) -> NapiResult<String> {
    let params: IssueParameters = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let pricing: PricingInput = serde_json::from_str(&pricing_json).map_err(to_napi_error)?;
    let convention = Convention::new(params).map_err(to_napi_error)?;
    let result = convention.calculate_priced(&pricing).map_err(to_napi_error)?;
    serde_json::to_string(&result.pricing).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Macro model
// ---------------------------------------------------------------------------

#[napi]
pub fn project_rate_path(input_json: String, horizon: i64, periods_per_year: u32) -> NapiResult<String> {
    let config: MacroModelConfig = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let path = mbs_convention_core::macro_model::project_rate_path(&config, horizon, periods_per_year)
        .map_err(to_napi_error)?;
    serde_json::to_string(&path).map_err(to_napi_error)
}
