use clap::{Args, ValueEnum};
use serde_json::{json, Value};
use tracing::{error, info};

use mbs_convention_core::convention::{calculate_issue, IssueParameters};

use crate::input;

/// Which joined table the report carries for table and CSV output
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum TableView {
    /// One row per issue
    #[default]
    Summary,
    /// One row per issue and payment period
    Periods,
}

/// Arguments for the full issue calculation
#[derive(Args)]
pub struct CalculateArgs {
    /// Path to a JSON or YAML file holding one issue or a list of issues
    #[arg(long)]
    pub input: Option<String>,

    /// Comma-separated issue identifiers to run (default: all)
    #[arg(long, value_delimiter = ',')]
    pub issues: Option<Vec<String>>,

    /// Rows to include for table and CSV output
    #[arg(long, value_enum, default_value = "summary")]
    pub table: TableView,
}

pub fn run_calculate(args: CalculateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let document = if let Some(ref path) = args.input {
        input::file::read_value(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        return Err("--input <issues.json|yaml> or stdin required for calculate".into());
    };

    let all = parse_issues(document)?;
    let selected = select_issues(all, args.issues.as_deref())?;

    let mut rows = Vec::new();
    let mut outputs = Vec::new();
    let mut failures = Vec::new();
    let mut warnings = Vec::new();

    for params in selected {
        let issue_id = params.issue_id.clone();
        info!(issue = %issue_id, "calculating");
        match calculate_issue(params) {
            Ok(output) => {
                match args.table {
                    TableView::Summary => rows.push(serde_json::to_value(output.result.summary_row())?),
                    TableView::Periods => {
                        for row in output.result.period_table() {
                            rows.push(serde_json::to_value(row)?);
                        }
                    }
                }
                warnings.extend(output.warnings.iter().map(|w| format!("{issue_id}: {w}")));
                outputs.push(serde_json::to_value(output)?);
            }
            Err(e) => {
                error!(issue = %e.issue_id, stage = %e.stage, "{}", e.source);
                failures.push(json!({
                    "issue_id": e.issue_id,
                    "stage": e.stage,
                    "period": e.period,
                    "error": e.source.to_string(),
                }));
            }
        }
    }

    if outputs.is_empty() {
        let reasons: Vec<String> = failures
            .iter()
            .map(|f| format!("{} ({})", f["issue_id"].as_str().unwrap_or("?"), f["error"].as_str().unwrap_or("?")))
            .collect();
        return Err(format!("every issue failed: {}", reasons.join("; ")).into());
    }

    let view = match args.table {
        TableView::Summary => "summary",
        TableView::Periods => "periods",
    };
    Ok(json!({
        "view": view,
        "rows": rows,
        "issues": outputs,
        "failures": failures,
        "warnings": warnings,
    }))
}

/// Accept a single issue object or an array of issues.
fn parse_issues(document: Value) -> Result<Vec<IssueParameters>, Box<dyn std::error::Error>> {
    let issues = match document {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<IssueParameters>, _>>()?,
        single => vec![serde_json::from_value(single)?],
    };
    if issues.is_empty() {
        return Err("input holds no issues".into());
    }
    Ok(issues)
}

fn select_issues(
    issues: Vec<IssueParameters>,
    wanted: Option<&[String]>,
) -> Result<Vec<IssueParameters>, Box<dyn std::error::Error>> {
    let Some(wanted) = wanted else {
        return Ok(issues);
    };
    let unknown: Vec<&str> = wanted
        .iter()
        .filter(|id| !issues.iter().any(|p| &p.issue_id == *id))
        .map(|id| id.as_str())
        .collect();
    if !unknown.is_empty() {
        return Err(format!("unknown issue id(s): {}", unknown.join(", ")).into());
    }
    Ok(issues
        .into_iter()
        .filter(|p| wanted.contains(&p.issue_id))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue_json(id: &str) -> Value {
        json!({
            "issue_id": id,
            "issue_date": "2024-01-01",
            "first_payment_date": "2024-02-01",
            "pool": { "cohorts": [
                { "name": "all", "balance": "1000000", "wac": "0.09", "remaining_term_periods": 60 }
            ] },
            "macro_model": { "current_rate": "0.06" },
            "bond": { "coupon": { "Fixed": { "rate": "0.07" } } },
            "pricing": {
                "settlement_date": "2024-01-01",
                "discount": { "FlatYield": { "yield_rate": "0.07" } }
            }
        })
    }

    #[test]
    fn test_single_and_list_documents_parse() {
        assert_eq!(parse_issues(issue_json("A")).unwrap().len(), 1);
        let list = Value::Array(vec![issue_json("A"), issue_json("B")]);
        assert_eq!(parse_issues(list).unwrap().len(), 2);
        assert!(parse_issues(Value::Array(vec![])).is_err());
    }

    #[test]
    fn test_selection_keeps_file_order_and_rejects_unknown_ids() {
        let list = Value::Array(vec![issue_json("A"), issue_json("B"), issue_json("C")]);
        let issues = parse_issues(list).unwrap();
        let wanted = vec!["C".to_string(), "A".to_string()];
        let picked = select_issues(issues.clone(), Some(wanted.as_slice())).unwrap();
        let ids: Vec<&str> = picked.iter().map(|p| p.issue_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "C"]);

        let wanted = vec!["Z".to_string()];
        assert!(select_issues(issues, Some(wanted.as_slice())).is_err());
    }
}
