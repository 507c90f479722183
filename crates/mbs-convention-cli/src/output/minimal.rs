use serde_json::Value;

use super::{Document, View};

/// Fields printed per issue, in order of preference.
const SUMMARY_KEYS: [&str; 2] = ["clean_price", "yield_to_maturity"];
/// Fields printed per period, in order of preference.
const PERIOD_KEYS: [&str; 2] = ["bond_total_cashflow", "pool_reference_rate"];
/// Fields printed per rate path point.
const POINT_KEYS: [&str; 1] = ["reference_rate"];

/// Print one line per issue (or per period, or per rate point) with the key
/// answer value.
pub fn print_minimal(document: &Document<'_>) {
    match *document {
        Document::Report { view, rows, report } => {
            let keys: &[&str] = match view {
                View::Summary => &SUMMARY_KEYS,
                View::Periods => &PERIOD_KEYS,
            };
            for row in rows {
                println!("{}", format_row(row, keys));
            }
            if let Some(Value::Array(failures)) = report.get("failures") {
                for f in failures {
                    println!(
                        "{}: failed ({})",
                        format_minimal(&f["issue_id"]),
                        format_minimal(&f["error"])
                    );
                }
            }
        }
        Document::Envelope { result, .. } => match result.get("points").and_then(Value::as_array) {
            Some(points) => {
                for point in points {
                    println!("{}", format_row(point, &POINT_KEYS));
                }
            }
            None => println!("{}", format_minimal(result)),
        },
        Document::Records(items) => {
            for item in items {
                println!("{}", format_minimal(item));
            }
        }
        Document::Fields(map) => println!("{}", serde_json::to_string(map).unwrap_or_default()),
        Document::Scalar(value) => println!("{}", format_minimal(value)),
    }
}

fn format_row(row: &Value, keys: &[&str]) -> String {
    let label = match (row.get("issue_id"), row.get("period")) {
        (Some(id), Some(period)) => format!("{} #{}", format_minimal(id), format_minimal(period)),
        (Some(id), None) => format_minimal(id),
        (None, Some(period)) => format!("#{}", format_minimal(period)),
        (None, None) => String::new(),
    };
    let answer = keys
        .iter()
        .find_map(|key| row.get(*key).filter(|v| !v.is_null()).map(|v| (key, v)));
    match answer {
        Some((key, v)) => format!("{}: {}={}", label, key, format_minimal(v)),
        None => label,
    }
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
