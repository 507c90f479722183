use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::{Document, View};

/// Format output as tables using the tabled crate.
pub fn print_table(document: &Document<'_>) {
    match *document {
        Document::Report { view, rows, report } => print_report(view, rows, report),
        Document::Envelope { result, envelope } => print_result_table(result, envelope),
        Document::Records(items) => print_array_table(items),
        Document::Fields(map) => print_flat_object(map),
        Document::Scalar(value) => println!("{}", value),
    }
}

/// Multi-issue report: the selected rows, then failures and warnings.
/// Period rows get one table per issue.
fn print_report(view: View, rows: &[Value], report: &Map<String, Value>) {
    match view {
        View::Summary => print_array_table(rows),
        View::Periods => {
            for (issue_id, issue_rows) in rows_by_issue(rows) {
                println!("\n{}:", issue_id);
                print_array_table(&issue_rows);
            }
        }
    }

    if let Some(Value::Array(failures)) = report.get("failures") {
        if !failures.is_empty() {
            println!("\nFailed issues:");
            print_array_table(failures);
        }
    }
    print_warnings(report);
}

/// Consecutive rows sharing an issue id.
fn rows_by_issue(rows: &[Value]) -> Vec<(String, Vec<Value>)> {
    let mut groups: Vec<(String, Vec<Value>)> = Vec::new();
    for row in rows {
        let issue_id = row.get("issue_id").map(format_value).unwrap_or_default();
        if let Some((id, group)) = groups.last_mut() {
            if *id == issue_id {
                group.push(row.clone());
                continue;
            }
        }
        groups.push((issue_id, vec![row.clone()]));
    }
    groups
}

fn print_result_table(result: &Value, envelope: &Map<String, Value>) {
    if let Value::Object(res_map) = result {
        // scalar fields first, then one table per list of records
        let mut builder = Builder::default();
        builder.push_record(["Field", "Value"]);
        let mut nested = Vec::new();
        for (key, val) in res_map {
            match val {
                Value::Array(items) if items.first().is_some_and(Value::is_object) => {
                    nested.push((key, items));
                }
                _ => {
                    builder.push_record([key.as_str(), &format_value(val)]);
                }
            }
        }
        println!("{}", Table::from(builder));
        for (key, items) in nested {
            println!("\n{}:", key);
            print_array_table(items);
        }
    } else {
        print_flat_object(envelope);
    }

    print_warnings(envelope);

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_warnings(envelope: &Map<String, Value>) {
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }
}

fn print_flat_object(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        builder.push_record([key.as_str(), &format_value(val)]);
    }
    println!("{}", Table::from(builder));
}

fn print_array_table(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
        }

        println!("{}", Table::from(builder));
    } else {
        for item in arr {
            println!("{}", format_value(item));
        }
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        Value::Array(arr) => arr.iter().map(format_value).collect::<Vec<_>>().join(", "),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
