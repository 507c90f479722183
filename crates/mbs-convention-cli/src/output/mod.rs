pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use serde_json::{Map, Value};

use crate::OutputFormat;

/// Row set carried by a calculation report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// One row per issue
    Summary,
    /// One row per issue and payment period
    Periods,
}

/// Shape of a command's output document.
#[derive(Debug)]
pub enum Document<'a> {
    /// Multi-issue calculation report
    Report {
        view: View,
        rows: &'a [Value],
        report: &'a Map<String, Value>,
    },
    /// One computation wrapped with warnings and metadata
    Envelope {
        result: &'a Value,
        envelope: &'a Map<String, Value>,
    },
    Records(&'a [Value]),
    Fields(&'a Map<String, Value>),
    Scalar(&'a Value),
}

impl<'a> Document<'a> {
    pub fn classify(value: &'a Value) -> Self {
        match value {
            Value::Object(map) => match (map.get("rows"), map.get("result")) {
                (Some(Value::Array(rows)), _) => Document::Report {
                    view: match map.get("view").and_then(Value::as_str) {
                        Some("periods") => View::Periods,
                        _ => View::Summary,
                    },
                    rows,
                    report: map,
                },
                (_, Some(result)) => Document::Envelope { result, envelope: map },
                _ => Document::Fields(map),
            },
            Value::Array(items) => Document::Records(items),
            other => Document::Scalar(other),
        }
    }
}

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(&Document::classify(value)),
        OutputFormat::Csv => csv_out::print_csv(&Document::classify(value)),
        OutputFormat::Minimal => minimal::print_minimal(&Document::classify(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_report_view_is_read_from_document() {
        let periods = json!({ "view": "periods", "rows": [{ "issue_id": "A", "period": 1 }], "failures": [] });
        match Document::classify(&periods) {
            Document::Report { view, rows, .. } => {
                assert_eq!(view, View::Periods);
                assert_eq!(rows.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }

        let summary = json!({ "rows": [] });
        assert!(matches!(
            Document::classify(&summary),
            Document::Report { view: View::Summary, .. }
        ));
    }

    #[test]
    fn test_envelopes_and_plain_values_are_told_apart() {
        let envelope = json!({ "result": { "points": [] }, "warnings": [] });
        assert!(matches!(Document::classify(&envelope), Document::Envelope { .. }));
        assert!(matches!(Document::classify(&json!({ "a": 1 })), Document::Fields(_)));
        assert!(matches!(Document::classify(&json!([1, 2])), Document::Records(_)));
        assert!(matches!(Document::classify(&json!("done")), Document::Scalar(_)));
    }
}
