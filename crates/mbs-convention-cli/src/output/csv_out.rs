use serde_json::{Map, Value};
use std::io;

use super::Document;

/// Write output as CSV to stdout. Reports write their selected rows,
/// whichever view they carry.
pub fn print_csv(document: &Document<'_>) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    match *document {
        Document::Report { rows, .. } => write_array_csv(&mut wtr, rows),
        Document::Envelope { result: Value::Object(result), .. } => match first_record_list(result) {
            Some(records) => write_array_csv(&mut wtr, records),
            None => write_field_value(&mut wtr, result),
        },
        Document::Envelope { envelope, .. } => write_field_value(&mut wtr, envelope),
        Document::Records(items) => write_array_csv(&mut wtr, items),
        Document::Fields(map) => write_field_value(&mut wtr, map),
        Document::Scalar(value) => {
            let _ = wtr.write_record([&format_csv_value(value)]);
        }
    }

    let _ = wtr.flush();
}

/// The first field holding a list of records, e.g. rate path points.
fn first_record_list(map: &Map<String, Value>) -> Option<&Vec<Value>> {
    map.values().find_map(|v| match v {
        Value::Array(items) if items.first().is_some_and(Value::is_object) => Some(items),
        _ => None,
    })
}

fn write_field_value(wtr: &mut csv::Writer<io::StdoutLock<'_>>, map: &Map<String, Value>) {
    let _ = wtr.write_record(["field", "value"]);
    for (key, val) in map {
        let _ = wtr.write_record([key.as_str(), &format_csv_value(val)]);
    }
}

fn write_array_csv(wtr: &mut csv::Writer<io::StdoutLock<'_>>, arr: &[Value]) {
    if arr.is_empty() {
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
        let _ = wtr.write_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(*h).map(format_csv_value).unwrap_or_default())
                    .collect();
                let _ = wtr.write_record(&row);
            }
        }
    } else {
        for item in arr {
            let _ = wtr.write_record([&format_csv_value(item)]);
        }
    }
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
