use serde_json::Value;
use std::io::{self, Read};

/// Read an issue document piped on stdin, JSON first and YAML as fallback.
/// Returns None when stdin is a terminal or the pipe is empty.
pub fn read_stdin() -> Result<Option<Value>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;

    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => Ok(Some(value)),
        Err(json_err) => serde_yaml::from_str::<Value>(trimmed)
            .map(Some)
            .map_err(|yaml_err| {
                format!("stdin is neither JSON ({json_err}) nor YAML ({yaml_err})").into()
            }),
    }
}
