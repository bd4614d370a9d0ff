//! CLI stdout parsing

use serde_json::Value;

use crate::error::{Error, Result};

/// Parse stdout as one JSON document, else as NDJSON (one value per line).
///
/// NDJSON output becomes an array. Anything else is a malformed response so
/// the next candidate gets a turn.
pub fn parse_cli_output(stdout: &str) -> Result<Value> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(Error::MalformedResponse("CLI produced no output".to_string()));
    }

    let whole_err = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let lines: Vec<&str> = trimmed.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.len() > 1 {
        let parsed: std::result::Result<Vec<Value>, _> =
            lines.iter().map(|line| serde_json::from_str::<Value>(line)).collect();
        if let Ok(values) = parsed {
            return Ok(Value::Array(values));
        }
    }

    Err(Error::MalformedResponse(format!(
        "CLI output is neither JSON nor NDJSON ({}): {}",
        whole_err,
        preview(trimmed)
    )))
}

fn preview(text: &str) -> String {
    const MAX: usize = 120;
    let mut out: String = text.chars().take(MAX).collect();
    if text.chars().count() > MAX {
        out.push_str("...");
    }
    out
}
