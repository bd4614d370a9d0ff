//! Diagnostics trail
//!
//! An append-only list of human-readable lines describing every attempt made
//! during one logical call. Lines are only ever pushed or appended in order.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Ordered, append-only trace of a call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<String>);

impl Diagnostics {
    /// Create an empty trail
    pub fn new() -> Self {
        Diagnostics(Vec::new())
    }

    /// Append one line
    pub fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        debug!(target: "clawbridge::diagnostics", "{}", line);
        self.0.push(line);
    }

    /// Append every line of another trail, preserving its order
    pub fn append(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    /// All lines so far
    pub fn lines(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether any line mentions `needle`
    pub fn mentions(&self, needle: &str) -> bool {
        self.0.iter().any(|l| l.contains(needle))
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.0 {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

impl From<Vec<String>> for Diagnostics {
    fn from(lines: Vec<String>) -> Self {
        Diagnostics(lines)
    }
}
