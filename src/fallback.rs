//! Ordered fallback chain
//!
//! Socket method synonyms, HTTP tool synonyms and CLI invocation candidates
//! all follow the same loop: try each candidate in order, record what
//! happened, return the first success. This module is that loop.

use futures::future::BoxFuture;
use std::fmt::Display;

use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};

/// Try `candidates` strictly in order until one succeeds.
///
/// Returns the winning candidate alongside its value. A terminal error
/// (authentication failure) stops the chain immediately. When every
/// candidate fails the last error is returned; an empty candidate list
/// yields [`Error::ExhaustedFallback`].
///
/// Attempts are boxed `Send` futures so the chain can run inside
/// `#[async_trait]` methods.
pub async fn first_success<'a, C, T, F>(
    label: &str,
    candidates: Vec<C>,
    diagnostics: &mut Diagnostics,
    mut attempt: F,
) -> Result<(C, T)>
where
    C: Display + Clone,
    F: FnMut(C) -> BoxFuture<'a, Result<T>>,
{
    let mut last_error: Option<Error> = None;

    for candidate in candidates {
        match attempt(candidate.clone()).await {
            Ok(value) => {
                diagnostics.push(format!("{}: {} succeeded", label, candidate));
                return Ok((candidate, value));
            }
            Err(err) if err.is_terminal() => {
                diagnostics.push(format!("{}: {} rejected credentials: {}", label, candidate, err));
                return Err(err);
            }
            Err(err) => {
                diagnostics.push(format!("{}: {} failed: {}", label, candidate, err));
                last_error = Some(err);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        Error::exhausted(format!("{}: no candidates to try", label), diagnostics.clone())
    }))
}
