//! JSON output for results and errors.
//!
//! Results go to stdout as pretty JSON. Errors go to stderr wrapped as
//! `{"error": {...}}` so callers can branch on `error_code`.

use flowlens_core::error::FlowError;
use serde::Serialize;
use std::io::{self, Write};

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Stable `E####` code when the failure is a known domain fault.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl From<&anyhow::Error> for CliError {
    fn from(err: &anyhow::Error) -> Self {
        let code = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<FlowError>())
            .map(FlowError::code);
        Self {
            message: format!("{err:#}"),
            suggestion: code.and_then(|c| c.hint()).map(str::to_string),
            error_code: code.map(|c| c.code().to_string()),
        }
    }
}

/// Write `value` to stdout as pretty JSON.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn render_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Write `error` to stderr as `{"error": ...}`.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn render_error(error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    let wrapper = serde_json::json!({ "error": error });
    serde_json::to_writer_pretty(&mut out, &wrapper)?;
    writeln!(out)?;
    Ok(())
}
