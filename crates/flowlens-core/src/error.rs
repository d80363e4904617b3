use std::fmt;

use thiserror::Error;

use crate::model::ParseEnumError;

/// Machine-readable error codes for callers that branch on failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    InvalidTimezone,
    InvalidEnumValue,
    InvalidDateRange,
    StoreUnavailable,
    SchemaMismatch,
    UnhandledAggregateKey,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::InvalidTimezone => "E1002",
            Self::InvalidEnumValue => "E2001",
            Self::InvalidDateRange => "E2002",
            Self::StoreUnavailable => "E3001",
            Self::SchemaMismatch => "E3002",
            Self::UnhandledAggregateKey => "E4001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::InvalidTimezone => "Unknown timezone",
            Self::InvalidEnumValue => "Invalid state category/type/period value",
            Self::InvalidDateRange => "Invalid date range",
            Self::StoreUnavailable => "Snapshot store unavailable",
            Self::SchemaMismatch => "Snapshot store schema mismatch",
            Self::UnhandledAggregateKey => "Unhandled aggregate key",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .flowlens/config.toml and retry."),
            Self::InvalidTimezone => {
                Some("Use an IANA timezone name such as `UTC` or `Europe/London`.")
            }
            Self::InvalidEnumValue => {
                Some("Use one of the documented lowercase tokens, e.g. `inprogress` or `queue`.")
            }
            Self::InvalidDateRange => Some("Make sure the start date is not after the end date."),
            Self::StoreUnavailable => Some("Point --db at an existing snapshot store."),
            Self::SchemaMismatch => Some("Recreate the store with a matching flowlens version."),
            Self::UnhandledAggregateKey => Some(
                "Use one of: leadTime, wipAge, inventoryAge, flowEfficiency, throughput, cfd.",
            ),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Domain faults raised by the flow engine.
///
/// I/O failures travel as `anyhow::Error` with context; these variants
/// cover the cases a caller is expected to match on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowError {
    #[error("failed to parse {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("unknown timezone '{0}'")]
    InvalidTimezone(String),

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("invalid {expected}: '{got}'")]
    InvalidEnumValue { expected: &'static str, got: String },

    #[error("snapshot store {0} does not exist")]
    StoreNotFound(String),

    #[error("unhandled aggregate key '{0}'")]
    UnhandledAggregateKey(String),

    #[error("store schema version {found} does not match expected {expected}")]
    SchemaMismatch { found: u32, expected: u32 },
}

impl FlowError {
    /// The stable error code for this fault.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Self::InvalidTimezone(_) => ErrorCode::InvalidTimezone,
            Self::InvalidEnumValue { .. } => ErrorCode::InvalidEnumValue,
            Self::InvalidDateRange { .. } => ErrorCode::InvalidDateRange,
            Self::StoreNotFound(_) => ErrorCode::StoreUnavailable,
            Self::UnhandledAggregateKey(_) => ErrorCode::UnhandledAggregateKey,
            Self::SchemaMismatch { .. } => ErrorCode::SchemaMismatch,
        }
    }
}

impl From<ParseEnumError> for FlowError {
    fn from(err: ParseEnumError) -> Self {
        Self::InvalidEnumValue {
            expected: err.expected,
            got: err.got,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorCode, FlowError};
    use crate::model::StateCategory;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::ConfigParseError,
            ErrorCode::InvalidTimezone,
            ErrorCode::InvalidEnumValue,
            ErrorCode::InvalidDateRange,
            ErrorCode::StoreUnavailable,
            ErrorCode::SchemaMismatch,
            ErrorCode::UnhandledAggregateKey,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::UnhandledAggregateKey.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn flow_error_maps_to_code() {
        let err = FlowError::UnhandledAggregateKey("velocity".into());
        assert_eq!(err.code(), ErrorCode::UnhandledAggregateKey);
        assert_eq!(err.to_string(), "unhandled aggregate key 'velocity'");
    }

    #[test]
    fn enum_parse_failure_is_e2001() {
        let err = "archived".parse::<StateCategory>().unwrap_err();
        let flow = FlowError::from(err);
        assert_eq!(flow.code().code(), "E2001");
        assert!(flow.to_string().contains("'archived'"));
    }
}
