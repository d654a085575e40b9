use thiserror::Error;

/// Validation errors for values entering the domain from operators or storage.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("stored timestamp must be 'YYYY-MM-DD HH:MM:SS': '{value}'")]
    InvalidStoredTimestamp { value: String },
    #[error("date must be 'YYYY-MM-DD': '{value}'")]
    InvalidDate { value: String },

    #[error("invalid valuation method '{value}', expected EPS or FCF")]
    InvalidMethod { value: String },
    #[error("field '{field}' is not a valid decimal: '{value}'")]
    InvalidDecimal { field: &'static str, value: String },
    #[error("field '{field}' allows at most {max_scale} decimal places")]
    DecimalTooPrecise { field: &'static str, max_scale: u32 },

    #[error("request id must have at least 8 characters")]
    InvalidRequestId,
}
