use serde::{Deserialize, Serialize};

use crate::{UtcDateTime, ValidationError};

pub const SCHEMA_VERSION: &str = "v1";

/// Machine-readable output wrapper for every `fairval` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub meta: EnvelopeMeta,
    pub data: T,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<EnvelopeError>,
}

impl<T> Envelope<T> {
    pub fn success(meta: EnvelopeMeta, data: T) -> Self {
        Self {
            meta,
            data,
            errors: Vec::new(),
        }
    }

    pub fn with_errors(meta: EnvelopeMeta, data: T, errors: Vec<EnvelopeError>) -> Self {
        Self { meta, data, errors }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeMeta {
    pub request_id: String,
    pub schema_version: String,
    pub generated_at: UtcDateTime,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl EnvelopeMeta {
    pub fn new(request_id: impl Into<String>, latency_ms: u64) -> Result<Self, ValidationError> {
        let request_id = request_id.into();
        if request_id.trim().len() < 8 {
            return Err(ValidationError::InvalidRequestId);
        }
        Ok(Self {
            request_id,
            schema_version: String::from(SCHEMA_VERSION),
            generated_at: UtcDateTime::now(),
            latency_ms,
            warnings: Vec::new(),
        })
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

/// One per-item failure carried alongside partial data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

impl EnvelopeError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            symbol: None,
        }
    }

    pub fn for_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_request_id_is_rejected() {
        assert_eq!(
            EnvelopeMeta::new("abc", 0),
            Err(ValidationError::InvalidRequestId)
        );
    }

    #[test]
    fn empty_errors_are_omitted_from_json() {
        let meta = EnvelopeMeta::new("0b0c3f0e-request", 12).expect("meta");
        let envelope = Envelope::success(meta, serde_json::json!({"ok": true}));

        let json = serde_json::to_value(&envelope).expect("serialize");
        assert!(json.get("errors").is_none());
        assert_eq!(json["meta"]["schema_version"], "v1");
        assert!(json["meta"].get("warnings").is_none());
    }

    #[test]
    fn symbol_errors_serialize_with_symbol() {
        let error = EnvelopeError::new("run.skipped", "no earnings").for_symbol("KO");
        let json = serde_json::to_value(&error).expect("serialize");
        assert_eq!(json["symbol"], "KO");
    }
}
