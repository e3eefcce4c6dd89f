use serde_json::json;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Domain errors raised by the rubric catalog, the aggregation engine and
/// mark ingestion.
#[derive(Debug, Clone, PartialEq)]
pub enum GradeError {
    /// A stage id the catalog does not define. Never treated as zero weight.
    Configuration { track: String, stage_id: String },
    /// A catalog that breaks its own invariants (weights, maxima, criteria).
    InvalidCatalog { track: String, message: String },
    /// Input rejected before it reaches the append-only store.
    Validation {
        field: String,
        message: String,
        value: Option<serde_json::Value>,
    },
}

impl GradeError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
            value: None,
        }
    }

    pub fn validation_with(
        field: &str,
        message: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
            value: Some(value),
        }
    }

    /// Stable IPC error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration { .. } | Self::InvalidCatalog { .. } => "configuration_error",
            Self::Validation { .. } => "validation_error",
        }
    }

    pub fn details(&self) -> serde_json::Value {
        match self {
            Self::Configuration { track, stage_id } => {
                json!({ "track": track, "stageId": stage_id })
            }
            Self::InvalidCatalog { track, .. } => json!({ "track": track }),
            Self::Validation { field, value, .. } => match value {
                Some(v) => json!({ "field": field, "value": v }),
                None => json!({ "field": field }),
            },
        }
    }
}

impl Display for GradeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration { track, stage_id } => {
                write!(f, "unknown stage `{stage_id}` for track `{track}`")
            }
            Self::InvalidCatalog { track, message } => {
                write!(f, "invalid rubric catalog `{track}`: {message}")
            }
            Self::Validation { field, message, .. } => write!(f, "{field}: {message}"),
        }
    }
}

impl Error for GradeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let cfg = GradeError::Configuration {
            track: "research".into(),
            stage_id: "Presentation 9".into(),
        };
        assert_eq!(cfg.code(), "configuration_error");
        assert_eq!(cfg.details()["stageId"], "Presentation 9");
        assert!(cfg.to_string().contains("Presentation 9"));

        let v = GradeError::validation_with("rawScore", "out of range", json!(51.0));
        assert_eq!(v.code(), "validation_error");
        assert_eq!(v.details()["value"], json!(51.0));
    }
}
