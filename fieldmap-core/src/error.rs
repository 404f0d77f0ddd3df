//! Error types for the fieldmap core library.
//!
//! Uses `thiserror` for public API error types. Per-field failures
//! ([`FieldError`]) never abort a resolution pass; configuration-time
//! failures ([`MappingError`]) reject the whole call before any field runs.

use serde::{Deserialize, Serialize};

/// Top-level error for callers that set up an engine and then drive it.
#[derive(Debug, thiserror::Error)]
pub enum FieldmapError {
    #[error("Mapping configuration error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// A failure scoped to a single target field.
///
/// The orchestrator attaches these to their owning `targetField` and keeps
/// going with the remaining mappings.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    #[error("Unknown source reference: {source_id}")]
    UnknownSourceReference { source_id: String },

    #[error("Path '{path}' did not resolve in source '{source_id}'")]
    UnresolvedPath { source_id: String, path: String },

    #[error("Expression syntax error at offset {offset}: {message}")]
    ExpressionSyntax { offset: usize, message: String },

    #[error("Expression runtime error: {message}")]
    ExpressionRuntime { message: String },

    /// A reference inside an expression found no data. Reported as an
    /// `ExpressionRuntimeError`, but counts as absence for `required`.
    #[error("Expression runtime error: reference '{reference}' did not resolve")]
    UnresolvedReference { reference: String },

    #[error("Expression timed out: {message}")]
    ExpressionTimeout { message: String },

    /// `missing_data` is set when every failed token failed for lack of data.
    #[error("Template token error: {}", .tokens.join("; "))]
    TemplateToken {
        tokens: Vec<String>,
        missing_data: bool,
    },

    #[error("Validation failed: {}", .reasons.join("; "))]
    ValidationFailed { reasons: Vec<String> },
}

impl FieldError {
    /// Create a runtime error with a message.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::ExpressionRuntime {
            message: message.into(),
        }
    }

    /// The stable taxonomy code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            FieldError::UnknownSourceReference { .. } => ErrorCode::UnknownSourceReference,
            FieldError::UnresolvedPath { .. } => ErrorCode::UnresolvedPath,
            FieldError::ExpressionSyntax { .. } => ErrorCode::ExpressionSyntaxError,
            FieldError::ExpressionRuntime { .. } | FieldError::UnresolvedReference { .. } => {
                ErrorCode::ExpressionRuntimeError
            }
            FieldError::ExpressionTimeout { .. } => ErrorCode::ExpressionTimeout,
            FieldError::TemplateToken { .. } => ErrorCode::TemplateTokenError,
            FieldError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
        }
    }

    /// Whether this error means "no data was found" rather than "something broke".
    pub fn is_absence(&self) -> bool {
        matches!(
            self,
            FieldError::UnknownSourceReference { .. }
                | FieldError::UnresolvedPath { .. }
                | FieldError::UnresolvedReference { .. }
                | FieldError::TemplateToken {
                    missing_data: true,
                    ..
                }
        )
    }
}

/// Stable error codes shared by per-field and configuration-time errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    UnknownSourceReference,
    UnresolvedPath,
    ExpressionSyntaxError,
    ExpressionRuntimeError,
    ExpressionTimeout,
    TemplateTokenError,
    ValidationFailed,
    DuplicateTargetField,
    EmptyTargetField,
    InvalidTargetField,
    ConflictingTargetFields,
}

/// Wire shape of a per-field error inside a `ResolutionResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

impl From<&FieldError> for ErrorInfo {
    fn from(err: &FieldError) -> Self {
        let reasons = match err {
            FieldError::ValidationFailed { reasons } => reasons.clone(),
            FieldError::TemplateToken { tokens, .. } => tokens.clone(),
            _ => Vec::new(),
        };
        Self {
            code: err.code(),
            message: err.to_string(),
            reasons,
        }
    }
}

impl From<FieldError> for ErrorInfo {
    fn from(err: FieldError) -> Self {
        Self::from(&err)
    }
}

/// Configuration-time rejection of a mapping set, raised before resolution begins.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    #[error("Mapping at index {index} has an empty target field")]
    EmptyTargetField { index: usize },

    #[error("Invalid target field '{target}': {reason}")]
    InvalidTargetField { target: String, reason: String },

    #[error("Duplicate target field: {target}")]
    DuplicateTargetField { target: String },

    #[error("Target field '{child}' is nested inside target field '{parent}'")]
    ConflictingTargetFields { parent: String, child: String },
}

impl MappingError {
    /// The stable taxonomy code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            MappingError::EmptyTargetField { .. } => ErrorCode::EmptyTargetField,
            MappingError::InvalidTargetField { .. } => ErrorCode::InvalidTargetField,
            MappingError::DuplicateTargetField { .. } => ErrorCode::DuplicateTargetField,
            MappingError::ConflictingTargetFields { .. } => ErrorCode::ConflictingTargetFields,
        }
    }
}

/// Errors from function registry management.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Function already registered: {name}")]
    AlreadyRegistered { name: String },

    #[error("Function not found: {name}")]
    NotFound { name: String },

    #[error("Invalid function name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
}

/// Errors from configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration load error: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Configuration serialize error: {message}")]
    Serialize { message: String },
}

pub type Result<T> = std::result::Result<T, FieldmapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_error_display() {
        let err = FieldError::UnresolvedPath {
            source_id: "gmail".into(),
            path: "missing.field".into(),
        };
        assert_eq!(
            err.to_string(),
            "Path 'missing.field' did not resolve in source 'gmail'"
        );

        let err = FieldError::ValidationFailed {
            reasons: vec!["value is required".into(), "expected string".into()],
        };
        assert_eq!(
            err.to_string(),
            "Validation failed: value is required; expected string"
        );
    }

    #[test]
    fn test_error_info_carries_reasons() {
        let err = FieldError::ValidationFailed {
            reasons: vec!["too short".into()],
        };
        let info = ErrorInfo::from(&err);
        assert_eq!(info.code, ErrorCode::ValidationFailed);
        assert_eq!(info.reasons, vec!["too short".to_string()]);

        let info = ErrorInfo::from(FieldError::runtime("boom"));
        assert_eq!(info.code, ErrorCode::ExpressionRuntimeError);
        assert!(info.reasons.is_empty());
    }

    #[test]
    fn test_error_info_wire_shape() {
        let info = ErrorInfo::from(FieldError::UnknownSourceReference {
            source_id: "slack".into(),
        });
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["code"], "UnknownSourceReference");
        assert!(json.get("reasons").is_none());
    }

    #[test]
    fn test_absence_classification() {
        assert!(
            FieldError::UnknownSourceReference {
                source_id: "x".into()
            }
            .is_absence()
        );
        assert!(!FieldError::runtime("x").is_absence());

        let unresolved = FieldError::UnresolvedReference {
            reference: "gmail.cc".into(),
        };
        assert!(unresolved.is_absence());
        assert_eq!(unresolved.code(), ErrorCode::ExpressionRuntimeError);
        assert_eq!(
            unresolved.to_string(),
            "Expression runtime error: reference 'gmail.cc' did not resolve"
        );

        let tokens = vec!["{{gmail.cc}}: missing".to_string()];
        assert!(
            FieldError::TemplateToken {
                tokens: tokens.clone(),
                missing_data: true
            }
            .is_absence()
        );
        assert!(
            !FieldError::TemplateToken {
                tokens,
                missing_data: false
            }
            .is_absence()
        );
    }

    #[test]
    fn test_setup_errors_convert_to_top_level() {
        let err: FieldmapError = MappingError::DuplicateTargetField { target: "x".into() }.into();
        assert!(matches!(err, FieldmapError::Mapping(_)));
        assert_eq!(err.to_string(), "Mapping configuration error: Duplicate target field: x");

        let err: FieldmapError = ConfigError::InvalidValue {
            field: "expression.max_steps".into(),
            reason: "must be greater than zero".into(),
        }
        .into();
        assert!(matches!(err, FieldmapError::Config(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_mapping_error_codes() {
        let err = MappingError::DuplicateTargetField {
            target: "lead.email".into(),
        };
        assert_eq!(err.code(), ErrorCode::DuplicateTargetField);
        assert_eq!(err.to_string(), "Duplicate target field: lead.email");
    }
}
