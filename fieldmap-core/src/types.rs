//! Mapping data model: field mappings, references, validation rules,
//! the execution context and the resolution result.
//!
//! Wire names are camelCase so the shapes round-trip through the editor's
//! persistence layer unchanged.

use crate::error::ErrorInfo;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Deserialize a present field (including JSON `null`) as `Some`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// An address into an upstream source output, plus optional fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub source_id: String,
    #[serde(default)]
    pub path: String,
    /// Used when the source or the path does not resolve. An explicit `null`
    /// is a real fallback value; an omitted key means "no fallback".
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub fallback: Option<Value>,
}

impl Reference {
    pub fn new(source_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            path: path.into(),
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Value) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

/// How a field's value is produced. Tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MappingExpression {
    /// A literal value.
    Static {
        #[serde(default)]
        value: Value,
    },
    /// One or more references, tried in order.
    Reference { references: Vec<Reference> },
    /// Source text in the expression language.
    Expression { source: String },
    /// A string with `{{ expr }}` tokens.
    Template {
        template: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        strict: Option<bool>,
    },
}

impl MappingExpression {
    pub fn static_value(value: Value) -> Self {
        Self::Static { value }
    }

    pub fn reference(source_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Reference {
            references: vec![Reference::new(source_id, path)],
        }
    }

    pub fn references(references: Vec<Reference>) -> Self {
        Self::Reference { references }
    }

    pub fn expression(source: impl Into<String>) -> Self {
        Self::Expression {
            source: source.into(),
        }
    }

    pub fn template(template: impl Into<String>) -> Self {
        Self::Template {
            template: template.into(),
            strict: None,
        }
    }

    pub fn strict_template(template: impl Into<String>) -> Self {
        Self::Template {
            template: template.into(),
            strict: Some(true),
        }
    }

    /// Short name of the variant, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MappingExpression::Static { .. } => "static",
            MappingExpression::Reference { .. } => "reference",
            MappingExpression::Expression { .. } => "expression",
            MappingExpression::Template { .. } => "template",
        }
    }
}

/// Structural value types a validation rule can demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    #[serde(alias = "sequence")]
    Array,
    Object,
}

impl ValueType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ValueType::String => value.is_string(),
            ValueType::Number => value.is_number(),
            ValueType::Boolean => value.is_boolean(),
            ValueType::Array => value.is_array(),
            ValueType::Object => value.is_object(),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::String => write!(f, "string"),
            ValueType::Number => write!(f, "number"),
            ValueType::Boolean => write!(f, "boolean"),
            ValueType::Array => write!(f, "array"),
            ValueType::Object => write!(f, "object"),
        }
    }
}

/// Constraints checked on the final value of a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl ValidationRule {
    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }
}

/// A declarative rule producing one field of the output object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    /// Dotted path of the field in the output object.
    pub target_field: String,
    pub expression: MappingExpression,
    /// Name of a single-argument registry function applied after resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationRule>,
}

impl FieldMapping {
    pub fn new(target_field: impl Into<String>, expression: MappingExpression) -> Self {
        Self {
            target_field: target_field.into(),
            expression,
            transform: None,
            validation: None,
        }
    }

    pub fn with_transform(mut self, transform: impl Into<String>) -> Self {
        self.transform = Some(transform.into());
        self
    }

    pub fn with_validation(mut self, validation: ValidationRule) -> Self {
        self.validation = Some(validation);
        self
    }
}

/// Run-time data visible to a resolution pass. Treated as immutable.
///
/// Source outputs keep the order they were inserted (or listed in JSON).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    #[serde(default)]
    pub source_outputs: IndexMap<String, Value>,
    #[serde(default)]
    pub global_variables: Map<String, Value>,
    #[serde(default)]
    pub user_context: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source_id: impl Into<String>, output: Value) -> Self {
        self.source_outputs.insert(source_id.into(), output);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.global_variables.insert(name.into(), value);
        self
    }

    pub fn with_user_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.user_context.insert(name.into(), value);
        self
    }

    pub fn source(&self, source_id: &str) -> Option<&Value> {
        self.source_outputs.get(source_id)
    }
}

/// Output of one resolution pass: whatever resolved, plus per-field errors.
///
/// A non-empty `errors` map means partial success, not total failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub output: Value,
    pub errors: BTreeMap<String, ErrorInfo>,
}

impl Default for ResolutionResult {
    fn default() -> Self {
        Self {
            output: Value::Object(Map::new()),
            errors: BTreeMap::new(),
        }
    }
}

impl ResolutionResult {
    /// True when every field resolved without an error.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// Read a value from the output by dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        crate::path::get(Some(&self.output), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_mapping_expression_tagged_wire_shape() {
        let expr = MappingExpression::reference("gmail", "from");
        let json = serde_json::to_value(&expr).unwrap();
        assert_eq!(
            json,
            json!({"kind": "reference", "references": [{"sourceId": "gmail", "path": "from"}]})
        );

        let parsed: MappingExpression =
            serde_json::from_value(json!({"kind": "template", "template": "Hi {{gmail.from}}"}))
                .unwrap();
        assert_eq!(parsed, MappingExpression::template("Hi {{gmail.from}}"));
    }

    #[test]
    fn test_static_defaults_to_null() {
        let parsed: MappingExpression = serde_json::from_value(json!({"kind": "static"})).unwrap();
        assert_eq!(parsed, MappingExpression::static_value(Value::Null));
    }

    #[test]
    fn test_reference_explicit_null_fallback() {
        let with_null: Reference =
            serde_json::from_value(json!({"sourceId": "a", "path": "b", "fallback": null}))
                .unwrap();
        assert_eq!(with_null.fallback, Some(Value::Null));

        let without: Reference =
            serde_json::from_value(json!({"sourceId": "a", "path": "b"})).unwrap();
        assert_eq!(without.fallback, None);
    }

    #[test]
    fn test_field_mapping_roundtrip() {
        let mapping = FieldMapping::new("lead.email", MappingExpression::reference("gmail", "from"))
            .with_transform("lower")
            .with_validation(ValidationRule {
                required: true,
                value_type: Some(ValueType::String),
                pattern: Some("@".into()),
                min: None,
                max: None,
            });
        let json = serde_json::to_value(&mapping).unwrap();
        assert_eq!(json["targetField"], "lead.email");
        assert_eq!(json["validation"]["type"], "string");
        let back: FieldMapping = serde_json::from_value(json).unwrap();
        assert_eq!(back, mapping);
    }

    #[test]
    fn test_value_type_sequence_alias() {
        let parsed: ValueType = serde_json::from_value(json!("sequence")).unwrap();
        assert_eq!(parsed, ValueType::Array);
        assert!(parsed.matches(&json!([1, 2])));
        assert!(!ValueType::Object.matches(&json!([1])));
    }

    #[test]
    fn test_context_preserves_source_order() {
        let ctx: ExecutionContext = serde_json::from_str(
            r#"{"sourceOutputs": {"zeta": {}, "alpha": {}, "mid": {}}}"#,
        )
        .unwrap();
        let order: Vec<&str> = ctx.source_outputs.keys().map(String::as_str).collect();
        assert_eq!(order, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_resolution_result_default_is_empty_object() {
        let result = ResolutionResult::default();
        assert_eq!(result.output, json!({}));
        assert!(result.is_complete());
    }
}
