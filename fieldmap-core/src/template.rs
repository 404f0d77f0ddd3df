//! Template interpolation for `{{ expr }}` tokens.
//!
//! Each token is evaluated with the expression language and its stringified
//! value replaces the token. Text outside tokens passes through unchanged.

use crate::config::ExpressionConfig;
use crate::error::FieldError;
use crate::expr::{self, Budget};
use crate::functions::FunctionRegistry;
use crate::types::ExecutionContext;
use serde_json::Value;
use tracing::trace;

/// A rendered template plus the tokens that failed to evaluate.
///
/// Failed tokens are rendered as empty strings; whether that is acceptable is
/// the caller's decision (strict vs. lenient).
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub text: String,
    pub failed_tokens: Vec<String>,
    /// Every failed token failed because its data was absent.
    pub missing_data: bool,
}

impl Rendered {
    fn verbatim(template: &str) -> Self {
        Self {
            text: template.to_string(),
            failed_tokens: Vec::new(),
            missing_data: false,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed_tokens.is_empty()
    }

    /// The failures as a single field error, if any token failed.
    pub fn token_error(&self) -> Option<FieldError> {
        (!self.is_clean()).then(|| FieldError::TemplateToken {
            tokens: self.failed_tokens.clone(),
            missing_data: self.missing_data,
        })
    }
}

/// Render every `{{ ... }}` token in `template`.
///
/// All tokens share one evaluation budget. Running out of it aborts the whole
/// render with `ExpressionTimeout`; any other token failure is collected.
pub fn render(
    template: &str,
    ctx: &ExecutionContext,
    registry: &FunctionRegistry,
    config: &ExpressionConfig,
) -> Result<Rendered, FieldError> {
    if !has_tokens(template) {
        return Ok(Rendered::verbatim(template));
    }

    let mut budget = Budget::from_config(config);
    let mut result = String::with_capacity(template.len());
    let mut failed_tokens = Vec::new();
    let mut only_absent = true;
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            let offset = template.len() - rest.len() + start;
            failed_tokens.push(format!("unclosed '{{{{' at offset {}", offset));
            only_absent = false;
            rest = &rest[start..];
            break;
        };

        let source = after_open[..end].trim();
        match expr::evaluate_with_budget(source, ctx, registry, config.max_depth, &mut budget) {
            Ok(value) => result.push_str(&value_to_string(&value)),
            Err(err @ FieldError::ExpressionTimeout { .. }) => return Err(err),
            Err(err) => {
                trace!(token = source, error = %err, "Template token failed");
                failed_tokens.push(format!("{{{{{}}}}}: {}", source, err));
                only_absent &= err.is_absence();
            }
        }
        rest = &after_open[end + 2..];
    }
    result.push_str(rest);

    Ok(Rendered {
        text: result,
        missing_data: only_absent && !failed_tokens.is_empty(),
        failed_tokens,
    })
}

/// Whether `template` contains anything that looks like a token.
pub fn has_tokens(template: &str) -> bool {
    template.contains("{{")
}

/// Convert a JSON value to its string form for template insertion.
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
