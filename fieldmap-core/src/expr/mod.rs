//! The sandboxed expression language.
//!
//! Expressions are literals, references into the execution context
//! (`gmail.from`, `$vars.region`, `$user.name`) and calls to functions from a
//! [`FunctionRegistry`]. Source text is parsed into a small AST and walked by
//! an evaluator that charges every node against a [`Budget`]; nothing is ever
//! handed to a host interpreter.

mod eval;
mod lexer;
mod parser;

pub use eval::{Budget, Evaluator};
pub use parser::{Expr, RefExpr, RefRoot, parse};

use crate::config::ExpressionConfig;
use crate::error::FieldError;
use crate::functions::FunctionRegistry;
use crate::types::ExecutionContext;
use serde_json::Value;

/// Parse and evaluate `source` with a fresh budget taken from `config`.
pub fn evaluate(
    source: &str,
    ctx: &ExecutionContext,
    registry: &FunctionRegistry,
    config: &ExpressionConfig,
) -> Result<Value, FieldError> {
    let mut budget = Budget::from_config(config);
    evaluate_with_budget(source, ctx, registry, config.max_depth, &mut budget)
}

/// Parse and evaluate `source`, charging an existing budget.
pub fn evaluate_with_budget(
    source: &str,
    ctx: &ExecutionContext,
    registry: &FunctionRegistry,
    max_depth: usize,
    budget: &mut Budget,
) -> Result<Value, FieldError> {
    let expr = parse(source, max_depth)?;
    Evaluator::new(ctx, registry, budget).eval(&expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_evaluate_with_config() {
        let ctx = ExecutionContext::new().with_source("crm", json!({"contact": {"name": "  Ada "}}));
        let registry = FunctionRegistry::with_builtins();
        let config = ExpressionConfig::default();

        let value = evaluate("upper(trim(crm.contact.name))", &ctx, &registry, &config).unwrap();
        assert_eq!(value, json!("ADA"));
    }

    #[test]
    fn test_evaluate_respects_configured_steps() {
        let ctx = ExecutionContext::new();
        let registry = FunctionRegistry::with_builtins();
        let config = ExpressionConfig {
            max_steps: 2,
            ..Default::default()
        };
        let err = evaluate("concat('a', 'b')", &ctx, &registry, &config).unwrap_err();
        assert!(matches!(err, FieldError::ExpressionTimeout { .. }));
    }

    #[test]
    fn test_evaluate_syntax_error_before_budget() {
        let ctx = ExecutionContext::new();
        let registry = FunctionRegistry::with_builtins();
        let err = evaluate("upper(", &ctx, &registry, &ExpressionConfig::default()).unwrap_err();
        assert!(matches!(err, FieldError::ExpressionSyntax { offset: 6, .. }));
    }
}
