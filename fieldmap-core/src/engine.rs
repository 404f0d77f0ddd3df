//! The mapping orchestrator.
//!
//! [`MappingEngine`] drives every field through resolve, transform and
//! validate, writes successes into the output object and attaches failures to
//! their target field. One field failing never stops the others.

use crate::automap::{self, ProposedMapping};
use crate::config::{EngineConfig, load_config};
use crate::error::{ErrorInfo, FieldError, MappingError};
use crate::expr;
use crate::functions::{FunctionList, FunctionRegistry};
use crate::path;
use crate::reference;
use crate::template;
use crate::types::{ExecutionContext, FieldMapping, MappingExpression, ResolutionResult};
use crate::validator;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// What resolving a single field produced.
///
/// A field can carry both a value and an error: a lenient template with
/// failed tokens is written and still reported.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldOutcome {
    pub value: Option<Value>,
    pub error: Option<FieldError>,
}

impl FieldOutcome {
    fn failed(error: FieldError) -> Self {
        Self {
            value: None,
            error: Some(error),
        }
    }
}

/// Resolves mapping sets against an execution context.
///
/// Holds only configuration and the function registry; nothing is retained
/// between calls, so one engine may serve any number of concurrent passes.
#[derive(Debug, Clone)]
pub struct MappingEngine {
    config: EngineConfig,
    registry: Arc<FunctionRegistry>,
}

impl Default for MappingEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default(), FunctionRegistry::with_builtins())
    }
}

impl MappingEngine {
    pub fn new(config: EngineConfig, registry: FunctionRegistry) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
        }
    }

    /// An engine with the given configuration and only the built-in functions.
    pub fn with_config(config: EngineConfig) -> Self {
        Self::new(config, FunctionRegistry::with_builtins())
    }

    /// Load and validate the layered configuration for `workspace`.
    pub fn from_workspace(workspace: &Path) -> crate::Result<Self> {
        let config = load_config(Some(workspace), None)?;
        config.validate()?;
        info!(workspace = %workspace.display(), "Engine configured from workspace");
        Ok(Self::with_config(config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Enumerate the functions usable from expressions and transforms.
    pub fn list_functions(&self) -> FunctionList {
        self.registry.list()
    }

    /// Run one resolution pass, as used for both preview and production.
    ///
    /// A non-empty `errors` map in the result means partial success.
    pub fn test_mappings(
        &self,
        mappings: &[FieldMapping],
        ctx: &ExecutionContext,
    ) -> Result<ResolutionResult, MappingError> {
        self.resolve_all(mappings, ctx)
    }

    /// Propose mappings for `targets` that do not appear in `existing`.
    pub fn auto_map(
        &self,
        targets: &[String],
        ctx: &ExecutionContext,
        existing: &[FieldMapping],
    ) -> Vec<ProposedMapping> {
        let proposals = automap::auto_map(targets, ctx, existing, &self.config.automap);
        info!(
            targets = targets.len(),
            proposed = proposals.len(),
            "Auto-mapping complete"
        );
        proposals
    }

    /// Check target fields before anything is evaluated.
    ///
    /// Returns the parsed keys of each target, in mapping order.
    pub fn validate_mappings(mappings: &[FieldMapping]) -> Result<Vec<Vec<String>>, MappingError> {
        let mut keys = Vec::with_capacity(mappings.len());
        let mut seen = HashSet::new();

        for (index, mapping) in mappings.iter().enumerate() {
            let target = mapping.target_field.as_str();
            if target.trim().is_empty() {
                return Err(MappingError::EmptyTargetField { index });
            }
            let parsed = path::parse_target(target).map_err(|e| MappingError::InvalidTargetField {
                target: target.to_string(),
                reason: e.reason,
            })?;
            if !seen.insert(target) {
                return Err(MappingError::DuplicateTargetField {
                    target: target.to_string(),
                });
            }
            keys.push(parsed);
        }

        for (mapping, parsed) in mappings.iter().zip(&keys) {
            for len in 1..parsed.len() {
                let parent = parsed[..len].join(".");
                if seen.contains(parent.as_str()) {
                    return Err(MappingError::ConflictingTargetFields {
                        parent,
                        child: mapping.target_field.clone(),
                    });
                }
            }
        }

        Ok(keys)
    }

    /// Resolve every mapping sequentially.
    pub fn resolve_all(
        &self,
        mappings: &[FieldMapping],
        ctx: &ExecutionContext,
    ) -> Result<ResolutionResult, MappingError> {
        let keys = Self::validate_mappings(mappings)?;
        info!(fields = mappings.len(), "Resolving field mappings");

        let outcomes = mappings
            .iter()
            .map(|mapping| self.resolve_field(mapping, ctx))
            .collect();
        Ok(assemble(mappings, &keys, outcomes))
    }

    /// Resolve every mapping on the blocking pool, each under its own timeout.
    ///
    /// The result is identical in shape and order to [`resolve_all`](Self::resolve_all).
    /// A field that exceeds `resolution.field_timeout_ms` records
    /// `ExpressionTimeout`; its siblings are unaffected.
    pub async fn resolve_all_concurrent(
        &self,
        mappings: Vec<FieldMapping>,
        ctx: Arc<ExecutionContext>,
    ) -> Result<ResolutionResult, MappingError> {
        let keys = Self::validate_mappings(&mappings)?;
        let field_timeout = self.config.resolution.field_timeout();
        info!(
            fields = mappings.len(),
            timeout_ms = self.config.resolution.field_timeout_ms,
            "Resolving field mappings concurrently"
        );

        let mut tasks = JoinSet::new();
        for (index, mapping) in mappings.iter().cloned().enumerate() {
            let engine = self.clone();
            let ctx = Arc::clone(&ctx);
            tasks.spawn(async move {
                let work = tokio::task::spawn_blocking(move || engine.resolve_field(&mapping, &ctx));
                let outcome = match tokio::time::timeout(field_timeout, work).await {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(e)) => FieldOutcome::failed(FieldError::runtime(format!(
                        "field task failed: {}",
                        e
                    ))),
                    Err(_) => FieldOutcome::failed(FieldError::ExpressionTimeout {
                        message: format!("field exceeded {}ms", field_timeout.as_millis()),
                    }),
                };
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<FieldOutcome>> = (0..mappings.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => warn!(error = %e, "Field task panicked"),
            }
        }

        let outcomes = slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    FieldOutcome::failed(FieldError::runtime("field task did not complete"))
                })
            })
            .collect();
        Ok(assemble(&mappings, &keys, outcomes))
    }

    /// Resolve, transform and validate one field.
    pub fn resolve_field(&self, mapping: &FieldMapping, ctx: &ExecutionContext) -> FieldOutcome {
        debug!(
            target = %mapping.target_field,
            kind = mapping.expression.kind(),
            "Resolving field"
        );

        let (resolved, warning) = self.resolve_expression(&mapping.expression, ctx);
        let transformed = resolved.and_then(|value| match &mapping.transform {
            Some(name) => self.apply_transform(name, value),
            None => Ok(value),
        });

        let checked = match &mapping.validation {
            None => transformed,
            Some(rule) => match transformed {
                Ok(value) => validator::validate(Some(&value), rule).map(|()| value),
                Err(cause) if rule.required && cause.is_absence() => {
                    Err(FieldError::ValidationFailed {
                        reasons: vec!["value is required".to_string(), cause.to_string()],
                    })
                }
                Err(e) => Err(e),
            },
        };

        match checked {
            Ok(value) => FieldOutcome {
                value: Some(value),
                error: warning,
            },
            Err(e) => FieldOutcome::failed(e),
        }
    }

    /// Produce the raw value of an expression, plus a non-fatal template warning.
    fn resolve_expression(
        &self,
        expression: &MappingExpression,
        ctx: &ExecutionContext,
    ) -> (Result<Value, FieldError>, Option<FieldError>) {
        let limits = &self.config.expression;
        match expression {
            MappingExpression::Static { value } => (Ok(value.clone()), None),
            MappingExpression::Reference { references } => {
                (reference::resolve_references(references, ctx), None)
            }
            MappingExpression::Expression { source } => {
                (expr::evaluate(source, ctx, &self.registry, limits), None)
            }
            MappingExpression::Template { template, strict } => {
                let rendered = match template::render(template, ctx, &self.registry, limits) {
                    Ok(rendered) => rendered,
                    Err(e) => return (Err(e), None),
                };
                let Some(token_error) = rendered.token_error() else {
                    return (Ok(Value::String(rendered.text)), None);
                };
                if strict.unwrap_or(self.config.template.strict) {
                    (Err(token_error), None)
                } else {
                    (Ok(Value::String(rendered.text)), Some(token_error))
                }
            }
        }
    }

    fn apply_transform(&self, name: &str, value: Value) -> Result<Value, FieldError> {
        let function = self
            .registry
            .get(name)
            .ok_or_else(|| FieldError::runtime(format!("unknown transform '{}'", name)))?;
        function
            .call(std::slice::from_ref(&value))
            .map_err(|e| FieldError::runtime(format!("transform '{}' failed: {}", name, e.message)))
    }
}

/// Build the result from per-field outcomes given in mapping order.
fn assemble(
    mappings: &[FieldMapping],
    keys: &[Vec<String>],
    outcomes: Vec<FieldOutcome>,
) -> ResolutionResult {
    let mut output = Map::new();
    let mut errors = BTreeMap::new();
    let mut written = 0usize;

    for ((mapping, target_keys), outcome) in mappings.iter().zip(keys).zip(outcomes) {
        let target = &mapping.target_field;
        let mut error = outcome.error;

        if let Some(value) = outcome.value {
            match path::insert_at(&mut output, target_keys, value) {
                Ok(()) => written += 1,
                Err(reason) => error = Some(FieldError::runtime(reason)),
            }
        }

        if let Some(err) = error {
            warn!(target = %target, code = ?err.code(), error = %err, "Field mapping failed");
            errors.insert(target.clone(), ErrorInfo::from(err));
        }
    }

    info!(
        written,
        failed = errors.len(),
        "Resolution pass complete"
    );

    ResolutionResult {
        output: Value::Object(output),
        errors,
    }
}
