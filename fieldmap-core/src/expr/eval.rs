//! Tree-walking evaluator over the parsed AST.

use super::parser::{Expr, RefExpr, RefRoot};
use crate::config::ExpressionConfig;
use crate::error::FieldError;
use crate::functions::FunctionRegistry;
use crate::path;
use crate::types::ExecutionContext;
use serde_json::{Map, Value};
use std::time::Instant;

/// Step and wall-clock allowance for one field.
///
/// A template shares a single budget across all of its tokens.
#[derive(Debug, Clone)]
pub struct Budget {
    max_steps: u64,
    steps: u64,
    deadline: Option<Instant>,
}

impl Budget {
    pub fn new(max_steps: u64, deadline: Option<Instant>) -> Self {
        Self {
            max_steps,
            steps: 0,
            deadline,
        }
    }

    pub fn from_config(config: &ExpressionConfig) -> Self {
        Self::new(
            config.max_steps,
            config.timeout().map(|timeout| Instant::now() + timeout),
        )
    }

    /// Steps charged so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Charge one step, failing once either limit is exceeded.
    pub fn charge(&mut self) -> Result<(), FieldError> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(FieldError::ExpressionTimeout {
                message: format!("step budget of {} exceeded", self.max_steps),
            });
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(FieldError::ExpressionTimeout {
                    message: "wall-clock budget exceeded".to_string(),
                });
            }
        }
        Ok(())
    }
}

pub struct Evaluator<'a> {
    ctx: &'a ExecutionContext,
    registry: &'a FunctionRegistry,
    budget: &'a mut Budget,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        ctx: &'a ExecutionContext,
        registry: &'a FunctionRegistry,
        budget: &'a mut Budget,
    ) -> Self {
        Self {
            ctx,
            registry,
            budget,
        }
    }

    /// Evaluate an expression. A reference that finds no data is
    /// [`FieldError::UnresolvedReference`], never a default value.
    pub fn eval(&mut self, expr: &Expr) -> Result<Value, FieldError> {
        self.budget.charge()?;
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Reference(reference) => {
                self.lookup(reference)
                    .ok_or_else(|| FieldError::UnresolvedReference {
                        reference: reference.to_string(),
                    })
            }
            Expr::Call { name, args } => self.call(name, args),
        }
    }

    /// Missing arguments reach only functions that accept them, as `null`.
    /// If such a function still yields `null`, the first miss is reported.
    fn call(&mut self, name: &str, args: &[Expr]) -> Result<Value, FieldError> {
        let mut values = Vec::with_capacity(args.len());
        let mut missing = None;
        for arg in args {
            match self.eval(arg) {
                Ok(value) => values.push(value),
                Err(err) if err.is_absence() => {
                    missing.get_or_insert(err);
                    values.push(Value::Null);
                }
                Err(err) => return Err(err),
            }
        }

        self.budget.charge()?;
        let function = self
            .registry
            .get(name)
            .ok_or_else(|| FieldError::runtime(format!("unknown function '{}'", name)))?;

        match missing {
            Some(cause) if !function.accepts_missing() => Err(cause),
            missing => {
                let value = function
                    .call(&values)
                    .map_err(|e| FieldError::runtime(format!("{}: {}", name, e.message)))?;
                match missing {
                    Some(cause) if value.is_null() => Err(cause),
                    _ => Ok(value),
                }
            }
        }
    }

    fn lookup(&self, reference: &RefExpr) -> Option<Value> {
        match &reference.root {
            RefRoot::Source(id) => {
                path::get_segments(self.ctx.source(id)?, &reference.segments).cloned()
            }
            RefRoot::Variables => scope(&self.ctx.global_variables, reference),
            RefRoot::User => scope(&self.ctx.user_context, reference),
        }
    }
}

fn scope(map: &Map<String, Value>, reference: &RefExpr) -> Option<Value> {
    if reference.segments.is_empty() {
        return Some(Value::Object(map.clone()));
    }
    path::get_in_map(map, &reference.segments).cloned()
}
