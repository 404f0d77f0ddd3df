//! Reference resolution against upstream source outputs.

use crate::error::FieldError;
use crate::path;
use crate::types::{ExecutionContext, Reference};
use serde_json::Value;
use tracing::trace;

/// Resolve one reference.
///
/// An unknown source id and an unresolved path are distinct failures; both
/// are replaced by the reference's fallback when one is supplied.
pub fn resolve_reference(reference: &Reference, ctx: &ExecutionContext) -> Result<Value, FieldError> {
    let Some(output) = ctx.source(&reference.source_id) else {
        return match &reference.fallback {
            Some(fallback) => {
                trace!(source = %reference.source_id, "Unknown source, using fallback");
                Ok(fallback.clone())
            }
            None => Err(FieldError::UnknownSourceReference {
                source_id: reference.source_id.clone(),
            }),
        };
    };

    match path::get(Some(output), &reference.path) {
        Some(value) => Ok(value.clone()),
        None => match &reference.fallback {
            Some(fallback) => {
                trace!(
                    source = %reference.source_id,
                    path = %reference.path,
                    "Path unresolved, using fallback"
                );
                Ok(fallback.clone())
            }
            None => Err(FieldError::UnresolvedPath {
                source_id: reference.source_id.clone(),
                path: reference.path.clone(),
            }),
        },
    }
}

/// Resolve a list of references, returning the first one that produces a value.
///
/// When none resolve, the first reference's error is reported.
pub fn resolve_references(
    references: &[Reference],
    ctx: &ExecutionContext,
) -> Result<Value, FieldError> {
    let mut first_error = None;
    for reference in references {
        match resolve_reference(reference, ctx) {
            Ok(value) => return Ok(value),
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    Err(first_error.unwrap_or_else(|| FieldError::UnresolvedPath {
        source_id: String::new(),
        path: String::new(),
    }))
}
