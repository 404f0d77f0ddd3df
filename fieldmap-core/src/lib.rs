//! # Fieldmap Core
//!
//! Field-mapping resolution engine for workflow steps.
//! Resolves declarative field mappings against upstream step outputs:
//! path and reference resolution, a sandboxed expression language,
//! template interpolation, validation, auto-mapping and the orchestrator
//! that ties them together with partial-failure semantics.

pub mod automap;
pub mod config;
pub mod engine;
pub mod error;
pub mod expr;
pub mod functions;
pub mod path;
pub mod reference;
pub mod template;
pub mod types;
pub mod validator;

// Re-export commonly used types at the crate root.
pub use automap::{MatchKind, ProposedMapping};
pub use config::EngineConfig;
pub use engine::{FieldOutcome, MappingEngine};
pub use error::{
    ConfigError, ErrorCode, ErrorInfo, FieldError, FieldmapError, MappingError, RegistryError,
    Result,
};
pub use functions::{FunctionError, FunctionList, FunctionRegistry, MappingFunction};
pub use types::{
    ExecutionContext, FieldMapping, MappingExpression, Reference, ResolutionResult,
    ValidationRule, ValueType,
};
