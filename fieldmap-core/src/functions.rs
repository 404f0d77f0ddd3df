//! Function registry: the allow-list of functions callable from expressions
//! and usable as field transforms.
//!
//! The registry is plain configuration passed into the engine; there is no
//! global instance. Built-ins are pure; custom entries are added by the host.

use crate::error::RegistryError;
use crate::template::value_to_string;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Failure raised by a registry function.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct FunctionError {
    pub message: String,
}

impl FunctionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Trait that all registry functions implement.
pub trait MappingFunction: Send + Sync {
    /// The unique name used in expressions and `transform` fields.
    fn name(&self) -> &str;

    /// Human-readable description of what the function does.
    fn description(&self) -> &str;

    /// Invoke the function. Must not have side effects.
    fn call(&self, args: &[Value]) -> Result<Value, FunctionError>;

    /// Whether the function may be called with arguments whose data is
    /// missing. Those arguments are passed as `null`.
    fn accepts_missing(&self) -> bool {
        false
    }
}

/// Names available to expressions, split by origin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionList {
    pub built_in: Vec<String>,
    pub custom: Vec<String>,
}

type BuiltinFn = fn(&[Value]) -> Result<Value, FunctionError>;

struct BuiltinFunction {
    name: &'static str,
    description: &'static str,
    func: BuiltinFn,
    accepts_missing: bool,
}

impl MappingFunction for BuiltinFunction {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn call(&self, args: &[Value]) -> Result<Value, FunctionError> {
        (self.func)(args)
    }

    fn accepts_missing(&self) -> bool {
        self.accepts_missing
    }
}

/// A custom function backed by a closure.
struct ClosureFunction<F> {
    name: String,
    description: String,
    func: F,
}

impl<F> MappingFunction for ClosureFunction<F>
where
    F: Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn call(&self, args: &[Value]) -> Result<Value, FunctionError> {
        (self.func)(args)
    }
}

/// Holds built-in and custom functions by name.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    builtins: BTreeMap<String, Arc<dyn MappingFunction>>,
    custom: BTreeMap<String, Arc<dyn MappingFunction>>,
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("builtins", &self.builtins.keys().collect::<Vec<_>>())
            .field("custom", &self.custom.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FunctionRegistry {
    /// An empty registry with no built-ins.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with every built-in function.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for &(name, description, func) in BUILTINS {
            registry.builtins.insert(
                name.to_string(),
                Arc::new(BuiltinFunction {
                    name,
                    description,
                    func,
                    accepts_missing: ABSENCE_AWARE.contains(&name),
                }),
            );
        }
        registry
    }

    /// Register a custom function. Names are unique across built-ins and custom entries.
    pub fn register(&mut self, function: Arc<dyn MappingFunction>) -> Result<(), RegistryError> {
        let name = function.name().to_string();
        validate_name(&name)?;
        if self.contains(&name) {
            return Err(RegistryError::AlreadyRegistered { name });
        }
        debug!(function = %name, "Registering custom function");
        self.custom.insert(name, function);
        Ok(())
    }

    /// Register a custom function from a closure.
    pub fn register_fn<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        func: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync + 'static,
    {
        self.register(Arc::new(ClosureFunction {
            name: name.into(),
            description: description.into(),
            func,
        }))
    }

    /// Remove a custom function. Built-ins cannot be removed.
    pub fn unregister(&mut self, name: &str) -> Result<(), RegistryError> {
        if self.custom.remove(name).is_none() {
            return Err(RegistryError::NotFound {
                name: name.to_string(),
            });
        }
        debug!(function = %name, "Unregistered custom function");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn MappingFunction>> {
        self.custom
            .get(name)
            .or_else(|| self.builtins.get(name))
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builtins.contains_key(name) || self.custom.contains_key(name)
    }

    /// Enumerate available names, each list sorted.
    pub fn list(&self) -> FunctionList {
        FunctionList {
            built_in: self.builtins.keys().cloned().collect(),
            custom: self.custom.keys().cloned().collect(),
        }
    }

    /// Name and description of every function, built-ins first.
    pub fn describe(&self) -> Vec<(String, String)> {
        self.builtins
            .values()
            .chain(self.custom.values())
            .map(|f| (f.name().to_string(), f.description().to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.builtins.len() + self.custom.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builtins.is_empty() && self.custom.is_empty()
    }
}

fn validate_name(name: &str) -> Result<(), RegistryError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(RegistryError::InvalidName {
            name: name.to_string(),
            reason: "must start with a letter or '_' and contain only [A-Za-z0-9_-]".into(),
        });
    }
    if matches!(name, "true" | "false" | "null") {
        return Err(RegistryError::InvalidName {
            name: name.to_string(),
            reason: "reserved literal".into(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Built-in functions
// ---------------------------------------------------------------------------

const BUILTINS: &[(&str, &str, BuiltinFn)] = &[
    ("coalesce", "First argument that is not null", builtin_coalesce),
    ("concat", "Concatenate all arguments as text", builtin_concat),
    ("upper", "Uppercase a string", builtin_upper),
    ("lower", "Lowercase a string", builtin_lower),
    ("trim", "Strip leading and trailing whitespace", builtin_trim),
    ("length", "Length of a string, array or object", builtin_length),
    ("join", "Join array items with a separator (default ',')", builtin_join),
    ("split", "Split a string on a separator", builtin_split),
    ("replace", "Replace every occurrence of a substring", builtin_replace),
    ("first", "First item of an array", builtin_first),
    ("last", "Last item of an array", builtin_last),
    ("default", "Value, or the fallback when the value is null or empty", builtin_default),
    ("to_string", "Convert a value to text", builtin_to_string),
    ("to_number", "Convert a value to a number", builtin_to_number),
    ("to_boolean", "Convert a value to a boolean", builtin_to_boolean),
];

/// Built-ins that pick among their arguments and so tolerate missing data.
const ABSENCE_AWARE: &[&str] = &["coalesce", "default"];

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), FunctionError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(FunctionError::new(format!(
            "{} expects {} argument(s), got {}",
            name,
            expected,
            args.len()
        )));
    }
    Ok(())
}

fn string_arg<'a>(name: &str, value: &'a Value) -> Result<&'a str, FunctionError> {
    value
        .as_str()
        .ok_or_else(|| FunctionError::new(format!("{} expects a string argument", name)))
}

fn array_arg<'a>(name: &str, value: &'a Value) -> Result<&'a Vec<Value>, FunctionError> {
    value
        .as_array()
        .ok_or_else(|| FunctionError::new(format!("{} expects an array argument", name)))
}

fn number_value(n: f64) -> Result<Value, FunctionError> {
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| FunctionError::new("result is not a finite number"))
}

fn builtin_coalesce(args: &[Value]) -> Result<Value, FunctionError> {
    Ok(args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null))
}

fn builtin_concat(args: &[Value]) -> Result<Value, FunctionError> {
    Ok(Value::String(args.iter().map(value_to_string).collect()))
}

fn builtin_upper(args: &[Value]) -> Result<Value, FunctionError> {
    arity("upper", args, 1, 1)?;
    Ok(Value::String(string_arg("upper", &args[0])?.to_uppercase()))
}

fn builtin_lower(args: &[Value]) -> Result<Value, FunctionError> {
    arity("lower", args, 1, 1)?;
    Ok(Value::String(string_arg("lower", &args[0])?.to_lowercase()))
}

fn builtin_trim(args: &[Value]) -> Result<Value, FunctionError> {
    arity("trim", args, 1, 1)?;
    Ok(Value::String(string_arg("trim", &args[0])?.trim().to_string()))
}

fn builtin_length(args: &[Value]) -> Result<Value, FunctionError> {
    arity("length", args, 1, 1)?;
    let len = match &args[0] {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        _ => {
            return Err(FunctionError::new(
                "length expects a string, array or object",
            ));
        }
    };
    Ok(Value::from(len))
}

fn builtin_join(args: &[Value]) -> Result<Value, FunctionError> {
    arity("join", args, 1, 2)?;
    let items = array_arg("join", &args[0])?;
    let separator = match args.get(1) {
        Some(sep) => string_arg("join", sep)?,
        None => ",",
    };
    let parts: Vec<String> = items.iter().map(value_to_string).collect();
    Ok(Value::String(parts.join(separator)))
}

fn builtin_split(args: &[Value]) -> Result<Value, FunctionError> {
    arity("split", args, 2, 2)?;
    let text = string_arg("split", &args[0])?;
    let separator = string_arg("split", &args[1])?;
    if separator.is_empty() {
        return Err(FunctionError::new("split separator must not be empty"));
    }
    Ok(Value::Array(
        text.split(separator)
            .map(|part| Value::String(part.to_string()))
            .collect(),
    ))
}

fn builtin_replace(args: &[Value]) -> Result<Value, FunctionError> {
    arity("replace", args, 3, 3)?;
    let text = string_arg("replace", &args[0])?;
    let from = string_arg("replace", &args[1])?;
    let to = string_arg("replace", &args[2])?;
    if from.is_empty() {
        return Ok(Value::String(text.to_string()));
    }
    Ok(Value::String(text.replace(from, to)))
}

fn builtin_first(args: &[Value]) -> Result<Value, FunctionError> {
    arity("first", args, 1, 1)?;
    Ok(array_arg("first", &args[0])?
        .first()
        .cloned()
        .unwrap_or(Value::Null))
}

fn builtin_last(args: &[Value]) -> Result<Value, FunctionError> {
    arity("last", args, 1, 1)?;
    Ok(array_arg("last", &args[0])?
        .last()
        .cloned()
        .unwrap_or(Value::Null))
}

fn builtin_default(args: &[Value]) -> Result<Value, FunctionError> {
    arity("default", args, 2, 2)?;
    let empty = match &args[0] {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    };
    Ok(if empty { args[1].clone() } else { args[0].clone() })
}

fn builtin_to_string(args: &[Value]) -> Result<Value, FunctionError> {
    arity("to_string", args, 1, 1)?;
    Ok(Value::String(value_to_string(&args[0])))
}

fn builtin_to_number(args: &[Value]) -> Result<Value, FunctionError> {
    arity("to_number", args, 1, 1)?;
    match &args[0] {
        Value::Number(_) => Ok(args[0].clone()),
        Value::Bool(b) => Ok(Value::from(u8::from(*b))),
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                return Ok(Value::from(i));
            }
            let parsed = trimmed
                .parse::<f64>()
                .map_err(|_| FunctionError::new(format!("cannot convert '{}' to a number", s)))?;
            number_value(parsed)
        }
        other => Err(FunctionError::new(format!(
            "cannot convert {} to a number",
            other
        ))),
    }
}

fn builtin_to_boolean(args: &[Value]) -> Result<Value, FunctionError> {
    arity("to_boolean", args, 1, 1)?;
    let result = match &args[0] {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => true,
            "false" | "no" | "0" | "off" | "" => false,
            _ => {
                return Err(FunctionError::new(format!(
                    "cannot convert '{}' to a boolean",
                    s
                )));
            }
        },
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    };
    Ok(Value::Bool(result))
}
