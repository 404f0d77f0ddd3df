//! Dotted/indexed path access into JSON values.
//!
//! Paths look like `a.b[2].c`. Reading never fails: a missing segment, a type
//! mismatch or a malformed path all yield `None`. Writing (used for target
//! fields) only accepts plain dotted names and creates intermediate objects.

use serde_json::{Map, Value};
use std::fmt;

/// One step of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{}", key),
            PathSegment::Index(index) => write!(f, "[{}]", index),
        }
    }
}

/// A path string that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Malformed path '{path}': {reason}")]
pub struct PathError {
    pub path: String,
    pub reason: String,
}

impl PathError {
    fn new(path: &str, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// Parse a path string into segments. The empty path addresses the root itself.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>, PathError> {
    let mut segments = Vec::new();
    let mut chars = path.char_indices().peekable();
    // True when a `.` was just consumed (or at the start), so a key may follow.
    let mut expect_key = true;

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            '.' => {
                if expect_key {
                    return Err(PathError::new(path, format!("empty segment at {}", pos)));
                }
                chars.next();
                expect_key = true;
                if chars.peek().is_none() {
                    return Err(PathError::new(path, "trailing '.'"));
                }
            }
            '[' => {
                if expect_key && !segments.is_empty() {
                    return Err(PathError::new(path, format!("expected a key at {}", pos)));
                }
                chars.next();
                let mut digits = String::new();
                loop {
                    match chars.next() {
                        Some((_, ']')) => break,
                        Some((_, d)) if d.is_ascii_digit() => digits.push(d),
                        Some((p, other)) => {
                            return Err(PathError::new(
                                path,
                                format!("unexpected '{}' in index at {}", other, p),
                            ));
                        }
                        None => return Err(PathError::new(path, "unclosed '['")),
                    }
                }
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| PathError::new(path, "index must be a non-negative integer"))?;
                segments.push(PathSegment::Index(index));
                expect_key = false;
            }
            ']' => return Err(PathError::new(path, format!("unexpected ']' at {}", pos))),
            _ => {
                if !expect_key {
                    return Err(PathError::new(
                        path,
                        format!("expected '.' or '[' at {}", pos),
                    ));
                }
                let mut key = String::new();
                while let Some(&(_, k)) = chars.peek() {
                    if k == '.' || k == '[' || k == ']' {
                        break;
                    }
                    key.push(k);
                    chars.next();
                }
                segments.push(PathSegment::Key(key));
                expect_key = false;
            }
        }
    }

    Ok(segments)
}

/// Render segments back into the canonical `a.b[2].c` form.
pub fn format_path(segments: &[PathSegment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            PathSegment::Key(key) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(key);
            }
            PathSegment::Index(index) => out.push_str(&format!("[{}]", index)),
        }
    }
    out
}

/// Read the value at `path` inside `root`.
///
/// A `null` or absent root, a malformed path, a missing key, an out-of-range
/// index or indexing into the wrong kind of value all return `None`.
pub fn get<'a>(root: Option<&'a Value>, path: &str) -> Option<&'a Value> {
    let root = root?;
    let segments = parse_path(path).ok()?;
    get_segments(root, &segments)
}

/// Segment-level variant of [`get`] for callers that already parsed the path.
pub fn get_segments<'a>(root: &'a Value, segments: &[PathSegment]) -> Option<&'a Value> {
    if root.is_null() {
        return None;
    }
    let mut current = root;
    for segment in segments {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(key)?,
            (PathSegment::Index(index), Value::Array(items)) => items.get(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Look up a path whose first segment names an entry of `map`.
pub fn get_in_map<'a>(map: &'a Map<String, Value>, segments: &[PathSegment]) -> Option<&'a Value> {
    match segments.split_first() {
        None => None,
        Some((PathSegment::Key(key), rest)) => {
            let value = map.get(key)?;
            if rest.is_empty() {
                Some(value)
            } else {
                get_segments(value, rest)
            }
        }
        Some((PathSegment::Index(_), _)) => None,
    }
}

/// Split a target field into its dotted keys, rejecting indices and empty segments.
pub fn parse_target(target: &str) -> Result<Vec<String>, PathError> {
    if target.is_empty() {
        return Err(PathError::new(target, "target field is empty"));
    }
    target
        .split('.')
        .map(|key| {
            if key.is_empty() {
                Err(PathError::new(target, "empty segment"))
            } else if key.contains('[') || key.contains(']') {
                Err(PathError::new(target, "indices are not allowed in target fields"))
            } else {
                Ok(key.to_string())
            }
        })
        .collect()
}

/// Write `value` at the dotted `keys` inside `output`, creating intermediate objects.
///
/// Fails if an intermediate key already holds a non-object value.
pub fn insert_at(output: &mut Map<String, Value>, keys: &[String], value: Value) -> Result<(), String> {
    let Some((last, parents)) = keys.split_last() else {
        return Err("cannot write at an empty path".to_string());
    };

    let mut current = output;
    for key in parents {
        let entry = current
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match entry {
            Value::Object(map) => map,
            _ => return Err(format!("'{}' already holds a non-object value", key)),
        };
    }
    current.insert(last.clone(), value);
    Ok(())
}
