//! Name-similarity auto-mapping of target fields onto upstream outputs.
//!
//! Each source output is flattened into `path -> sample` pairs with bounded
//! depth and bounded array sampling, then every unmapped target is matched
//! against the flattened leaf names: exact (case-insensitive) first, then
//! substring in either direction. Results are deterministic for identical
//! inputs.

use crate::config::AutoMapConfig;
use crate::path::{PathSegment, format_path};
use crate::types::{ExecutionContext, FieldMapping, MappingExpression};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

/// How a proposal was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Partial,
}

/// A suggested mapping plus the evidence behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedMapping {
    pub mapping: FieldMapping,
    pub match_kind: MatchKind,
    /// The value currently found at the proposed path.
    pub sample: Value,
}

/// One flattened entry of a source output.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatField {
    pub source_id: String,
    pub path: String,
    /// Last key of the path with indices stripped, lowercased.
    pub leaf: String,
    pub sample: Value,
}

/// Flatten one source output, sorted by path.
///
/// Emits scalar leaves and whole arrays, plus the first `max_samples` elements
/// of each array, down to `max_depth` levels. Keys that a path cannot address
/// (empty, or containing `.`, `[` or `]`) are skipped.
pub fn flatten(source_id: &str, output: &Value, config: &AutoMapConfig) -> Vec<FlatField> {
    let mut walker = Walker {
        source_id,
        config,
        visited: HashSet::new(),
        out: Vec::new(),
    };
    let mut prefix = Vec::new();
    walker.walk(output, &mut prefix, 0);

    let mut fields = walker.out;
    fields.sort_by(|a, b| a.path.cmp(&b.path));
    fields
}

struct Walker<'a> {
    source_id: &'a str,
    config: &'a AutoMapConfig,
    visited: HashSet<*const Value>,
    out: Vec<FlatField>,
}

impl Walker<'_> {
    fn walk(&mut self, node: &Value, prefix: &mut Vec<PathSegment>, depth: usize) {
        if depth >= self.config.max_depth || !self.visited.insert(node as *const Value) {
            return;
        }

        match node {
            Value::Object(map) => {
                for (key, child) in map {
                    if key.is_empty() || key.contains(['.', '[', ']']) {
                        continue;
                    }
                    prefix.push(PathSegment::Key(key.clone()));
                    self.visit_child(child, prefix, depth + 1);
                    prefix.pop();
                }
            }
            Value::Array(items) => {
                for (index, child) in items.iter().take(self.config.max_samples).enumerate() {
                    prefix.push(PathSegment::Index(index));
                    self.visit_child(child, prefix, depth + 1);
                    prefix.pop();
                }
            }
            _ => {}
        }
    }

    fn visit_child(&mut self, child: &Value, prefix: &mut Vec<PathSegment>, depth: usize) {
        match child {
            Value::Object(_) => self.walk(child, prefix, depth),
            Value::Array(_) => {
                self.emit(child, prefix);
                self.walk(child, prefix, depth);
            }
            _ => self.emit(child, prefix),
        }
    }

    fn emit(&mut self, value: &Value, segments: &[PathSegment]) {
        let Some(leaf) = segments.iter().rev().find_map(|segment| match segment {
            PathSegment::Key(key) => Some(key.to_lowercase()),
            PathSegment::Index(_) => None,
        }) else {
            return;
        };
        self.out.push(FlatField {
            source_id: self.source_id.to_string(),
            path: format_path(segments),
            leaf,
            sample: value.clone(),
        });
    }
}

/// Propose mappings for every target field that has none yet.
///
/// Candidates are considered in source order (as listed in the context), then
/// by path.
pub fn auto_map(
    targets: &[String],
    ctx: &ExecutionContext,
    existing: &[FieldMapping],
    config: &AutoMapConfig,
) -> Vec<ProposedMapping> {
    let fields: Vec<FlatField> = ctx
        .source_outputs
        .iter()
        .flat_map(|(source_id, output)| flatten(source_id, output, config))
        .collect();

    let mut taken: HashSet<&str> = existing.iter().map(|m| m.target_field.as_str()).collect();
    let mut proposals = Vec::new();

    for target in targets {
        if !taken.insert(target.as_str()) {
            continue;
        }
        let leaf = target.rsplit('.').next().unwrap_or(target).to_lowercase();
        if leaf.is_empty() {
            continue;
        }

        let found = fields
            .iter()
            .find(|field| field.leaf == leaf)
            .map(|field| (field, MatchKind::Exact))
            .or_else(|| {
                partial_match(&fields, &leaf, config.min_substring_len)
                    .map(|field| (field, MatchKind::Partial))
            });

        if let Some((field, match_kind)) = found {
            debug!(
                target = %target,
                source = %field.source_id,
                path = %field.path,
                kind = ?match_kind,
                "Proposed mapping"
            );
            proposals.push(ProposedMapping {
                mapping: FieldMapping::new(
                    target.clone(),
                    MappingExpression::reference(field.source_id.clone(), field.path.clone()),
                ),
                match_kind,
                sample: field.sample.clone(),
            });
        }
    }

    proposals
}

fn partial_match<'f>(fields: &'f [FlatField], leaf: &str, min_len: usize) -> Option<&'f FlatField> {
    if leaf.chars().count() < min_len {
        return None;
    }
    fields.iter().find(|field| {
        field.leaf.chars().count() >= min_len
            && (field.leaf.contains(leaf) || leaf.contains(field.leaf.as_str()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn paths(fields: &[FlatField]) -> Vec<&str> {
        fields.iter().map(|f| f.path.as_str()).collect()
    }

    fn targets(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_flatten_objects_arrays_and_samples() {
        let output = json!({
            "from": "a@x.com",
            "meta": {"labels": ["inbox", "work", "later", "old"]},
            "items": [{"id": 1}, {"id": 2}],
        });
        let config = AutoMapConfig {
            max_samples: 2,
            ..Default::default()
        };
        let fields = flatten("gmail", &output, &config);
        assert_eq!(
            paths(&fields),
            vec![
                "from",
                "items",
                "items[0].id",
                "items[1].id",
                "meta.labels",
                "meta.labels[0]",
                "meta.labels[1]",
            ]
        );
        let labels = fields.iter().find(|f| f.path == "meta.labels[0]").unwrap();
        assert_eq!(labels.leaf, "labels");
    }

    #[test]
    fn test_flatten_depth_bound() {
        let output = json!({"a": {"b": {"c": {"d": 1}}}, "top": 0});
        let config = AutoMapConfig {
            max_depth: 3,
            ..Default::default()
        };
        assert_eq!(paths(&flatten("s", &output, &config)), vec!["top"]);

        let config = AutoMapConfig {
            max_depth: 4,
            ..Default::default()
        };
        assert_eq!(paths(&flatten("s", &output, &config)), vec!["a.b.c.d", "top"]);
    }

    #[test]
    fn test_flatten_skips_unaddressable_keys() {
        let output = json!({"a.b": 1, "": 2, "ok": 3});
        let fields = flatten("s", &output, &AutoMapConfig::default());
        assert_eq!(paths(&fields), vec!["ok"]);
    }

    #[test]
    fn test_flatten_scalar_root_is_empty() {
        assert!(flatten("s", &json!("text"), &AutoMapConfig::default()).is_empty());
    }

    #[test]
    fn test_exact_match_case_insensitive() {
        let ctx = ExecutionContext::new().with_source("crm", json!({"Email": "a@x.com"}));
        let proposals = auto_map(&targets(&["lead.email"]), &ctx, &[], &AutoMapConfig::default());
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].match_kind, MatchKind::Exact);
        assert_eq!(
            proposals[0].mapping.expression,
            MappingExpression::reference("crm", "Email")
        );
        assert_eq!(proposals[0].sample, json!("a@x.com"));
    }

    #[test]
    fn test_exact_beats_partial_across_sources() {
        let ctx = ExecutionContext::new()
            .with_source("first", json!({"email_address": "p@x.com"}))
            .with_source("second", json!({"email": "e@x.com"}));
        let proposals = auto_map(&targets(&["email"]), &ctx, &[], &AutoMapConfig::default());
        assert_eq!(proposals[0].match_kind, MatchKind::Exact);
        assert_eq!(
            proposals[0].mapping.expression,
            MappingExpression::reference("second", "email")
        );
    }

    #[test]
    fn test_partial_match_either_direction() {
        let ctx = ExecutionContext::new().with_source("form", json!({"name": "Ada", "phone_number": "1"}));
        let proposals = auto_map(
            &targets(&["full_name", "phone"]),
            &ctx,
            &[],
            &AutoMapConfig::default(),
        );
        assert_eq!(proposals.len(), 2);
        assert_eq!(proposals[0].mapping.expression, MappingExpression::reference("form", "name"));
        assert_eq!(proposals[1].mapping.expression, MappingExpression::reference("form", "phone_number"));
        assert!(proposals.iter().all(|p| p.match_kind == MatchKind::Partial));
    }

    #[test]
    fn test_short_names_do_not_partially_match() {
        let ctx = ExecutionContext::new().with_source("s", json!({"identifier": 1}));
        let proposals = auto_map(&targets(&["id"]), &ctx, &[], &AutoMapConfig::default());
        assert!(proposals.is_empty());
    }

    #[test]
    fn test_existing_targets_are_skipped() {
        let ctx = ExecutionContext::new().with_source("gmail", json!({"from": "a@x.com", "subject": "Hi"}));
        let existing = vec![FieldMapping::new(
            "from",
            MappingExpression::static_value(json!("fixed")),
        )];
        let proposals = auto_map(
            &targets(&["from", "subject", "subject"]),
            &ctx,
            &existing,
            &AutoMapConfig::default(),
        );
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].mapping.target_field, "subject");
    }

    #[test]
    fn test_proposal_wire_shape() {
        let ctx = ExecutionContext::new().with_source("gmail", json!({"subject": "Hi"}));
        let proposals = auto_map(&targets(&["subject"]), &ctx, &[], &AutoMapConfig::default());
        let json = serde_json::to_value(&proposals[0]).unwrap();
        assert_eq!(json["matchKind"], "exact");
        assert_eq!(json["mapping"]["targetField"], "subject");
        assert_eq!(json["mapping"]["expression"]["kind"], "reference");
    }
}
