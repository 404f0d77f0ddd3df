//! End-to-end resolution scenarios through the public engine API.

use fieldmap_core::error::ErrorCode;
use fieldmap_core::path;
use fieldmap_core::reference::resolve_reference;
use fieldmap_core::{
    EngineConfig, ExecutionContext, FieldMapping, MappingEngine, MappingError, MappingExpression,
    Reference, ValidationRule,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn gmail_ctx() -> ExecutionContext {
    ExecutionContext::new().with_source("gmail", json!({"from": "a@x.com", "subject": "Hi"}))
}

#[test]
fn test_scenario_a_reference_into_nested_target() {
    let engine = MappingEngine::default();
    let mappings = vec![FieldMapping::new(
        "lead.email",
        MappingExpression::reference("gmail", "from"),
    )];
    let result = engine.test_mappings(&mappings, &gmail_ctx()).unwrap();
    assert_eq!(result.output, json!({"lead": {"email": "a@x.com"}}));
    assert!(result.errors.is_empty());
}

#[test]
fn test_scenario_b_template() {
    let engine = MappingEngine::default();
    let mappings = vec![FieldMapping::new(
        "greeting",
        MappingExpression::template("Hello {{gmail.from}}"),
    )];
    let result = engine.test_mappings(&mappings, &gmail_ctx()).unwrap();
    assert_eq!(result.output["greeting"], "Hello a@x.com");
    assert!(result.is_complete());
}

#[test]
fn test_scenario_c_fallback() {
    let engine = MappingEngine::default();
    let mappings = vec![FieldMapping::new(
        "lead.note",
        MappingExpression::references(vec![
            Reference::new("gmail", "missing.field").with_fallback(json!("N/A")),
        ]),
    )];
    let result = engine.test_mappings(&mappings, &gmail_ctx()).unwrap();
    assert_eq!(result.get("lead.note"), Some(&json!("N/A")));
    assert!(result.errors.is_empty());
}

#[test]
fn test_scenario_d_duplicate_target_rejected_up_front() {
    let engine = MappingEngine::default();
    let mappings = vec![
        FieldMapping::new("lead.email", MappingExpression::reference("gmail", "from")),
        FieldMapping::new("lead.email", MappingExpression::expression("nonexistent(")),
    ];
    let err = engine.test_mappings(&mappings, &gmail_ctx()).unwrap_err();
    assert_eq!(
        err,
        MappingError::DuplicateTargetField {
            target: "lead.email".into()
        }
    );
    assert_eq!(err.code(), ErrorCode::DuplicateTargetField);
}

#[test]
fn test_middle_failure_does_not_abort_batch() {
    let engine = MappingEngine::default();
    let mappings = vec![
        FieldMapping::new("first", MappingExpression::reference("gmail", "from")),
        FieldMapping::new("second", MappingExpression::expression("explode(gmail.from)")),
        FieldMapping::new("third", MappingExpression::reference("gmail", "subject")),
    ];
    let result = engine.test_mappings(&mappings, &gmail_ctx()).unwrap();
    assert_eq!(result.output, json!({"first": "a@x.com", "third": "Hi"}));
    assert_eq!(result.errors.keys().collect::<Vec<_>>(), vec!["second"]);
    assert_eq!(result.errors["second"].code, ErrorCode::ExpressionRuntimeError);
}

#[test]
fn test_unresolved_path_omits_key_with_single_error() {
    let engine = MappingEngine::default();
    let mappings = vec![FieldMapping::new(
        "lead.phone",
        MappingExpression::reference("gmail", "phone"),
    )];
    let first = engine.test_mappings(&mappings, &gmail_ctx()).unwrap();
    assert_eq!(first.output, json!({}));
    assert_eq!(first.errors.len(), 1);
    assert_eq!(first.errors["lead.phone"].code, ErrorCode::UnresolvedPath);

    let second = engine.test_mappings(&mappings, &gmail_ctx()).unwrap();
    assert_eq!(second, first);
}

#[test]
fn test_unknown_source_is_distinct_from_unresolved_path() {
    let engine = MappingEngine::default();
    let mappings = vec![FieldMapping::new(
        "user",
        MappingExpression::reference("slack", "user"),
    )];
    let result = engine.test_mappings(&mappings, &gmail_ctx()).unwrap();
    assert_eq!(result.errors["user"].code, ErrorCode::UnknownSourceReference);
}

#[test]
fn test_required_absent_always_fails_validation() {
    let engine = MappingEngine::default();
    let mappings = vec![
        FieldMapping::new("a", MappingExpression::reference("gmail", "nope"))
            .with_validation(ValidationRule::required()),
        FieldMapping::new("b", MappingExpression::reference("nowhere", "x"))
            .with_validation(ValidationRule::required()),
        FieldMapping::new("c", MappingExpression::static_value(serde_json::Value::Null))
            .with_validation(ValidationRule::required()),
        FieldMapping::new("d", MappingExpression::expression("gmail.missing"))
            .with_validation(ValidationRule::required()),
        FieldMapping::new("e", MappingExpression::expression("upper(coalesce(gmail.cc, gmail.bcc))"))
            .with_validation(ValidationRule::required()),
        FieldMapping::new("f", MappingExpression::strict_template("Hi {{gmail.missing}}"))
            .with_validation(ValidationRule::required()),
    ];
    let result = engine.test_mappings(&mappings, &gmail_ctx()).unwrap();
    for target in ["a", "b", "c", "d", "e", "f"] {
        assert_eq!(result.errors[target].code, ErrorCode::ValidationFailed, "{target}");
        assert_eq!(result.errors[target].reasons[0], "value is required");
    }
    assert_eq!(result.output, json!({}));
}

#[test]
fn test_required_keeps_non_absence_failures() {
    let engine = MappingEngine::default();
    let mappings = vec![
        FieldMapping::new("syntax", MappingExpression::expression("gmail.from +"))
            .with_validation(ValidationRule::required()),
        FieldMapping::new("tokens", MappingExpression::strict_template("{{gmail.missing}} {{ shout(1) }}"))
            .with_validation(ValidationRule::required()),
    ];
    let result = engine.test_mappings(&mappings, &gmail_ctx()).unwrap();
    assert_eq!(result.errors["syntax"].code, ErrorCode::ExpressionSyntaxError);
    assert_eq!(result.errors["tokens"].code, ErrorCode::TemplateTokenError);
}

#[test]
fn test_missing_data_is_not_turned_into_values() {
    let engine = MappingEngine::default();
    let mappings = vec![
        FieldMapping::new("concat", MappingExpression::expression("concat(gmail.from, gmail.missing)")),
        FieldMapping::new("string", MappingExpression::expression("to_string(gmail.missing)")),
        FieldMapping::new("boolean", MappingExpression::expression("to_boolean(gmail.missing)")),
        FieldMapping::new("coalesce", MappingExpression::expression("coalesce(gmail.missing)")),
        FieldMapping::new(
            "fallback",
            MappingExpression::expression("coalesce(gmail.missing, gmail.subject)"),
        ),
    ];
    let result = engine.test_mappings(&mappings, &gmail_ctx()).unwrap();
    for target in ["concat", "string", "boolean", "coalesce"] {
        assert_eq!(result.errors[target].code, ErrorCode::ExpressionRuntimeError, "{target}");
        assert!(result.errors[target].message.contains("gmail.missing"));
    }
    assert_eq!(result.output, json!({"fallback": "Hi"}));
}

#[test]
fn test_expression_errors_by_kind() {
    let mut config = EngineConfig::default();
    config.expression.max_steps = 3;
    let engine = MappingEngine::with_config(config);
    let mappings = vec![
        FieldMapping::new("syntax", MappingExpression::expression("gmail.from +")),
        FieldMapping::new("runtime", MappingExpression::expression("gmail.cc")),
        FieldMapping::new(
            "timeout",
            MappingExpression::expression("concat(gmail.from, gmail.subject, 'x')"),
        ),
        FieldMapping::new("ok", MappingExpression::expression("lower(gmail.subject)")),
    ];
    let result = engine.test_mappings(&mappings, &gmail_ctx()).unwrap();
    assert_eq!(result.errors["syntax"].code, ErrorCode::ExpressionSyntaxError);
    assert_eq!(result.errors["runtime"].code, ErrorCode::ExpressionRuntimeError);
    assert_eq!(result.errors["timeout"].code, ErrorCode::ExpressionTimeout);
    assert_eq!(result.output, json!({"ok": "hi"}));
}

#[test]
fn test_variables_and_user_context() {
    let engine = MappingEngine::default();
    let ctx = gmail_ctx()
        .with_variable("region", json!("eu-west"))
        .with_user_value("name", json!("Ada"));
    let mappings = vec![
        FieldMapping::new("region", MappingExpression::expression("$vars.region")),
        FieldMapping::new(
            "signature",
            MappingExpression::template("{{ $user.name }} ({{ $vars.region }})"),
        ),
    ];
    let result = engine.test_mappings(&mappings, &ctx).unwrap();
    assert_eq!(
        result.output,
        json!({"region": "eu-west", "signature": "Ada (eu-west)"})
    );
}

#[test]
fn test_reference_matches_path_get() {
    let ctx = ExecutionContext::new().with_source(
        "crm",
        json!({"contacts": [{"name": "Ada", "tags": ["vip"]}, {"name": "Bob"}]}),
    );
    for p in ["contacts", "contacts[0].name", "contacts[0].tags[0]", "contacts[1]"] {
        let via_reference = resolve_reference(&Reference::new("crm", p), &ctx).unwrap();
        let via_path = path::get(ctx.source("crm"), p).cloned().unwrap();
        assert_eq!(via_reference, via_path);
    }
}

#[test]
fn test_wire_round_trip_through_json() {
    let raw = json!([
        {"targetField": "lead.email", "expression": {"kind": "reference", "references": [{"sourceId": "gmail", "path": "from"}]}},
        {"targetField": "greeting", "expression": {"kind": "template", "template": "Hi {{gmail.from}}"}},
        {"targetField": "tier", "expression": {"kind": "static", "value": "gold"}, "validation": {"required": true, "type": "string"}},
    ]);
    let mappings: Vec<FieldMapping> = serde_json::from_value(raw.clone()).unwrap();
    assert_eq!(serde_json::to_value(&mappings).unwrap(), raw);

    let result = MappingEngine::default()
        .test_mappings(&mappings, &gmail_ctx())
        .unwrap();
    let wire = serde_json::to_value(&result).unwrap();
    assert_eq!(wire["output"]["tier"], "gold");
    assert_eq!(wire["errors"], json!({}));
}

#[test]
fn test_auto_map_then_resolve() {
    let engine = MappingEngine::default();
    let ctx = ExecutionContext::new()
        .with_source("form", json!({"Full_Name": "Ada Lovelace", "contact": {"email": "ada@x.com"}}))
        .with_source("crm", json!({"email": "other@x.com", "company": "Analytical"}));
    let targets: Vec<String> = ["lead.email", "lead.name", "lead.company", "lead.fax"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let proposals = engine.auto_map(&targets, &ctx, &[]);
    let mapped: Vec<&str> = proposals
        .iter()
        .map(|p| p.mapping.target_field.as_str())
        .collect();
    assert_eq!(mapped, vec!["lead.email", "lead.name", "lead.company"]);

    let mappings: Vec<FieldMapping> = proposals.into_iter().map(|p| p.mapping).collect();
    let result = engine.test_mappings(&mappings, &ctx).unwrap();
    assert_eq!(
        result.output,
        json!({"lead": {"email": "ada@x.com", "name": "Ada Lovelace", "company": "Analytical"}})
    );
}

#[tokio::test]
async fn test_concurrent_pass_keeps_partial_semantics() {
    let engine = MappingEngine::default();
    let mappings = vec![
        FieldMapping::new("first", MappingExpression::reference("gmail", "from")),
        FieldMapping::new("second", MappingExpression::expression("explode()")),
        FieldMapping::new("third", MappingExpression::reference("gmail", "subject")),
    ];
    let result = engine
        .resolve_all_concurrent(mappings, Arc::new(gmail_ctx()))
        .await
        .unwrap();
    assert_eq!(result.output, json!({"first": "a@x.com", "third": "Hi"}));
    assert_eq!(result.errors.len(), 1);
}
