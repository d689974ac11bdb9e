//! Configuration validation against a [`Schema`].
//!
//! Besides presence and type checks, the attribute-level validators declared
//! on the schema (`one_of`, `conflicts_with`, `at_least_one_of`) are enforced
//! here so adapters never see a configuration that breaks them.
//!
//! # Example
//!
//! ```
//! use gitlab_provider::schema::{Attribute, Schema};
//! use gitlab_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute("projects_limit", Attribute::optional_int64());
//!
//! assert!(validate(&schema, &json!({"name": "jane"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"name": "jane", "projects_limit": "ten"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute.as_deref(), Some("projects_limit"));
//! ```

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::schema::{Attribute, AttributeType, Diagnostic, Schema};

/// Validate a configuration object against a schema.
///
/// Returns one diagnostic per problem; an empty list means the value is valid.
/// Computed-only attributes are skipped since the provider sets them.
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return Vec::new(),
        other => {
            return vec![Diagnostic::error("Expected object")
                .with_detail(format!("Got {}", value_type_name(other)))]
        },
    };

    let mut diagnostics = Vec::new();
    let mut groups_checked = BTreeSet::new();

    for (name, attr) in &schema.attributes {
        if attr.flags.is_computed_only() {
            continue;
        }

        match obj.get(name) {
            None | Some(Value::Null) => {
                if attr.flags.required {
                    diagnostics.push(
                        Diagnostic::error(format!("Missing required attribute '{}'", name))
                            .with_detail("This attribute is required and must be provided")
                            .with_attribute(name.as_str()),
                    );
                }
            },
            Some(v) => {
                validate_type(&attr.attr_type, v, name, &mut diagnostics);
                validate_one_of(attr, v, name, &mut diagnostics);
                validate_conflicts(attr, obj, name, &mut diagnostics);
            },
        }

        if !attr.at_least_one_of.is_empty() && groups_checked.insert(attr.at_least_one_of.clone()) {
            validate_at_least_one_of(&attr.at_least_one_of, obj, &mut diagnostics);
        }
    }

    diagnostics
}

fn validate_type(ty: &AttributeType, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    match ty {
        AttributeType::String if !value.is_string() => {
            diagnostics.push(type_error(path, "string", value))
        },
        AttributeType::Int64 if !is_int64(value) => {
            diagnostics.push(type_error(path, "int64", value))
        },
        AttributeType::Bool if !value.is_boolean() => {
            diagnostics.push(type_error(path, "bool", value))
        },
        AttributeType::List(element) => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    validate_type(element, item, &format!("{}.{}", path, i), diagnostics);
                }
            },
            None => diagnostics.push(type_error(path, "list", value)),
        },
        AttributeType::Object(fields) => match value.as_object() {
            Some(obj) => {
                for (name, field_ty) in fields {
                    if let Some(v) = obj.get(name).filter(|v| !v.is_null()) {
                        validate_type(field_ty, v, &format!("{}.{}", path, name), diagnostics);
                    }
                }
            },
            None => diagnostics.push(type_error(path, "object", value)),
        },
        _ => {},
    }
}

fn validate_one_of(attr: &Attribute, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    if attr.one_of.is_empty() {
        return;
    }
    if let Some(s) = value.as_str() {
        if !attr.one_of.iter().any(|allowed| allowed == s) {
            diagnostics.push(
                Diagnostic::error(format!("Invalid value for '{}'", path))
                    .with_detail(format!(
                        "Expected one of [{}], got \"{}\"",
                        attr.one_of.join(", "),
                        s
                    ))
                    .with_attribute(path),
            );
        }
    }
}

fn validate_conflicts(
    attr: &Attribute,
    obj: &Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for other in &attr.conflicts_with {
        if is_set(obj, other) {
            diagnostics.push(
                Diagnostic::error("Conflicting attributes")
                    .with_detail(format!(
                        "'{}' cannot be specified when '{}' is specified",
                        path, other
                    ))
                    .with_attribute(path),
            );
        }
    }
}

fn validate_at_least_one_of(
    group: &[String],
    obj: &Map<String, Value>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if group.iter().any(|name| is_set(obj, name)) {
        return;
    }
    let names = match group {
        [a, b] => format!("either {} or {}", a, b),
        _ => group.join(", "),
    };
    diagnostics.push(
        Diagnostic::error(format!("At least one of {} must be defined", names))
            .with_attribute(group[0].as_str()),
    );
}

fn is_set(obj: &Map<String, Value>, name: &str) -> bool {
    obj.get(name).is_some_and(|v| !v.is_null())
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Integers, and floats with no fractional part, are accepted as int64.
fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
        },
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}
