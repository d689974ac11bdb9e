//! Schema-driven planning.
//!
//! JSON has no "unknown" marker, so a `null` in planned state stands for a
//! value the provider will only learn while applying. The rules:
//!
//! - configured values win;
//! - unset attributes with a default get the default;
//! - unset optional+computed attributes keep their prior value;
//! - computed-only attributes keep their prior value when nothing changes,
//!   or when flagged `use_state_for_unknown`; otherwise they become unknown;
//! - a changed `force_new` attribute requires replacement.

use serde_json::{Map, Value};

use crate::schema::{Attribute, AttributeType, Schema};
use crate::types::{AttributeChange, PlanResult};

/// Plan a resource change. `proposed` is `Null` when the resource is being destroyed.
pub fn plan_resource(schema: &Schema, prior: Option<&Value>, proposed: &Value) -> PlanResult {
    let prior_obj = prior.and_then(Value::as_object);

    if proposed.is_null() {
        return plan_destroy(prior_obj);
    }

    let empty = Map::new();
    let proposed_obj = proposed.as_object().unwrap_or(&empty);
    let mut planned = proposed_obj.clone();
    let mut changes = Vec::new();
    let mut requires_replace = false;

    for (name, attr) in &schema.attributes {
        if attr.flags.is_computed_only() {
            continue;
        }

        let before = prior_obj.and_then(|p| p.get(name)).map(|v| normalize(attr, v));
        let after = planned_value(attr, proposed_obj.get(name), before.as_ref());

        if let Some(change) = diff(name, before.as_ref(), &after) {
            requires_replace |= prior_obj.is_some() && attr.force_new;
            changes.push(change);
        }
        planned.insert(name.clone(), after);
    }

    for (name, attr) in &schema.attributes {
        if !attr.flags.is_computed_only() {
            continue;
        }
        let keep_prior =
            !requires_replace && (changes.is_empty() || attr.use_state_for_unknown);
        let value = match prior_obj.and_then(|p| p.get(name)) {
            Some(prior_value) if keep_prior => prior_value.clone(),
            _ => Value::Null,
        };
        planned.insert(name.clone(), value);
    }

    PlanResult {
        planned_state: Value::Object(planned),
        changes,
        requires_replace,
    }
}

fn plan_destroy(prior: Option<&Map<String, Value>>) -> PlanResult {
    let changes = prior
        .into_iter()
        .flatten()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| AttributeChange::removed(name.clone(), value.clone()))
        .collect();

    PlanResult {
        planned_state: Value::Null,
        changes,
        requires_replace: false,
    }
}

fn planned_value(attr: &Attribute, configured: Option<&Value>, prior: Option<&Value>) -> Value {
    if let Some(value) = configured.filter(|v| !v.is_null()) {
        return normalize(attr, value);
    }
    if let Some(default) = &attr.default {
        return normalize(attr, default);
    }
    match prior {
        Some(value) if attr.flags.computed => value.clone(),
        _ => Value::Null,
    }
}

/// Int64 attributes may arrive as integral floats (`10.0`); store them as integers.
fn normalize(attr: &Attribute, value: &Value) -> Value {
    match (&attr.attr_type, value) {
        (AttributeType::Int64, Value::Number(n)) if n.as_i64().is_none() => n
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| Value::from(f as i64))
            .unwrap_or_else(|| value.clone()),
        _ => value.clone(),
    }
}

fn diff(name: &str, before: Option<&Value>, after: &Value) -> Option<AttributeChange> {
    let before = before.filter(|v| !v.is_null());
    match (before, after.is_null()) {
        (None, true) => None,
        (None, false) => Some(AttributeChange::added(name, after.clone())),
        (Some(b), true) => Some(AttributeChange::removed(name, b.clone())),
        (Some(b), false) if b != after => {
            Some(AttributeChange::modified(name, b.clone(), after.clone()))
        },
        _ => None,
    }
}
