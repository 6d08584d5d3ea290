//! Differ - Detect drift between desired and recorded backend configuration
//!
//! The recorded configuration comes from the state-storage tool's own
//! metadata, which serializes some scalars differently from how users write
//! them (e.g. booleans as `"true"`). A table of coercion rules normalizes the
//! recorded values before the structural comparison so that such differences
//! are not reported as drift. Attributes the tool records as `null` because
//! they were never set are dropped first.

use serde_json::{Number, Value};

use crate::config::{BackendRecord, ConfigMap, filter_provider_only_keys, parse_bool};

/// Rewrites a recorded value into the representation used by the desired one
pub struct CoercionRule {
    pub name: &'static str,
    /// Returns the coerced recorded value, or `None` if the rule does not apply
    pub apply: fn(recorded: &Value, desired: &Value) -> Option<Value>,
}

/// Coercions applied, in order, to each key present on both sides
pub const COERCION_RULES: &[CoercionRule] = &[
    CoercionRule {
        name: "string-encoded bool",
        apply: coerce_bool,
    },
    CoercionRule {
        name: "string-encoded number",
        apply: coerce_number,
    },
];

fn coerce_bool(recorded: &Value, desired: &Value) -> Option<Value> {
    match (recorded, desired) {
        (Value::String(s), Value::Bool(_)) => parse_bool(s).map(Value::Bool),
        _ => None,
    }
}

fn coerce_number(recorded: &Value, desired: &Value) -> Option<Value> {
    match (recorded, desired) {
        (Value::String(s), Value::Number(_)) => {
            if let Ok(i) = s.parse::<i64>() {
                Some(Value::Number(i.into()))
            } else {
                s.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
            }
        }
        _ => None,
    }
}

/// Copy of `recorded` without `null` attributes that `desired` does not set
pub fn drop_unset(recorded: &ConfigMap, desired: &ConfigMap) -> ConfigMap {
    recorded
        .iter()
        .filter(|(key, value)| !(value.is_null() && !desired.contains_key(*key)))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Copy of `recorded` with values coerced towards the types used in `desired`
pub fn coerce_recorded(recorded: &ConfigMap, desired: &ConfigMap) -> ConfigMap {
    let mut coerced = recorded.clone();

    for (key, value) in coerced.iter_mut() {
        let Some(desired_value) = desired.get(key) else {
            continue;
        };

        if let Some(rule_value) = COERCION_RULES
            .iter()
            .find_map(|rule| (rule.apply)(value, desired_value))
        {
            *value = rule_value;
        }
    }

    coerced
}

/// Keys whose values differ between the two maps
pub fn changed_keys(desired: &ConfigMap, recorded: &ConfigMap) -> Vec<String> {
    let mut changed: Vec<String> = desired
        .iter()
        .filter(|(key, value)| recorded.get(*key) != Some(*value))
        .map(|(key, _)| key.clone())
        .chain(
            recorded
                .keys()
                .filter(|key| !desired.contains_key(*key))
                .cloned(),
        )
        .collect();
    changed.sort();
    changed
}

/// Returns true if the backend must be re-initialized
///
/// Provisioning-only keys are stripped from `desired` before any coercion
/// or comparison, so they never cause drift.
pub fn needs_reinit(
    desired: &ConfigMap,
    existing: Option<&BackendRecord>,
    expected_type: &str,
    provider_only_keys: &[&str],
) -> bool {
    let Some(existing) = existing else {
        return !desired.is_empty();
    };

    if existing.backend_type != expected_type {
        log::debug!(
            "Backend type has changed from {} to {}",
            existing.backend_type,
            expected_type
        );
        return true;
    }

    if desired.is_empty() && existing.config.is_empty() {
        return false;
    }

    let comparison = filter_provider_only_keys(desired, provider_only_keys);
    let recorded = drop_unset(&existing.config, &comparison);
    let recorded = coerce_recorded(&recorded, &comparison);

    if recorded != comparison {
        log::debug!(
            "Backend config changed in {:?}: from {:?} to {:?}",
            changed_keys(&comparison, &recorded),
            recorded,
            comparison
        );
        return true;
    }

    false
}
