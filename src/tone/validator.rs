//! Best-effort conversion of an untrusted payload into an [`EffectChain`].
//!
//! Every field is re-checked against the effect catalog. Entries that cannot
//! be understood are dropped, unknown parameters are ignored, values are
//! clamped, and each of these produces a [`ValidationWarning`]. Only a
//! payload that yields no unit at all is rejected.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::chain::{EffectChain, EffectUnit};
use crate::error::ValidationError;
use crate::fx::{EffectKind, ParamValues};

const KIND_KEYS: [&str; 5] = ["kind", "plugin", "effect", "type", "name"];
const PARAM_KEYS: [&str; 3] = ["parameters", "params", "settings"];
const LIST_KEYS: [&str; 5] = ["effects", "chain", "plugins", "units", "pedals"];

/// Something the validator changed or discarded
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum ValidationWarning {
    UnknownKind { index: usize, name: String },
    MalformedEntry { index: usize, reason: String },
    UnknownParameter { index: usize, kind: EffectKind, name: String },
    NonNumericParameter { index: usize, kind: EffectKind, name: String },
    Clamped { index: usize, kind: EffectKind, name: String, requested: f64, applied: f32 },
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationWarning::UnknownKind { index, name } => {
                write!(f, "entry {}: unknown effect '{}' dropped", index, name)
            }
            ValidationWarning::MalformedEntry { index, reason } => {
                write!(f, "entry {}: dropped, {}", index, reason)
            }
            ValidationWarning::UnknownParameter { index, kind, name } => {
                write!(f, "entry {}: {} has no parameter '{}', ignored", index, kind.key(), name)
            }
            ValidationWarning::NonNumericParameter { index, kind, name } => {
                write!(f, "entry {}: {}.{} is not a number, default kept", index, kind.key(), name)
            }
            ValidationWarning::Clamped {
                index,
                kind,
                name,
                requested,
                applied,
            } => write!(
                f,
                "entry {}: {}.{} = {} clamped to {}",
                index,
                kind.key(),
                name,
                requested,
                applied
            ),
        }
    }
}

/// A chain built from untrusted input plus what was changed on the way
#[derive(Debug, Clone)]
pub struct ValidatedChain {
    pub chain: EffectChain,
    pub warnings: Vec<ValidationWarning>,
}

/// Validate a payload: an array of entries, or an object holding one under
/// `effects`, `chain`, `plugins`, `units` or `pedals`.
pub fn validate(payload: &Value) -> Result<ValidatedChain, ValidationError> {
    let entries = entry_list(payload).ok_or(ValidationError::NotAChain)?;

    let mut units = Vec::with_capacity(entries.len());
    let mut warnings = Vec::new();
    let mut dropped = 0;

    for (index, entry) in entries.iter().enumerate() {
        match validate_entry(index, entry, &mut warnings) {
            Some(unit) => units.push(unit),
            None => dropped += 1,
        }
    }

    for warning in &warnings {
        tracing::warn!(%warning, "tone payload adjusted");
    }

    if units.is_empty() {
        return Err(ValidationError::NoUsableUnits { dropped });
    }

    Ok(ValidatedChain {
        chain: EffectChain::from_units(units),
        warnings,
    })
}

fn entry_list(payload: &Value) -> Option<&Vec<Value>> {
    match payload {
        Value::Array(entries) => Some(entries),
        Value::Object(map) => LIST_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array)),
        _ => None,
    }
}

fn first<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| map.get(*key))
}

fn validate_entry(index: usize, entry: &Value, warnings: &mut Vec<ValidationWarning>) -> Option<EffectUnit> {
    let malformed = |reason: &str| ValidationWarning::MalformedEntry {
        index,
        reason: reason.to_string(),
    };

    let Some(map) = entry.as_object() else {
        warnings.push(malformed("not an object"));
        return None;
    };

    let Some(name) = first(map, &KIND_KEYS).and_then(Value::as_str) else {
        warnings.push(malformed("no effect kind"));
        return None;
    };

    let Some(kind) = EffectKind::from_name(name) else {
        warnings.push(ValidationWarning::UnknownKind {
            index,
            name: name.to_string(),
        });
        return None;
    };

    let empty = Map::new();
    let params = match first(map, &PARAM_KEYS) {
        None | Some(Value::Null) => &empty,
        Some(Value::Object(params)) => params,
        Some(_) => {
            warnings.push(malformed("parameters are not an object"));
            return None;
        }
    };

    let mut values = ParamValues::defaults(kind);
    for (name, raw) in params {
        let Some((slot, scale)) = kind.resolve_param(name) else {
            warnings.push(ValidationWarning::UnknownParameter {
                index,
                kind,
                name: name.clone(),
            });
            continue;
        };
        let spec = &kind.params()[slot];

        let Some(requested) = number(raw).map(|n| n * f64::from(scale)) else {
            warnings.push(ValidationWarning::NonNumericParameter {
                index,
                kind,
                name: spec.key.to_string(),
            });
            continue;
        };

        let applied = spec.clamp(requested as f32);
        if !spec.contains(requested as f32) {
            warnings.push(ValidationWarning::Clamped {
                index,
                kind,
                name: spec.key.to_string(),
                requested,
                applied,
            });
        }
        values.set(slot, applied);
    }

    let bypassed = match map.get("bypassed").or_else(|| map.get("bypass")) {
        Some(v) => v.as_bool().unwrap_or(false),
        None => map.get("enabled").and_then(Value::as_bool).map(|e| !e).unwrap_or(false),
    };

    Some(EffectUnit::with_values(kind, values, bypassed))
}

/// Finite number from a JSON number or numeric string
fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}
