use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::ChainError;
use crate::fx::{EffectKind, ParamValues};

static NEXT_UNIT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a unit across edits of the same chain. Lets the engine
/// carry DSP state over when an edited chain replaces the active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(u64);

impl UnitId {
    pub fn fresh() -> Self {
        Self(NEXT_UNIT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

/// One effect in a chain: a kind, its parameter values and a bypass flag
#[derive(Debug, Clone, PartialEq)]
pub struct EffectUnit {
    id: UnitId,
    kind: EffectKind,
    params: ParamValues,
    bypassed: bool,
}

impl EffectUnit {
    /// Palette unit with default parameters
    pub fn new(kind: EffectKind) -> Self {
        Self {
            id: UnitId::fresh(),
            kind,
            params: ParamValues::defaults(kind),
            bypassed: false,
        }
    }

    pub(crate) fn with_values(kind: EffectKind, params: ParamValues, bypassed: bool) -> Self {
        Self {
            id: UnitId::fresh(),
            kind,
            params,
            bypassed,
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn kind(&self) -> EffectKind {
        self.kind
    }

    pub fn params(&self) -> &ParamValues {
        &self.params
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    /// Current value of a parameter by key or alias
    pub fn parameter(&self, name: &str) -> Option<f32> {
        self.kind.param_index(name).map(|i| self.params.get(i))
    }

    /// Parameter map keyed by canonical key
    pub fn parameters(&self) -> BTreeMap<String, f64> {
        self.kind
            .params()
            .iter()
            .zip(self.params.as_slice())
            .map(|(spec, &v)| (spec.key.to_string(), v as f64))
            .collect()
    }

    pub fn spec(&self) -> UnitSpec {
        UnitSpec {
            kind: self.kind.key().to_string(),
            parameters: self.parameters(),
            bypassed: self.bypassed,
        }
    }

    pub(crate) fn set_bypassed(&mut self, bypassed: bool) {
        self.bypassed = bypassed;
    }

    /// Clamp and store one value. Returns the clamp report when the value
    /// was outside the declared bounds.
    pub(crate) fn set_value(&mut self, name: &str, value: f64) -> Result<Option<Clamp>, ChainError> {
        let index = self.kind.param_index(name).ok_or_else(|| ChainError::UnknownParameter {
            kind: self.kind.key(),
            name: name.to_string(),
        })?;
        let spec = &self.kind.params()[index];
        if !value.is_finite() {
            return Err(ChainError::NonFiniteValue {
                kind: self.kind.key(),
                name: spec.key.to_string(),
            });
        }

        let applied = spec.clamp(value as f32);
        self.params.set(index, applied);
        if spec.contains(value as f32) {
            Ok(None)
        } else {
            Ok(Some(Clamp {
                kind: self.kind,
                param: spec.key,
                requested: value,
                applied,
            }))
        }
    }
}

/// A value pulled back into a parameter's bounds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Clamp {
    pub kind: EffectKind,
    pub param: &'static str,
    pub requested: f64,
    pub applied: f32,
}

impl std::fmt::Display for Clamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{} = {} clamped to {}",
            self.kind.key(),
            self.param,
            self.requested,
            self.applied
        )
    }
}

/// Serialised unit: `{kind, parameters, bypassed}`. Used by presets, the
/// control socket and `EffectChain::build`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSpec {
    pub kind: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
    #[serde(default)]
    pub bypassed: bool,
}

impl UnitSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            parameters: BTreeMap::new(),
            bypassed: false,
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn bypassed(mut self, bypassed: bool) -> Self {
        self.bypassed = bypassed;
        self
    }
}
