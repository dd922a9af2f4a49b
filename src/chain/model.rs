use serde::{Deserialize, Serialize};

use super::render::RenderChain;
use super::unit::{Clamp, EffectUnit, UnitId, UnitSpec};
use crate::error::ChainError;
use crate::fx::EffectKind;

/// Ordered, immutable list of effect units. Signal flows from index 0 to
/// the last unit. Every edit returns a new chain; the original is untouched
/// so a chain handed to the engine is never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "Vec<UnitSpec>", try_from = "Vec<UnitSpec>")]
pub struct EffectChain {
    units: Vec<EffectUnit>,
}

impl EffectChain {
    /// Empty chain (pass-through)
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_units(units: Vec<EffectUnit>) -> Self {
        Self { units }
    }

    /// Build from unit specs. Kinds and parameter names must be known and
    /// values finite; out-of-range values are clamped, never rejected.
    pub fn build(specs: &[UnitSpec]) -> Result<Self, ChainError> {
        let (chain, clamps) = Self::build_reporting(specs)?;
        for clamp in &clamps {
            tracing::debug!(%clamp, "parameter clamped during chain build");
        }
        Ok(chain)
    }

    /// Like [`EffectChain::build`] but also returns every clamp applied.
    pub fn build_reporting(specs: &[UnitSpec]) -> Result<(Self, Vec<Clamp>), ChainError> {
        let mut units = Vec::with_capacity(specs.len());
        let mut clamps = Vec::new();
        for spec in specs {
            let kind =
                EffectKind::from_name(&spec.kind).ok_or_else(|| ChainError::UnknownKind(spec.kind.clone()))?;
            let mut unit = EffectUnit::new(kind);
            unit.set_bypassed(spec.bypassed);
            for (name, &value) in &spec.parameters {
                if let Some(clamp) = unit.set_value(name, value)? {
                    clamps.push(clamp);
                }
            }
            units.push(unit);
        }
        Ok((Self { units }, clamps))
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn units(&self) -> &[EffectUnit] {
        &self.units
    }

    pub fn get(&self, index: usize) -> Option<&EffectUnit> {
        self.units.get(index)
    }

    pub fn position(&self, id: UnitId) -> Option<usize> {
        self.units.iter().position(|u| u.id() == id)
    }

    pub fn specs(&self) -> Vec<UnitSpec> {
        self.units.iter().map(EffectUnit::spec).collect()
    }

    fn check(&self, index: usize) -> Result<(), ChainError> {
        if index < self.units.len() {
            Ok(())
        } else {
            Err(ChainError::IndexOutOfRange {
                index,
                len: self.units.len(),
            })
        }
    }

    /// Move the unit at `from` so it ends up at `to`. Units keep their
    /// identity and values.
    pub fn reorder(&self, from: usize, to: usize) -> Result<Self, ChainError> {
        self.check(from)?;
        self.check(to)?;
        let mut units = self.units.clone();
        let unit = units.remove(from);
        units.insert(to, unit);
        Ok(Self { units })
    }

    pub fn set_bypass(&self, index: usize, bypassed: bool) -> Result<Self, ChainError> {
        self.check(index)?;
        let mut next = self.clone();
        next.units[index].set_bypassed(bypassed);
        Ok(next)
    }

    /// Set one parameter, clamped to its bounds
    pub fn set_parameter(&self, index: usize, name: &str, value: f64) -> Result<Self, ChainError> {
        self.check(index)?;
        let mut next = self.clone();
        if let Some(clamp) = next.units[index].set_value(name, value)? {
            tracing::debug!(%clamp, index, "parameter clamped");
        }
        Ok(next)
    }

    /// Insert a palette unit with default values. `index == len` appends.
    pub fn insert(&self, index: usize, kind: EffectKind) -> Result<Self, ChainError> {
        if index > self.units.len() {
            return Err(ChainError::IndexOutOfRange {
                index,
                len: self.units.len(),
            });
        }
        let mut units = self.units.clone();
        units.insert(index, EffectUnit::new(kind));
        Ok(Self { units })
    }

    pub fn remove(&self, index: usize) -> Result<Self, ChainError> {
        self.check(index)?;
        let mut units = self.units.clone();
        units.remove(index);
        Ok(Self { units })
    }

    /// Mark a unit bypassed by identity; used when the engine reports a fault.
    pub fn bypass_unit(&self, id: UnitId) -> Option<Self> {
        let index = self.position(id)?;
        self.set_bypass(index, true).ok()
    }

    /// Allocate DSP state for every unit, ready for the audio thread.
    pub fn prepare(&self, sample_rate: f32, max_block: usize) -> RenderChain {
        RenderChain::new(self, sample_rate, max_block)
    }
}

impl From<EffectChain> for Vec<UnitSpec> {
    fn from(chain: EffectChain) -> Self {
        chain.specs()
    }
}

impl TryFrom<Vec<UnitSpec>> for EffectChain {
    type Error = ChainError;

    fn try_from(specs: Vec<UnitSpec>) -> Result<Self, Self::Error> {
        Self::build(&specs)
    }
}
