//! Named chain presets stored as pretty JSON.
//!
//! Current format: `{"version": 1, "name": "...", "units": [{kind, parameters, bypassed}]}`.
//! A bare JSON array is read as the legacy `[{"plugin", "params"}]` shape and
//! migrated through the tone validator.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::model::EffectChain;
use super::unit::UnitSpec;
use crate::error::PresetError;
use crate::tone::{validate, ValidationWarning};

pub const PRESET_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub name: String,
    pub chain: EffectChain,
}

#[derive(Serialize, Deserialize)]
struct PresetFile {
    version: u32,
    name: String,
    units: Vec<UnitSpec>,
}

impl Preset {
    pub fn new(name: impl Into<String>, chain: EffectChain) -> Self {
        Self {
            name: name.into(),
            chain,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), PresetError> {
        let file = PresetFile {
            version: PRESET_VERSION,
            name: self.name.clone(),
            units: self.chain.specs(),
        };
        let display = path.display().to_string();
        let json = serde_json::to_string_pretty(&file).map_err(|source| PresetError::Parse {
            path: display.clone(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| PresetError::Io { path: display, source })?;
        tracing::info!(path = %path.display(), units = self.chain.len(), "preset saved");
        Ok(())
    }

    /// Load a preset. Warnings are only produced by legacy files.
    pub fn load(path: &Path) -> Result<(Self, Vec<ValidationWarning>), PresetError> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| PresetError::Io {
            path: display.clone(),
            source,
        })?;
        let value: Value = serde_json::from_str(&text).map_err(|source| PresetError::Parse {
            path: display.clone(),
            source,
        })?;

        if value.is_array() {
            let validated = validate(&value)?;
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            tracing::info!(path = %path.display(), warnings = validated.warnings.len(), "migrated legacy preset");
            return Ok((Self::new(name, validated.chain), validated.warnings));
        }

        let file: PresetFile = serde_json::from_value(value).map_err(|source| PresetError::Parse {
            path: display.clone(),
            source,
        })?;
        if file.version > PRESET_VERSION {
            return Err(PresetError::UnsupportedVersion {
                found: file.version,
                supported: PRESET_VERSION,
            });
        }

        let chain = EffectChain::build(&file.units)?;
        tracing::debug!(path = %path.display(), units = chain.len(), "preset loaded");
        Ok((Self::new(file.name, chain), Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fx::EffectKind;

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crunch.json");
        let chain = EffectChain::build(&[
            UnitSpec::new("noise_gate").param("threshold", -50.0),
            UnitSpec::new("distortion").param("drive", 35.0).bypassed(true),
        ])
        .unwrap();
        Preset::new("Crunch", chain.clone()).save(&path).unwrap();

        let (loaded, warnings) = Preset::load(&path).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(loaded.name, "Crunch");
        assert_eq!(loaded.chain.specs(), chain.specs());
    }

    #[test]
    fn legacy_array_is_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old_tone.json");
        std::fs::write(
            &path,
            r#"[{"plugin": "HighpassFilter", "params": {"cutoff_frequency_hz": 5000}},
                {"plugin": "Bitcrusher", "params": {}}]"#,
        )
        .unwrap();

        let (preset, warnings) = Preset::load(&path).unwrap();
        assert_eq!(preset.name, "old_tone");
        assert_eq!(preset.chain.len(), 1);
        assert_eq!(preset.chain.units()[0].kind(), EffectKind::Highpass);
        assert_eq!(preset.chain.units()[0].parameter("cutoff"), Some(2000.0));
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn newer_version_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.json");
        std::fs::write(&path, r#"{"version": 9, "name": "x", "units": []}"#).unwrap();
        assert!(matches!(
            Preset::load(&path),
            Err(PresetError::UnsupportedVersion { found: 9, supported: 1 })
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Preset::load(Path::new("/nonexistent/tone.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/tone.json"));
    }
}
