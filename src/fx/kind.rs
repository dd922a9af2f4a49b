use serde::{Deserialize, Serialize};

/// Version of the effect catalog and its wire names. Bump when a kind or a
/// parameter key/bound changes.
pub const SCHEMA_VERSION: u32 = 1;

/// Largest parameter count of any kind.
pub const MAX_PARAMS: usize = 5;

/// Upper bound of the delay `time` parameter. Delay lines are sized for it.
pub const MAX_DELAY_SECS: f32 = 2.0;

/// Unit a parameter value is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamUnit {
    Decibels,
    Hertz,
    Milliseconds,
    Seconds,
    Ratio,
    Normalized,
}

impl ParamUnit {
    pub fn suffix(&self) -> &'static str {
        match self {
            ParamUnit::Decibels => "dB",
            ParamUnit::Hertz => "Hz",
            ParamUnit::Milliseconds => "ms",
            ParamUnit::Seconds => "s",
            ParamUnit::Ratio => ":1",
            ParamUnit::Normalized => "",
        }
    }
}

/// Declared schema of one parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub key: &'static str,
    pub name: &'static str,
    pub unit: ParamUnit,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    /// Alternative spellings accepted from untrusted input
    pub aliases: &'static [&'static str],
    /// Legacy names for the same control on a normalized 0..1 scale;
    /// their values are multiplied by `legacy_scale`
    pub legacy: &'static [&'static str],
    pub legacy_scale: f32,
}

impl ParamSpec {
    const fn new(
        key: &'static str,
        name: &'static str,
        unit: ParamUnit,
        (min, max, default): (f32, f32, f32),
        aliases: &'static [&'static str],
    ) -> Self {
        Self {
            key,
            name,
            unit,
            min,
            max,
            default,
            aliases,
            legacy: &[],
            legacy_scale: 1.0,
        }
    }

    const fn legacy(mut self, names: &'static [&'static str], scale: f32) -> Self {
        self.legacy = names;
        self.legacy_scale = scale;
        self
    }

    /// Clamp to [min, max]. NaN is not handled here; callers reject it first.
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f32) -> bool {
        (self.min..=self.max).contains(&value)
    }

    fn matches(&self, normalized: &str) -> bool {
        normalize(self.key) == normalized || self.aliases.iter().any(|a| normalize(a) == normalized)
    }
}

use ParamUnit::*;

const COMPRESSOR: [ParamSpec; 5] = [
    ParamSpec::new("threshold", "Threshold", Decibels, (-60.0, 0.0, -20.0), &["threshold_db"]),
    ParamSpec::new("ratio", "Ratio", Ratio, (1.0, 20.0, 4.0), &[]),
    ParamSpec::new("attack", "Attack", Milliseconds, (0.1, 100.0, 10.0), &["attack_ms"]),
    ParamSpec::new("release", "Release", Milliseconds, (10.0, 1000.0, 100.0), &["release_ms"]),
    ParamSpec::new("makeup", "Makeup", Decibels, (0.0, 24.0, 0.0), &["makeup_db", "makeup_gain_db", "gain_db"]),
];

const NOISE_GATE: [ParamSpec; 3] = [
    ParamSpec::new("threshold", "Threshold", Decibels, (-90.0, 0.0, -60.0), &["threshold_db"]),
    ParamSpec::new("attack", "Attack", Milliseconds, (0.1, 50.0, 1.0), &["attack_ms"]),
    ParamSpec::new("release", "Release", Milliseconds, (10.0, 1000.0, 100.0), &["release_ms"]),
];

const GAIN: [ParamSpec; 1] = [ParamSpec::new("gain", "Gain", Decibels, (-24.0, 24.0, 0.0), &["gain_db", "level"])];

const DISTORTION: [ParamSpec; 3] = [
    ParamSpec::new("drive", "Drive", Decibels, (0.0, 60.0, 25.0), &["drive_db", "gain"]),
    ParamSpec::new("tone", "Tone", Normalized, (0.0, 1.0, 0.5), &[]),
    ParamSpec::new("mix", "Mix", Normalized, (0.0, 1.0, 1.0), &["wet", "wet_level"]),
];

const HIGHPASS: [ParamSpec; 1] = [ParamSpec::new(
    "cutoff",
    "Cutoff",
    Hertz,
    (20.0, 2000.0, 80.0),
    &["cutoff_hz", "cutoff_frequency_hz", "frequency"],
)];

const LOWPASS: [ParamSpec; 1] = [ParamSpec::new(
    "cutoff",
    "Cutoff",
    Hertz,
    (200.0, 20000.0, 8000.0),
    &["cutoff_hz", "cutoff_frequency_hz", "frequency"],
)];

const LADDER_FILTER: [ParamSpec; 3] = [
    ParamSpec::new("cutoff", "Cutoff", Hertz, (20.0, 20000.0, 1000.0), &["cutoff_hz", "cutoff_frequency_hz"]),
    ParamSpec::new("resonance", "Resonance", Normalized, (0.0, 1.0, 0.2), &["q"]),
    ParamSpec::new("drive", "Drive", Ratio, (1.0, 10.0, 1.0), &[]),
];

const EQ_BAND: [ParamSpec; 3] = [
    ParamSpec::new("frequency", "Frequency", Hertz, (20.0, 20000.0, 1000.0), &["frequency_hz", "freq", "centre_frequency_hz"]),
    ParamSpec::new("gain", "Gain", Decibels, (-18.0, 18.0, 0.0), &["gain_db"]),
    ParamSpec::new("q", "Q", Ratio, (0.1, 10.0, 0.707), &["bandwidth", "resonance"]),
];

const CHORUS: [ParamSpec; 5] = [
    ParamSpec::new("rate", "Rate", Hertz, (0.05, 5.0, 1.0), &["rate_hz", "speed"]),
    ParamSpec::new("depth", "Depth", Normalized, (0.0, 1.0, 0.25), &[]),
    ParamSpec::new("centre_delay", "Centre Delay", Milliseconds, (1.0, 30.0, 7.0), &["centre_delay_ms", "center_delay", "center_delay_ms"]),
    ParamSpec::new("feedback", "Feedback", Normalized, (0.0, 0.9, 0.0), &[]),
    ParamSpec::new("mix", "Mix", Normalized, (0.0, 1.0, 0.5), &["wet", "wet_level"]),
];

const PHASER: [ParamSpec; 5] = [
    ParamSpec::new("rate", "Rate", Hertz, (0.05, 5.0, 1.0), &["rate_hz", "speed"]),
    ParamSpec::new("depth", "Depth", Normalized, (0.0, 1.0, 0.5), &[]),
    ParamSpec::new(
        "centre_frequency",
        "Centre Freq",
        Hertz,
        (100.0, 4000.0, 1300.0),
        &["centre_frequency_hz", "center_frequency", "center_frequency_hz"],
    ),
    ParamSpec::new("feedback", "Feedback", Normalized, (0.0, 0.9, 0.0), &[]),
    ParamSpec::new("mix", "Mix", Normalized, (0.0, 1.0, 0.5), &["wet", "wet_level"]),
];

const DELAY: [ParamSpec; 3] = [
    ParamSpec::new("time", "Time", Seconds, (0.01, MAX_DELAY_SECS, 0.5), &["delay_seconds", "delay", "time_seconds"]),
    ParamSpec::new("feedback", "Feedback", Normalized, (0.0, 0.95, 0.3), &["repeats"]),
    ParamSpec::new("mix", "Mix", Normalized, (0.0, 1.0, 0.3), &["wet", "wet_level"]),
];

const REVERB: [ParamSpec; 3] = [
    ParamSpec::new("decay", "Decay", Seconds, (0.1, 3.0, 1.5), &["decay_seconds", "decay_time"])
        .legacy(&["room_size", "size"], 3.0),
    ParamSpec::new("damping", "Damping", Normalized, (0.0, 1.0, 0.5), &[]),
    ParamSpec::new("mix", "Mix", Normalized, (0.0, 1.0, 0.3), &["wet", "wet_level"]),
];

const LIMITER: [ParamSpec; 2] = [
    ParamSpec::new("threshold", "Threshold", Decibels, (-30.0, 0.0, -1.0), &["threshold_db", "ceiling"]),
    ParamSpec::new("release", "Release", Milliseconds, (10.0, 1000.0, 100.0), &["release_ms"]),
];

/// The closed set of effect kinds a chain may contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Compressor,
    NoiseGate,
    Gain,
    Distortion,
    Highpass,
    Lowpass,
    LadderFilter,
    EqBand,
    Chorus,
    Phaser,
    Delay,
    Reverb,
    Limiter,
}

impl EffectKind {
    /// Wire name used in presets and language-model payloads
    pub fn key(&self) -> &'static str {
        match self {
            EffectKind::Compressor => "compressor",
            EffectKind::NoiseGate => "noise_gate",
            EffectKind::Gain => "gain",
            EffectKind::Distortion => "distortion",
            EffectKind::Highpass => "highpass",
            EffectKind::Lowpass => "lowpass",
            EffectKind::LadderFilter => "ladder_filter",
            EffectKind::EqBand => "eq_band",
            EffectKind::Chorus => "chorus",
            EffectKind::Phaser => "phaser",
            EffectKind::Delay => "delay",
            EffectKind::Reverb => "reverb",
            EffectKind::Limiter => "limiter",
        }
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            EffectKind::Compressor => "Compressor",
            EffectKind::NoiseGate => "Noise Gate",
            EffectKind::Gain => "Gain",
            EffectKind::Distortion => "Distortion",
            EffectKind::Highpass => "Highpass Filter",
            EffectKind::Lowpass => "Lowpass Filter",
            EffectKind::LadderFilter => "Ladder Filter",
            EffectKind::EqBand => "EQ Band",
            EffectKind::Chorus => "Chorus",
            EffectKind::Phaser => "Phaser",
            EffectKind::Delay => "Delay",
            EffectKind::Reverb => "Reverb",
            EffectKind::Limiter => "Limiter",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            EffectKind::Compressor => &["comp"],
            EffectKind::NoiseGate => &["gate", "noisegate"],
            EffectKind::Gain => &["boost", "volume"],
            EffectKind::Distortion => &["overdrive", "drive"],
            EffectKind::Highpass => &["highpass_filter", "hpf", "high_pass"],
            EffectKind::Lowpass => &["lowpass_filter", "lpf", "low_pass"],
            EffectKind::LadderFilter => &["ladder", "moog_filter"],
            EffectKind::EqBand => &["eq", "peak", "peaking_eq", "parametric_eq"],
            EffectKind::Chorus => &[],
            EffectKind::Phaser => &[],
            EffectKind::Delay => &["echo"],
            EffectKind::Reverb => &["hall", "room_reverb"],
            EffectKind::Limiter => &[],
        }
    }

    /// Fixed parameter schema, in processing order
    pub fn params(&self) -> &'static [ParamSpec] {
        match self {
            EffectKind::Compressor => &COMPRESSOR,
            EffectKind::NoiseGate => &NOISE_GATE,
            EffectKind::Gain => &GAIN,
            EffectKind::Distortion => &DISTORTION,
            EffectKind::Highpass => &HIGHPASS,
            EffectKind::Lowpass => &LOWPASS,
            EffectKind::LadderFilter => &LADDER_FILTER,
            EffectKind::EqBand => &EQ_BAND,
            EffectKind::Chorus => &CHORUS,
            EffectKind::Phaser => &PHASER,
            EffectKind::Delay => &DELAY,
            EffectKind::Reverb => &REVERB,
            EffectKind::Limiter => &LIMITER,
        }
    }

    /// Index of a parameter by key or alias (case and punctuation insensitive)
    pub fn param_index(&self, name: &str) -> Option<usize> {
        let wanted = normalize(name);
        self.params().iter().position(|p| p.matches(&wanted))
    }

    /// Like [`param_index`](Self::param_index), but also accepts legacy
    /// normalized names. Returns the slot and the factor that converts the
    /// incoming value into the parameter's unit.
    pub fn resolve_param(&self, name: &str) -> Option<(usize, f32)> {
        let wanted = normalize(name);
        if let Some(slot) = self.params().iter().position(|p| p.matches(&wanted)) {
            return Some((slot, 1.0));
        }
        self.params()
            .iter()
            .position(|p| p.legacy.iter().any(|l| normalize(l) == wanted))
            .map(|slot| (slot, self.params()[slot].legacy_scale))
    }

    /// Parse a kind from its key, display name or alias
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = normalize(name);
        if wanted.is_empty() {
            return None;
        }
        Self::all().into_iter().find(|kind| {
            normalize(kind.key()) == wanted
                || normalize(kind.name()) == wanted
                || kind.aliases().iter().any(|a| normalize(a) == wanted)
        })
    }

    /// All kinds in palette order
    pub fn all() -> Vec<EffectKind> {
        vec![
            EffectKind::NoiseGate,
            EffectKind::Compressor,
            EffectKind::Gain,
            EffectKind::Distortion,
            EffectKind::Highpass,
            EffectKind::Lowpass,
            EffectKind::LadderFilter,
            EffectKind::EqBand,
            EffectKind::Chorus,
            EffectKind::Phaser,
            EffectKind::Delay,
            EffectKind::Reverb,
            EffectKind::Limiter,
        ]
    }
}

/// Parameter values of one unit in schema order. Fixed size so the audio
/// thread can copy and compare them without touching the heap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamValues {
    values: [f32; MAX_PARAMS],
    len: usize,
}

impl ParamValues {
    pub fn defaults(kind: EffectKind) -> Self {
        let mut values = [0.0; MAX_PARAMS];
        let specs = kind.params();
        for (slot, spec) in values.iter_mut().zip(specs) {
            *slot = spec.default;
        }
        Self {
            values,
            len: specs.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Value at `index`, or 0.0 past the end
    pub fn get(&self, index: usize) -> f32 {
        self.as_slice().get(index).copied().unwrap_or(0.0)
    }

    /// Store without range checks; callers clamp against the kind's spec.
    pub fn set(&mut self, index: usize, value: f32) {
        if index < self.len {
            self.values[index] = value;
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values[..self.len]
    }
}

/// Lowercase and drop everything that is not a letter or digit, so
/// `HighpassFilter`, `highpass-filter` and `highpass_filter` compare equal.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_default_lies_within_its_bounds() {
        for kind in EffectKind::all() {
            assert!(kind.params().len() <= MAX_PARAMS, "{} has too many params", kind.key());
            for p in kind.params() {
                assert!(p.min < p.max, "{}.{}", kind.key(), p.key);
                assert!(p.contains(p.default), "{}.{} default out of range", kind.key(), p.key);
            }
        }
    }

    #[test]
    fn kind_names_resolve_from_other_spellings() {
        assert_eq!(EffectKind::from_name("HighpassFilter"), Some(EffectKind::Highpass));
        assert_eq!(EffectKind::from_name("NoiseGate"), Some(EffectKind::NoiseGate));
        assert_eq!(EffectKind::from_name("noise_gate"), Some(EffectKind::NoiseGate));
        assert_eq!(EffectKind::from_name("Reverb"), Some(EffectKind::Reverb));
        assert_eq!(EffectKind::from_name("EQ Band"), Some(EffectKind::EqBand));
        assert_eq!(EffectKind::from_name("flux_capacitor"), None);
        assert_eq!(EffectKind::from_name(""), None);
    }

    #[test]
    fn parameter_aliases_map_to_canonical_index() {
        let comp = EffectKind::Compressor;
        assert_eq!(comp.param_index("threshold"), Some(0));
        assert_eq!(comp.param_index("threshold_db"), Some(0));
        assert_eq!(comp.param_index("Release_MS"), Some(3));
        assert_eq!(EffectKind::Delay.param_index("delay_seconds"), Some(0));
        assert_eq!(EffectKind::Reverb.param_index("wet_level"), Some(2));
        assert_eq!(EffectKind::Reverb.param_index("drive"), None);
    }

    #[test]
    fn legacy_room_size_is_scaled_to_seconds() {
        let reverb = EffectKind::Reverb;
        assert_eq!(reverb.param_index("room_size"), None);
        assert_eq!(reverb.resolve_param("room_size"), Some((0, 3.0)));
        assert_eq!(reverb.resolve_param("Decay_Time"), Some((0, 1.0)));
        assert_eq!(reverb.resolve_param("drive"), None);
    }

    #[test]
    fn default_values_follow_schema_order() {
        let values = ParamValues::defaults(EffectKind::Reverb);
        assert_eq!(values.as_slice(), &[1.5, 0.5, 0.3]);

        let mut values = ParamValues::defaults(EffectKind::Gain);
        values.set(3, 9.0);
        assert_eq!(values.len(), 1);
        assert_eq!(values.get(3), 0.0);
    }

    #[test]
    fn keys_are_unique_within_each_kind() {
        for kind in EffectKind::all() {
            let params = kind.params();
            for (i, p) in params.iter().enumerate() {
                assert_eq!(kind.param_index(p.key), Some(i), "{}.{}", kind.key(), p.key);
            }
        }
    }
}
