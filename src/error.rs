//! Error types, one enum per failure domain.
//!
//! Device errors end the session, translation errors leave the running
//! chain alone, chain and validation errors reject a single edit or
//! request. None of them are ever raised from the audio callback.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Audio device and session lifecycle failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    #[error("no audio device available")]
    NoDevice,

    #[error("no {direction} device matching '{name}'")]
    DeviceNotFound { direction: &'static str, name: String },

    #[error("device negotiation failed: {0}")]
    Negotiation(String),

    #[error("audio stream error: {0}")]
    Stream(String),

    #[error("no streaming session is running")]
    NotRunning,

    #[error("a streaming session is already active")]
    AlreadyRunning,
}

/// Failures talking to the language-model service.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TranslationError {
    #[error("language-model service unreachable at {url}: {message}")]
    Unreachable { url: String, message: String },

    #[error("language-model request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("language-model service returned HTTP {0}")]
    Status(u16),

    #[error("malformed language-model response: {0}")]
    MalformedResponse(String),

    #[error("tone request was superseded")]
    Cancelled,
}

/// Rejected chain construction or edit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChainError {
    #[error("unknown effect kind '{0}'")]
    UnknownKind(String),

    #[error("effect '{kind}' has no parameter '{name}'")]
    UnknownParameter { kind: &'static str, name: String },

    #[error("parameter '{name}' of '{kind}' is not a finite number")]
    NonFiniteValue { kind: &'static str, name: String },

    #[error("unit index {index} out of range (chain has {len} units)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// A language-model payload that could not produce any chain.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("response does not describe an effect chain")]
    NotAChain,

    #[error("response contained no usable effect units ({dropped} dropped)")]
    NoUsableUnits { dropped: usize },
}

/// Why a tone request produced no chain. The active chain is untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToneError {
    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Preset file failures.
#[derive(Debug, Error)]
pub enum PresetError {
    #[error("failed to access preset {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse preset {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("preset version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Configuration file failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Any error produced by the library.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Tone(#[from] ToneError),

    #[error(transparent)]
    Preset(#[from] PresetError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
