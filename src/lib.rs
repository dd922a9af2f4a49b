//! Live guitar effect chain engine.
//!
//! An [`EffectChain`] is an immutable, ordered list of effect units. Edits
//! produce new chains, which are prepared off the audio thread and handed to
//! a running [`Session`] through a single-slot, last-proposal-wins channel.
//! The audio callback adopts the newest proposal at the next block boundary
//! and never blocks, allocates or frees while doing so.
//!
//! Chains can also be generated from a plain-language tone description by a
//! language model; its response is validated field by field before it
//! becomes a chain.

pub mod chain;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod fx;
pub mod tone;

pub use chain::{EffectChain, EffectUnit, Preset, UnitId, UnitSpec};
pub use config::Config;
pub use engine::{AudioBackend, CpalBackend, DeviceBinding, EngineEvent, Session, SessionState, StreamRequest};
pub use error::{Error, Result};
pub use fx::{EffectKind, ParamSpec};
pub use tone::{OllamaTranslator, ToneTranslator, ValidatedChain, ValidationWarning};
