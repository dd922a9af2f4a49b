mod model;
pub mod preset;
mod render;
mod unit;

pub use model::EffectChain;
pub use preset::Preset;
pub use render::{RenderChain, UnitFault};
pub use unit::{Clamp, EffectUnit, UnitId, UnitSpec};
