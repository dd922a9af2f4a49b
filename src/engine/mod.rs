pub mod backend;
pub mod cpal_backend;
pub mod offline;
mod processor;
pub mod session;
pub mod slot;

pub use backend::{AudioBackend, AudioDevice, DeviceBinding, Direction, ErrorCallback, StreamHandle, StreamRequest};
pub use cpal_backend::CpalBackend;
pub use offline::{render_file, RenderResult};
pub use processor::{BlockProcessor, EngineEvent, EngineStats, StatsSnapshot};
pub use session::{Session, SessionState};
pub use slot::{ChainPublisher, ChainReceiver};
