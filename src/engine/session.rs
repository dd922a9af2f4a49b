use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, never, Receiver, Sender};
use serde::Serialize;

use super::backend::{AudioBackend, DeviceBinding, StreamHandle, StreamRequest};
use super::processor::{BlockProcessor, EngineEvent, EngineStats, StatsSnapshot};
use super::slot::{self, ChainPublisher};
use crate::chain::{EffectChain, RenderChain};
use crate::error::DeviceError;

/// Outgoing chains the audio thread can hand back before it has to wait
const RETIRE_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// One streaming session: device binding, the reconfiguration slot into
/// the running stream, and its counters. Owned by whoever drives it; tests
/// create as many as they like.
pub struct Session {
    state: SessionState,
    events: Sender<EngineEvent>,
    binding: Option<DeviceBinding>,
    /// Fatal stream errors of the current stream, one kept at a time
    failures: Option<Receiver<String>>,
    publisher: Option<ChainPublisher>,
    retired: Option<Receiver<Box<RenderChain>>>,
    stream: Option<StreamHandle>,
    stats: Arc<EngineStats>,
    running: Arc<AtomicBool>,
}

impl Session {
    /// `events` receives adoption and fault notices from the audio thread.
    /// Device failures arrive on [`device_failures`](Self::device_failures).
    pub fn new(events: Sender<EngineEvent>) -> Self {
        Self {
            state: SessionState::Stopped,
            events,
            binding: None,
            failures: None,
            publisher: None,
            retired: None,
            stream: None,
            stats: Arc::new(EngineStats::default()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn binding(&self) -> Option<&DeviceBinding> {
        self.binding.as_ref()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Proposals replaced before adoption during this session
    pub fn superseded(&self) -> u64 {
        self.publisher.as_ref().map(|p| p.superseded()).unwrap_or(0)
    }

    /// Open devices, allocate DSP state for `chain` and start streaming.
    /// On any failure the session is back in `Stopped`.
    pub fn start(
        &mut self,
        backend: &dyn AudioBackend,
        request: &StreamRequest,
        chain: &EffectChain,
    ) -> Result<DeviceBinding, DeviceError> {
        if self.state != SessionState::Stopped {
            return Err(DeviceError::AlreadyRunning);
        }
        self.state = SessionState::Starting;
        tracing::info!(backend = backend.name(), "starting session");

        match self.open(backend, request, chain) {
            Ok(binding) => {
                self.state = SessionState::Running;
                tracing::info!(
                    sample_rate = binding.sample_rate,
                    block_size = binding.block_size,
                    units = chain.len(),
                    "session running"
                );
                Ok(binding)
            }
            Err(e) => {
                self.teardown();
                tracing::error!(error = %e, "session failed to start");
                Err(e)
            }
        }
    }

    fn open(
        &mut self,
        backend: &dyn AudioBackend,
        request: &StreamRequest,
        chain: &EffectChain,
    ) -> Result<DeviceBinding, DeviceError> {
        let binding = backend.negotiate(request)?;

        let initial = Box::new(chain.prepare(binding.sample_rate as f32, binding.block_size as usize));
        let (publisher, receiver) = slot::channel();
        let (retire_tx, retire_rx) = bounded(RETIRE_CAPACITY);
        self.stats = Arc::new(EngineStats::default());
        self.running = Arc::new(AtomicBool::new(true));

        let processor = BlockProcessor::new(
            receiver,
            initial,
            retire_tx,
            self.events.clone(),
            Arc::clone(&self.stats),
            Arc::clone(&self.running),
            binding.block_period_ns(),
        );

        let (failure_tx, failure_rx) = bounded(1);
        let on_error = Box::new(move |message: String| {
            // Full means a failure is already waiting to stop the session
            let _ = failure_tx.try_send(message);
        });

        let stream = backend.start(&binding, processor, on_error)?;

        self.binding = Some(binding.clone());
        self.failures = Some(failure_rx);
        self.publisher = Some(publisher);
        self.retired = Some(retire_rx);
        self.stream = Some(stream);
        Ok(binding)
    }

    /// Prepare `chain` for the running stream and publish it. Replaces any
    /// proposal not yet adopted. Returns the prepared version.
    pub fn submit(&mut self, chain: &EffectChain) -> Result<u64, DeviceError> {
        let (Some(binding), Some(publisher)) = (&self.binding, &self.publisher) else {
            return Err(DeviceError::NotRunning);
        };
        if self.state != SessionState::Running {
            return Err(DeviceError::NotRunning);
        }

        let prepared = Box::new(chain.prepare(binding.sample_rate as f32, binding.block_size as usize));
        let version = prepared.version();
        if publisher.publish(prepared) {
            tracing::debug!(version, "replaced a proposal that was never adopted");
        }
        self.collect_retired();
        Ok(version)
    }

    /// Fatal errors reported by the running stream's devices. Each start
    /// gets a fresh channel, so failures of an earlier stream never reach a
    /// later one. Never ready while stopped.
    pub fn device_failures(&self) -> Receiver<String> {
        self.failures.clone().unwrap_or_else(never)
    }

    /// Free chains the audio thread has finished with
    pub fn collect_retired(&self) -> usize {
        self.retired.as_ref().map(|rx| rx.try_iter().count()).unwrap_or(0)
    }

    /// Stop streaming and release the devices. Any pending proposal is
    /// discarded. The audio callback outputs silence from its next block.
    pub fn stop(&mut self) -> Result<(), DeviceError> {
        if self.state == SessionState::Stopped {
            return Err(DeviceError::NotRunning);
        }
        self.state = SessionState::Stopping;
        let stats = self.stats.snapshot();
        self.teardown();
        tracing::info!(
            frames = stats.frames,
            adoptions = stats.adoptions,
            underruns = stats.underruns,
            input_overflows = stats.input_overflows,
            overruns = stats.overruns,
            "session stopped"
        );
        Ok(())
    }

    fn teardown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(publisher) = self.publisher.take() {
            if publisher.discard() {
                tracing::debug!("pending chain proposal discarded");
            }
        }
        // dropping the handle stops the stream and frees the processor
        self.stream = None;
        self.collect_retired();
        self.retired = None;
        self.failures = None;
        self.binding = None;
        self.state = SessionState::Stopped;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state != SessionState::Stopped {
            self.teardown();
        }
    }
}
