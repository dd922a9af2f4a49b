use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Sender, TrySendError};
use serde::Serialize;

use super::slot::ChainReceiver;
use crate::chain::{RenderChain, UnitFault, UnitId};
use crate::fx::EffectKind;

/// Notifications raised by the engine. Adoption and fault notices are sent
/// with `try_send` from the audio thread and counted when the queue is full.
/// Device failures travel on their own channel (see
/// [`Session::device_failures`](super::Session::device_failures)) and are
/// logged under this type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    ChainAdopted { version: u64, units: usize },
    UnitFaulted { index: usize, unit: UnitId, kind: EffectKind },
    DeviceFailed { message: String },
}

/// Counters shared between the audio thread and observers
#[derive(Debug, Default)]
pub struct EngineStats {
    frames: AtomicU64,
    blocks: AtomicU64,
    adoptions: AtomicU64,
    underruns: AtomicU64,
    input_overflows: AtomicU64,
    overruns: AtomicU64,
    max_block_ns: AtomicU64,
    events_dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub frames: u64,
    pub blocks: u64,
    pub adoptions: u64,
    /// Input samples missing when an output block was due
    pub underruns: u64,
    /// Input samples dropped because the output side fell behind
    pub input_overflows: u64,
    /// Blocks whose processing took longer than the block period
    pub overruns: u64,
    pub max_block_us: f64,
    pub events_dropped: u64,
}

impl EngineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            blocks: self.blocks.load(Ordering::Relaxed),
            adoptions: self.adoptions.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            input_overflows: self.input_overflows.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            max_block_us: self.max_block_ns.load(Ordering::Relaxed) as f64 / 1000.0,
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
        }
    }

    /// Called from the capture callback when the input ring is full
    pub fn note_input_overflow(&self, dropped: usize) {
        if dropped > 0 {
            self.input_overflows.fetch_add(dropped as u64, Ordering::Relaxed);
        }
    }
}

/// Everything the audio callback needs, owned by it. Per block: adopt a
/// pending chain (if any and if the slot is free), run the active chain,
/// soft-clip, update counters. Never blocks, never allocates, never frees.
pub struct BlockProcessor {
    receiver: ChainReceiver,
    active: Box<RenderChain>,
    retire: Sender<Box<RenderChain>>,
    /// Outgoing chain waiting for room on the retire channel
    parked: Option<Box<RenderChain>>,
    events: Sender<EngineEvent>,
    stats: Arc<EngineStats>,
    running: Arc<AtomicBool>,
    budget_ns: u64,
}

impl BlockProcessor {
    pub(crate) fn new(
        receiver: ChainReceiver,
        initial: Box<RenderChain>,
        retire: Sender<Box<RenderChain>>,
        events: Sender<EngineEvent>,
        stats: Arc<EngineStats>,
        running: Arc<AtomicBool>,
        budget_ns: u64,
    ) -> Self {
        Self {
            receiver,
            active: initial,
            retire,
            parked: None,
            events,
            stats,
            running,
            budget_ns,
        }
    }

    pub fn active_version(&self) -> u64 {
        self.active.version()
    }

    /// Counters this processor updates, for callbacks that run beside it
    pub fn stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }

    fn emit(&self, event: EngineEvent) {
        if let Err(TrySendError::Full(_)) = self.events.try_send(event) {
            self.stats.events_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Hand the old chain to the retire channel; keep it parked if full
    fn flush_parked(&mut self) -> bool {
        match self.parked.take() {
            None => true,
            Some(old) => match self.retire.try_send(old) {
                Ok(()) => true,
                Err(TrySendError::Full(old)) | Err(TrySendError::Disconnected(old)) => {
                    self.parked = Some(old);
                    false
                }
            },
        }
    }

    fn adopt_pending(&mut self) {
        // with the previous chain still parked there is nowhere to put the
        // current one, so leave the proposal pending for a later block
        if !self.flush_parked() {
            return;
        }
        let Some(mut next) = self.receiver.try_take() else {
            return;
        };

        next.inherit_state(&mut self.active);
        let old = std::mem::replace(&mut self.active, next);
        self.parked = Some(old);
        self.flush_parked();

        self.stats.adoptions.fetch_add(1, Ordering::Relaxed);
        self.emit(EngineEvent::ChainAdopted {
            version: self.active.version(),
            units: self.active.len(),
        });
    }

    /// Process one mono block in place
    pub fn process_block(&mut self, block: &mut [f32]) {
        if !self.running.load(Ordering::Acquire) {
            block.fill(0.0);
            return;
        }

        self.adopt_pending();

        let start = Instant::now();
        let events = &self.events;
        let stats = &self.stats;
        self.active.process(block, |fault: UnitFault| {
            let event = EngineEvent::UnitFaulted {
                index: fault.index,
                unit: fault.id,
                kind: fault.kind,
            };
            if let Err(TrySendError::Full(_)) = events.try_send(event) {
                stats.events_dropped.fetch_add(1, Ordering::Relaxed);
            }
        });
        for sample in block.iter_mut() {
            *sample = soft_clip(*sample);
        }

        let elapsed = start.elapsed().as_nanos() as u64;
        self.stats.frames.fetch_add(block.len() as u64, Ordering::Relaxed);
        self.stats.blocks.fetch_add(1, Ordering::Relaxed);
        self.stats.max_block_ns.fetch_max(elapsed, Ordering::Relaxed);
        if elapsed > self.budget_ns {
            self.stats.overruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record input samples that were missing when a block was due
    pub fn note_underrun(&self, missing: usize) {
        if missing > 0 {
            self.stats.underruns.fetch_add(missing as u64, Ordering::Relaxed);
        }
    }
}

/// Soft clipping function to prevent harsh digital clipping
fn soft_clip(x: f32) -> f32 {
    if x > 1.0 {
        1.0 - (-x + 1.0).exp() * 0.5
    } else if x < -1.0 {
        -1.0 + (x + 1.0).exp() * 0.5
    } else {
        x
    }
}
