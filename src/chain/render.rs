use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use super::model::EffectChain;
use super::unit::UnitId;
use crate::fx::{EffectKind, EffectProcessor, ParamValues};

static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

/// A unit taken out of service on the audio thread
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitFault {
    pub index: usize,
    pub id: UnitId,
    pub kind: EffectKind,
}

struct RenderUnit {
    id: UnitId,
    kind: EffectKind,
    params: ParamValues,
    bypassed: bool,
    /// Set after a panic or non-finite output; stays set for the session
    faulted: bool,
    processor: EffectProcessor,
}

/// Audio-thread form of an [`EffectChain`]: every unit with its DSP state
/// already allocated. Built off the real-time path, then handed over whole.
pub struct RenderChain {
    version: u64,
    units: Vec<RenderUnit>,
    scratch: Vec<f32>,
}

impl RenderChain {
    pub(crate) fn new(chain: &EffectChain, sample_rate: f32, max_block: usize) -> Self {
        let units = chain
            .units()
            .iter()
            .map(|u| RenderUnit {
                id: u.id(),
                kind: u.kind(),
                params: *u.params(),
                bypassed: u.is_bypassed(),
                faulted: false,
                processor: EffectProcessor::new(u.kind(), sample_rate),
            })
            .collect();

        Self {
            version: NEXT_VERSION.fetch_add(1, Ordering::Relaxed),
            units,
            scratch: vec![0.0; max_block.max(1)],
        }
    }

    /// Monotonic build number, unique per prepared chain
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn kinds(&self) -> impl Iterator<Item = EffectKind> + '_ {
        self.units.iter().map(|u| u.kind)
    }

    /// Take over the DSP state of units that `previous` also contains (same
    /// id and kind), so delay lines and reverb tails continue across the
    /// swap. Units new to this chain keep their silent state. Does not
    /// allocate; the swapped-out fresh processors are released with
    /// `previous`.
    pub fn inherit_state(&mut self, previous: &mut RenderChain) {
        for unit in &mut self.units {
            let Some(old) = previous
                .units
                .iter_mut()
                .find(|o| o.id == unit.id && o.kind == unit.kind)
            else {
                continue;
            };
            std::mem::swap(&mut unit.processor, &mut old.processor);
            unit.faulted = old.faulted;
            if old.bypassed && !unit.bypassed {
                // the tail was frozen while bypassed; start clean
                unit.processor.reset();
            }
        }
    }

    /// Run `block` through every active unit in order, in place. A unit that
    /// panics or produces non-finite samples is restored to its input,
    /// disabled for the rest of the session and passed to `on_fault` once.
    pub fn process(&mut self, block: &mut [f32], mut on_fault: impl FnMut(UnitFault)) {
        let step = self.scratch.len();
        for chunk in block.chunks_mut(step) {
            for (index, unit) in self.units.iter_mut().enumerate() {
                if unit.bypassed || unit.faulted {
                    continue;
                }
                let scratch = &mut self.scratch[..chunk.len()];
                scratch.copy_from_slice(chunk);

                let params = &unit.params;
                let processor = &mut unit.processor;
                let ok = catch_unwind(AssertUnwindSafe(|| processor.process(params, chunk))).is_ok()
                    && chunk.iter().all(|s| s.is_finite());

                if !ok {
                    chunk.copy_from_slice(scratch);
                    unit.faulted = true;
                    on_fault(UnitFault {
                        index,
                        id: unit.id,
                        kind: unit.kind,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::UnitSpec;

    fn impulse(len: usize) -> Vec<f32> {
        let mut block = vec![0.0; len];
        block[0] = 1.0;
        block
    }

    #[test]
    fn all_bypassed_is_identity() {
        let chain = EffectChain::build(&[
            UnitSpec::new("distortion").bypassed(true),
            UnitSpec::new("reverb").bypassed(true),
        ])
        .unwrap();
        let mut render = chain.prepare(48000.0, 64);
        let input: Vec<f32> = (0..200).map(|i| (i as f32 * 0.1).sin()).collect();
        let mut block = input.clone();
        render.process(&mut block, |_| panic!("no fault expected"));
        assert_eq!(block, input);
    }

    #[test]
    fn units_apply_in_order() {
        let chain = EffectChain::build(&[
            UnitSpec::new("gain").param("gain", 6.0),
            UnitSpec::new("limiter").param("threshold", -6.0),
        ])
        .unwrap();
        let mut render = chain.prepare(48000.0, 256);
        let mut block = vec![0.5f32; 256];
        render.process(&mut block, |_| {});
        // boosted to ~1.0, then held under the -6 dB ceiling
        assert!(block.iter().all(|s| *s <= 0.502));

        let reversed = chain.reorder(1, 0).unwrap();
        let mut render = reversed.prepare(48000.0, 256);
        let mut block = vec![0.5f32; 256];
        render.process(&mut block, |_| {});
        assert!(block[255] > 0.9);
    }

    #[test]
    fn retained_units_keep_their_tail() {
        let chain = EffectChain::build(&[UnitSpec::new("delay").param("time", 0.01).param("mix", 1.0)]).unwrap();
        let mut first = chain.prepare(10000.0, 64);
        let mut block = impulse(64);
        first.process(&mut block, |_| {});

        // edited chain: same unit, different mix
        let edited = chain.set_parameter(0, "mix", 0.5).unwrap();
        let mut second = edited.prepare(10000.0, 64);
        second.inherit_state(&mut first);

        let mut block = vec![0.0; 64];
        second.process(&mut block, |_| {});
        assert!(block.iter().any(|s| s.abs() > 0.1), "echo of the earlier impulse");

        // a rebuilt chain has new ids and starts silent
        let rebuilt = EffectChain::build(&edited.specs()).unwrap();
        let mut third = rebuilt.prepare(10000.0, 64);
        third.inherit_state(&mut second);
        let mut block = vec![0.0; 64];
        third.process(&mut block, |_| {});
        assert!(block.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn non_finite_output_disables_unit_for_the_session() {
        let chain = EffectChain::build(&[UnitSpec::new("gain").param("gain", -6.0)]).unwrap();
        let mut render = chain.prepare(48000.0, 64);
        let mut faults = Vec::new();

        let mut input = vec![0.5f32; 64];
        input[7] = f32::NAN;
        let mut block = input.clone();
        render.process(&mut block, |f| faults.push(f));
        let bits = |b: &[f32]| b.iter().map(|s| s.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&block), bits(&input), "block restored to its input");

        for _ in 0..3 {
            let mut block = vec![0.5f32; 64];
            render.process(&mut block, |f| faults.push(f));
            assert!(block.iter().all(|s| *s == 0.5));
        }
        assert_eq!(
            faults,
            vec![UnitFault {
                index: 0,
                id: chain.units()[0].id(),
                kind: EffectKind::Gain,
            }]
        );

        // an edited chain keeps the unit out of service
        let edited = chain.set_parameter(0, "gain", -12.0).unwrap();
        let mut next = edited.prepare(48000.0, 64);
        next.inherit_state(&mut render);
        let mut block = vec![0.5f32; 64];
        next.process(&mut block, |f| faults.push(f));
        assert!(block.iter().all(|s| *s == 0.5));
        assert_eq!(faults.len(), 1);
    }

    #[test]
    fn long_blocks_are_split_by_scratch_size() {
        let chain = EffectChain::build(&[UnitSpec::new("gain").param("gain", -6.0)]).unwrap();
        let mut render = chain.prepare(48000.0, 32);
        let mut block = vec![1.0f32; 100];
        render.process(&mut block, |_| {});
        assert!(block.iter().all(|s| (*s - 0.501).abs() < 0.01));
    }

    #[test]
    fn versions_increase() {
        let chain = EffectChain::new();
        let a = chain.prepare(48000.0, 64);
        let b = chain.prepare(48000.0, 64);
        assert!(b.version() > a.version());
        assert!(a.is_empty());
    }
}
