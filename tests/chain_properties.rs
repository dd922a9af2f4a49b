//! Property-based tests for chain construction and processing.
//!
//! Covers the identity law for bypassed chains, reversibility of reorder,
//! clamping of out-of-range parameters and finite output for any chain.

use proptest::prelude::*;
use tonerig::chain::{EffectChain, UnitSpec};
use tonerig::fx::EffectKind;

const SAMPLE_RATE: f32 = 48000.0;
const BLOCK: usize = 128;

fn kind() -> impl Strategy<Value = EffectKind> {
    prop::sample::select(EffectKind::all())
}

/// A spec for `kind` with every parameter set to some value, in range or not
fn spec_for(kind: EffectKind, values: &[f64], bypassed: bool) -> UnitSpec {
    kind.params()
        .iter()
        .zip(values.iter().cycle())
        .fold(UnitSpec::new(kind.key()).bypassed(bypassed), |spec, (p, v)| spec.param(p.key, *v))
}

fn specs(bypassed: bool) -> impl Strategy<Value = Vec<UnitSpec>> {
    prop::collection::vec(
        (kind(), prop::collection::vec(-1000.0f64..1000.0, 1..6)),
        0..8,
    )
    .prop_map(move |units| {
        units
            .into_iter()
            .map(|(kind, values)| spec_for(kind, &values, bypassed))
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A chain whose units are all bypassed passes any block through unchanged.
    #[test]
    fn bypassed_chain_is_identity(
        specs in specs(true),
        input in prop::collection::vec(-1.0f32..=1.0f32, BLOCK),
    ) {
        let chain = EffectChain::build(&specs).unwrap();
        let mut render = chain.prepare(SAMPLE_RATE, BLOCK);

        let mut silence = vec![0.0f32; BLOCK];
        render.process(&mut silence, |_| {});
        prop_assert!(silence.iter().all(|s| *s == 0.0));

        let mut block = input.clone();
        render.process(&mut block, |_| {});
        prop_assert_eq!(block, input);
    }

    /// Moving a unit and moving it back restores the original chain.
    #[test]
    fn reorder_is_reversible(
        specs in specs(false).prop_filter("need units", |s| !s.is_empty()),
        from_seed in any::<prop::sample::Index>(),
        to_seed in any::<prop::sample::Index>(),
    ) {
        let chain = EffectChain::build(&specs).unwrap();
        let from = from_seed.index(chain.len());
        let to = to_seed.index(chain.len());

        let moved = chain.reorder(from, to).unwrap();
        prop_assert_eq!(moved.len(), chain.len());
        prop_assert_eq!(moved.get(to).map(|u| u.id()), chain.get(from).map(|u| u.id()));

        let restored = moved.reorder(to, from).unwrap();
        prop_assert_eq!(restored, chain);
    }

    /// Any finite parameter value lands on the nearest bound, never fails.
    #[test]
    fn out_of_range_values_are_clamped(kind in kind(), slot in 0usize..5, value in -1.0e6f64..1.0e6) {
        let params = kind.params();
        let spec = &params[slot % params.len()];

        let chain = EffectChain::build(&[UnitSpec::new(kind.key()).param(spec.key, value)]).unwrap();
        let applied = chain.get(0).unwrap().parameter(spec.key).unwrap();
        let expected = (value as f32).clamp(spec.min, spec.max);
        prop_assert_eq!(applied, expected);
    }

    /// Whatever the chain, a full-scale input never produces NaN or infinity.
    #[test]
    fn any_chain_stays_finite(
        specs in specs(false),
        input in prop::collection::vec(-1.0f32..=1.0f32, BLOCK),
    ) {
        let chain = EffectChain::build(&specs).unwrap();
        let mut render = chain.prepare(SAMPLE_RATE, BLOCK);
        for _ in 0..4 {
            let mut block = input.clone();
            render.process(&mut block, |_| {});
            prop_assert!(block.iter().all(|s| s.is_finite()));
        }
    }
}
