//! The canonical-order and flattening rewrites, end to end.

use previz_engine::graph;
use previz_engine::testing;
use previz_engine::{Clip, ClipKind, ResizeTarget};

#[test]
fn brighten_fusion_matches_single_brighten() {
    let _guard = testing::isolated_session(64);
    let base = testing::gradient_clip(32, 32, 10);
    let fused = base.brighten(0.3).unwrap().brighten(0.3).unwrap();
    let direct = base.brighten(0.51).unwrap();

    // 0.3 (+) 0.3 = 0.3 + 0.3 - 0.09 = 0.51, structurally.
    assert_eq!(fused, direct);
    assert_eq!(fused.structural_hash(), direct.structural_hash());
    assert!(fused.pseudo_eq(&direct));
}

#[test]
fn crop_commutes_through_resize() {
    let _guard = testing::isolated_session(64);
    let base = testing::gradient_clip(400, 400, 4);
    let a = base
        .resize(ResizeTarget::Scale(0.5))
        .unwrap()
        .crop_rect(0, 0, 100, 100)
        .unwrap();
    let b = base
        .crop_rect(0, 0, 200, 200)
        .unwrap()
        .resize(ResizeTarget::Scale(0.5))
        .unwrap();

    assert_eq!(a, b);
    assert_eq!(a.structural_hash(), b.structural_hash());
    assert_eq!(a.frame(0).unwrap(), b.frame(0).unwrap());
}

#[test]
fn concat_chains_flatten_to_the_same_node() {
    let chained_hash = {
        let _guard = testing::isolated_session(64);
        let x = testing::gradient_clip(16, 16, 10);
        let chained = x
            .concat(&[x.clone()])
            .unwrap()
            .concat(&[x.clone()])
            .unwrap()
            .concat(&[x.clone()])
            .unwrap();
        assert_eq!(chained.source().parents().len(), 4);
        assert_eq!(graph::current().leaf_count(), 1);
        chained.structural_hash()
    };
    let variadic_hash = {
        let _guard = testing::isolated_session(64);
        let x = testing::gradient_clip(16, 16, 10);
        let variadic = x.concat(&[x.clone(), x.clone(), x.clone()]).unwrap();
        assert_eq!(variadic.source().parents().len(), 4);
        assert_eq!(graph::current().leaf_count(), 1);
        variadic.structural_hash()
    };
    assert_eq!(chained_hash, variadic_hash);
}

#[test]
fn flatten_pass_collapses_prebuilt_concat_leaves() {
    let _guard = testing::isolated_session(64);
    let x = testing::gradient_clip(16, 16, 10);

    // Build a stacked concat without constructor-level flattening.
    let stacked = testing::with_transformations_disabled(|| {
        let inner = x.concat(&[x.clone()]).unwrap();
        inner.concat(&[x.clone()]).unwrap()
    });
    assert_eq!(stacked.source().parents().len(), 2);

    let current = graph::current();
    current.flatten_concats().unwrap();

    let leaves = current.leaves();
    assert_eq!(leaves.len(), 1);
    let flat = &leaves[0];
    assert!(matches!(flat.kind(), ClipKind::Concat { .. }));
    assert_eq!(flat.source().parents().len(), 3);
    // The replacement keeps the original leaf's timestamp.
    assert_eq!(flat.timestamp(), stacked.timestamp());
}

#[test]
fn reverse_roundtrip_annihilates() {
    let _guard = testing::isolated_session(64);
    let x = testing::gradient_clip(16, 16, 10);
    let back = x.reverse().unwrap().reverse().unwrap();
    assert!(Clip::same_node(&x, &back));
}

#[test]
fn greyscale_is_idempotent() {
    let _guard = testing::isolated_session(64);
    let x = testing::gradient_clip(16, 16, 10);
    let once = x.greyscale().unwrap();
    let twice = once.greyscale().unwrap();
    assert!(Clip::same_node(&once, &twice));
}

#[test]
fn brighten_zero_is_observationally_identity() {
    let _guard = testing::isolated_session(64);
    let x = testing::gradient_clip(16, 16, 10);
    let brightened = x.brighten(0.0).unwrap();
    for n in [0, 5, 9] {
        assert_eq!(brightened.frame(n).unwrap(), x.frame(n).unwrap());
    }
}

#[test]
fn resize_roundtrip_annihilates() {
    let _guard = testing::isolated_session(64);
    let x = testing::gradient_clip(64, 64, 10);
    let roundtrip = x
        .resize(ResizeTarget::Scale(2.0))
        .unwrap()
        .resize(ResizeTarget::Scale(0.5))
        .unwrap();
    assert!(Clip::same_node(&x, &roundtrip));
}

#[test]
fn subclip_composition_algebra() {
    let _guard = testing::isolated_session(64);
    let x = testing::gradient_clip(16, 16, 100);
    let nested = x
        .subclip_frames(10, 60)
        .unwrap()
        .subclip_frames(5, 25)
        .unwrap();
    let direct = x.subclip_frames(15, 35).unwrap();
    assert_eq!(nested, direct);
    assert_eq!(nested.structural_hash(), direct.structural_hash());
}

/// Maximum per-channel difference between two frames.
fn max_channel_delta(a: &previz_core::Frame, b: &previz_core::Frame) -> u8 {
    assert_eq!((a.width, a.height), (b.width, b.height));
    a.data
        .iter()
        .zip(b.data.iter())
        .map(|(&x, &y)| x.abs_diff(y))
        .max()
        .unwrap_or(0)
}

#[test]
fn structural_rewrites_are_pixel_exact() {
    let _guard = testing::isolated_session(64);
    let x = testing::gradient_clip(32, 32, 20);
    // Subclip, reverse and their pushes only remap frame indices, so
    // the rewritten stack must be bit-identical to the naive one.
    let build = || -> previz_core::Result<Clip> {
        x.subclip_frames(2, 18)?.reverse()?.subclip_frames(3, 13)
    };
    let rewritten = build().unwrap();
    let plain = testing::with_transformations_disabled(|| build().unwrap());

    assert_eq!(rewritten.frame_count(), plain.frame_count());
    for n in 0..rewritten.frame_count() {
        assert_eq!(rewritten.frame(n).unwrap(), plain.frame(n).unwrap());
    }
}

#[test]
fn pixelwise_rewrites_agree_up_to_quantisation() {
    let _guard = testing::isolated_session(64);
    let x = testing::gradient_clip(32, 32, 20);
    // Brighten fusion and the resize/brighten commutation re-order
    // affine pixel math, so per-node u8 rounding may differ by a step
    // or two, never more.
    let build = || -> previz_core::Result<Clip> {
        x.brighten(0.2)?
            .subclip_frames(2, 18)?
            .reverse()?
            .brighten(0.2)?
            .resize(ResizeTarget::Scale(0.5))
    };
    let rewritten = build().unwrap();
    let plain = testing::with_transformations_disabled(|| build().unwrap());

    assert_eq!(rewritten.frame_count(), plain.frame_count());
    for n in [0, 7, 15] {
        let delta = max_channel_delta(
            &rewritten.frame(n).unwrap(),
            &plain.frame(n).unwrap(),
        );
        assert!(delta <= 2, "frame {n} diverged by {delta}");
    }
}

#[test]
fn disabled_transformations_leave_stacks_alone() {
    let _guard = testing::isolated_session(64);
    let x = testing::gradient_clip(16, 16, 10);
    let stacked = testing::with_transformations_disabled(|| {
        x.brighten(0.3).unwrap().brighten(0.3).unwrap()
    });
    assert!(matches!(stacked.kind(), ClipKind::Brightened { .. }));
    assert!(matches!(
        stacked.source().parents()[0].kind(),
        ClipKind::Brightened { .. }
    ));
}
