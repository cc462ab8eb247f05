//! Structural identity across equivalent pipelines.

use previz_engine::testing;
use previz_engine::{CropRegion, KernelSize, ResizeTarget};

#[test]
fn equal_pipelines_equal_identity() {
    let _guard = testing::isolated_session(64);
    let build = || {
        testing::gradient_clip(32, 32, 20)
            .brighten(0.25)
            .unwrap()
            .greyscale()
            .unwrap()
            .subclip_frames(2, 18)
            .unwrap()
    };
    let a = build();
    let b = build();
    assert_eq!(a, b);
    assert_eq!(a.structural_hash(), b.structural_hash());
    assert!(a.pseudo_eq(&b));
}

#[test]
fn parameter_changes_change_identity() {
    let _guard = testing::isolated_session(64);
    let base = testing::gradient_clip(32, 32, 20);
    let a = base.brighten(0.25).unwrap();
    let b = base.brighten(0.26).unwrap();
    assert!(!a.pseudo_eq(&b));
    assert_ne!(a, b);
    assert_ne!(a.structural_hash(), b.structural_hash());
}

#[test]
fn pseudo_equality_ignores_sources() {
    let _guard = testing::isolated_session(64);
    let x = testing::gradient_clip(32, 32, 20);
    let y = testing::solid_clip(32, 32, 20, (7, 7, 7));
    let a = x.brighten(0.25).unwrap();
    let b = y.brighten(0.25).unwrap();
    // Same variant, metadata and parameters; different sources.
    assert!(a.pseudo_eq(&b));
    assert_ne!(a, b);
}

#[test]
fn interpolation_mode_is_part_of_identity() {
    let _guard = testing::isolated_session(64);
    let base = testing::gradient_clip(32, 32, 20);
    let area = base
        .resize_with(ResizeTarget::Scale(0.5), previz_core::raster::Interp::Area)
        .unwrap();
    let nearest = base
        .resize_with(ResizeTarget::Scale(0.5), previz_core::raster::Interp::Nearest)
        .unwrap();
    assert!(!area.pseudo_eq(&nearest));
    assert_ne!(area.structural_hash(), nearest.structural_hash());
}

#[test]
fn hash_is_stable_across_sessions() {
    let hash_once = {
        let _guard = testing::isolated_session(64);
        testing::gradient_clip(32, 32, 20)
            .crop(CropRegion {
                x1: Some(4.0),
                y1: Some(4.0),
                x2: Some(28.0),
                y2: Some(28.0),
                ..Default::default()
            })
            .unwrap()
            .blur(KernelSize::Square(3))
            .unwrap()
            .structural_hash()
    };
    let hash_again = {
        let _guard = testing::isolated_session(64);
        testing::gradient_clip(32, 32, 20)
            .crop(CropRegion {
                x1: Some(4.0),
                y1: Some(4.0),
                x2: Some(28.0),
                y2: Some(28.0),
                ..Default::default()
            })
            .unwrap()
            .blur(KernelSize::Square(3))
            .unwrap()
            .structural_hash()
    };
    assert_eq!(hash_once, hash_again);
}

#[test]
fn frame_rendering_is_deterministic() {
    let _guard = testing::isolated_session(64);
    let clip = testing::gradient_clip(16, 16, 10)
        .brighten(0.3)
        .unwrap()
        .blur(KernelSize::Square(3))
        .unwrap();
    for n in [0, 4, 9] {
        assert_eq!(clip.frame(n).unwrap(), clip.frame(n).unwrap());
    }
}
