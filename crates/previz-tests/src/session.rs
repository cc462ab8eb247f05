//! Full preview sessions through the driver.

use std::sync::Arc;

use previz_engine::cache;
use previz_engine::testing;
use previz_engine::{Clip, ResizeTarget};
use previz_session::{SessionDriver, SessionPhase};

#[test]
fn preview_after_a_session_hits_the_cache() {
    let _guard = testing::isolated_session(64);
    let mut driver = SessionDriver::new(None);
    driver
        .run_session(|| {
            let leaf = testing::gradient_clip(16, 16, 10).brighten(0.2)?.greyscale()?;
            // The script itself previews a frame; it lands in staging.
            leaf.frame(3)?;
            Ok(())
        })
        .unwrap();
    assert_eq!(driver.phase(), SessionPhase::Previewing);

    // After commit the staged frame lives in the committed store.
    let leaf = driver.preview_leaves()[0].clone();
    let entry = leaf.cache_entry().unwrap();
    assert!(entry.get_frame(3).is_some());

    // Preview renders go through policy admission now.
    let frame = leaf.frame(3).unwrap();
    assert!(Arc::ptr_eq(&frame, &leaf.frame(3).unwrap()));
}

#[test]
fn rerunning_the_same_script_reuses_entries() {
    let _guard = testing::isolated_session(64);
    let script = || {
        let leaf = testing::gradient_clip(16, 16, 10).brighten(0.2)?.greyscale()?;
        leaf.frame(0)?;
        Ok(())
    };

    let mut driver = SessionDriver::new(None);
    driver.run_session(script).unwrap();
    let first_entry = driver.preview_leaves()[0].cache_entry().unwrap();

    // Harness signals a rerun; the next session builds fresh nodes.
    let (tx, queue) = previz_session::ControlQueue::new(4);
    tx.signal(previz_session::ControlMessage::Rerun);
    driver.pump_control(&queue).unwrap();
    driver.run_session(script).unwrap();
    let second_entry = driver.preview_leaves()[0].cache_entry().unwrap();

    assert!(Arc::ptr_eq(&first_entry, &second_entry));
    // The frame cached in session one survived into session two.
    assert!(second_entry.get_frame(0).is_some());
}

#[test]
fn fit_to_viewport_resize_fuses_with_user_resize() {
    let _guard = testing::isolated_session(64);
    let mut driver = SessionDriver::new(Some((32, 32)));

    // The script's own leaf is larger than the panel; the fix-up
    // appends one shrinking resize.
    driver
        .run_session(|| {
            let _leaf = testing::gradient_clip(64, 64, 10);
            Ok(())
        })
        .unwrap();
    let leaves = driver.preview_leaves();
    assert_eq!(leaves.len(), 1);
    assert_eq!(leaves[0].size(), (32, 32));

    // A script that already resizes to the panel size needs no fix-up;
    // the leaf is structurally identical to the previous session's.
    let previous = leaves[0].clone();
    let mut driver = SessionDriver::new(Some((32, 32)));
    driver
        .run_session(|| {
            let _leaf =
                testing::gradient_clip(64, 64, 10).resize(ResizeTarget::Size(32, 32))?;
            Ok(())
        })
        .unwrap();
    assert_eq!(driver.preview_leaves()[0], previous);
}

#[test]
fn staged_frames_of_annihilated_nodes_are_dropped() {
    let _guard = testing::isolated_session(64);
    let mut driver = SessionDriver::new(None);
    let mut retired: Option<Clip> = None;
    driver
        .run_session(|| {
            let base = testing::gradient_clip(32, 32, 10);
            let big = base.resize(ResizeTarget::Scale(2.0))?;
            // Stage a frame for the enlarged clip...
            big.frame(0)?;
            // ...then annihilate it by shrinking back.
            let restored = big.resize(ResizeTarget::Scale(0.5))?;
            assert!(Clip::same_node(&restored, &base));
            retired = Some(big);
            Ok(())
        })
        .unwrap();

    // The retired resize never got a cache entry, so its staged frame
    // was silently discarded at commit.
    let retired = retired.unwrap();
    assert!(retired.cache_entry().is_none());
    assert_eq!(cache::with_current(|c| c.staged_frame_count()), 0);
}

#[test]
fn failed_script_leaves_previous_cache_intact() {
    let _guard = testing::isolated_session(64);
    let mut driver = SessionDriver::new(None);
    driver
        .run_session(|| {
            let leaf = testing::gradient_clip(16, 16, 10).brighten(0.2)?;
            leaf.frame(0)?;
            Ok(())
        })
        .unwrap();
    let entry = driver.preview_leaves()[0].cache_entry().unwrap();
    assert!(entry.get_frame(0).is_some());

    // Next session blows up mid-script; the committed store keeps the
    // previous session's frames.
    let (tx, queue) = previz_session::ControlQueue::new(4);
    tx.signal(previz_session::ControlMessage::Rerun);
    driver.pump_control(&queue).unwrap();
    driver
        .run_session(|| anyhow::bail!("syntax error near line 3"))
        .unwrap();
    assert_eq!(driver.phase(), SessionPhase::Idle);
    assert!(entry.get_frame(0).is_some());
}

#[test]
fn dot_visualisation_written_after_session() {
    let _guard = testing::isolated_session(64);
    let mut driver = SessionDriver::new(None);
    driver
        .run_session(|| {
            let _leaf = testing::gradient_clip(16, 16, 10).brighten(0.2)?;
            Ok(())
        })
        .unwrap();

    let path = std::env::temp_dir().join("previz_priorities_test.dot");
    let current = previz_engine::graph::current();
    cache::with_current(|c| c.write_priorities_dot(&current, &path)).unwrap();
    let dot = std::fs::read_to_string(&path).unwrap();
    assert!(dot.contains("digraph"));
    assert!(dot.contains("Brightened"));
    let _ = std::fs::remove_file(&path);
}
