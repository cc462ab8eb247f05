//! The priority cache, end to end: staging, admission, eviction,
//! entry reuse across sessions, and indirection handling.

use std::sync::Arc;

use previz_engine::cache::{self, CacheAlgorithm, FrameCache};
use previz_engine::graph;
use previz_engine::testing;
use previz_engine::{Clip, KernelSize};

/// Bytes of one RGB8 frame.
fn frame_bytes(width: u32, height: u32) -> usize {
    (width * height * 3) as usize
}

fn reprioritise_current_graph() {
    let current = graph::current();
    cache::with_current(|c| c.reprioritise(&current)).unwrap();
}

#[test]
fn cache_soundness_cached_equals_rendered() {
    let _guard = testing::isolated_session(64);
    let clip = testing::gradient_clip(16, 16, 10)
        .brighten(0.3)
        .unwrap()
        .greyscale()
        .unwrap();
    reprioritise_current_graph();

    let first = clip.frame(4).unwrap();
    // Second request must be served from the cache.
    let entry = clip.cache_entry().unwrap();
    assert!(entry.get_frame(4).is_some());
    let second = clip.frame(4).unwrap();
    assert_eq!(first, second);
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn staged_frames_commit_through_admission() {
    let _guard = testing::isolated_session(64);
    let clip = testing::gradient_clip(16, 16, 10).brighten(0.3).unwrap();

    cache::with_current(|c| c.set_script_running(true));
    let staged_frame = clip.frame(2).unwrap();
    assert!(cache::with_current(|c| c.staged_frame_count()) > 0);
    // While staged, a second request hits staging.
    assert!(Arc::ptr_eq(&staged_frame, &clip.frame(2).unwrap()));
    cache::with_current(|c| c.set_script_running(false));

    reprioritise_current_graph();
    cache::with_current(|c| c.commit()).unwrap();

    assert_eq!(cache::with_current(|c| c.staged_frame_count()), 0);
    let entry = clip.cache_entry().unwrap();
    assert_eq!(entry.get_frame(2).as_deref(), Some(&*staged_frame));
}

#[test]
fn indirections_are_never_cached_after_commit() {
    let _guard = testing::isolated_session(64);
    let base = testing::gradient_clip(16, 16, 20);
    let stack = testing::with_transformations_disabled(|| {
        base.concat(&[base.clone()])
            .unwrap()
            .subclip_frames(5, 25)
            .unwrap()
    });

    cache::with_current(|c| c.set_script_running(true));
    for n in 0..stack.frame_count() {
        stack.frame(n).unwrap();
    }
    cache::with_current(|c| c.set_script_running(false));
    reprioritise_current_graph();
    cache::with_current(|c| c.commit()).unwrap();

    for entry in cache::with_current(|c| c.entries()) {
        if entry.state.lock().is_indirection {
            assert_eq!(entry.cached_frame_count(), 0);
        }
    }
    // The concrete root did get its frames.
    assert!(base.cache_entry().unwrap().cached_frame_count() > 0);
}

#[test]
fn eviction_keeps_the_highest_priority_entry() {
    // Scenario: a one-frame cache over a linear pipeline. After a
    // hundred renders exactly one frame survives, owned by the entry
    // with maximal priority among those touched.
    let _guard = testing::isolated_session(64);
    cache::swap(FrameCache::new(
        frame_bytes(8, 8),
        CacheAlgorithm::Specialised,
        false,
    ));
    let leaf = testing::gradient_clip(8, 8, 100)
        .brighten(0.2)
        .unwrap()
        .greyscale()
        .unwrap();
    reprioritise_current_graph();

    for n in 0..100 {
        leaf.frame(n).unwrap();
    }

    let entries = cache::with_current(|c| c.entries());
    let cached: Vec<_> = entries
        .iter()
        .filter(|entry| entry.cached_frame_count() > 0)
        .collect();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].cached_frame_count(), 1);
    let max_priority = entries
        .iter()
        .map(|entry| entry.priority())
        .fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(cached[0].priority(), max_priority);
    assert!(
        cache::with_current(|c| c.current_size()) <= cache::with_current(|c| c.max_size())
    );
}

#[test]
fn size_bound_holds_under_every_policy() {
    for algorithm in [
        CacheAlgorithm::Specialised,
        CacheAlgorithm::Fifo,
        CacheAlgorithm::Lru,
        CacheAlgorithm::Mru,
    ] {
        let _guard = testing::isolated_session(64);
        cache::swap(FrameCache::new(3 * frame_bytes(8, 8), algorithm, false));
        let leaf = testing::gradient_clip(8, 8, 50).brighten(0.2).unwrap();
        reprioritise_current_graph();

        for n in 0..50 {
            leaf.frame(n).unwrap();
            let (current, max) =
                cache::with_current(|c| (c.current_size(), c.max_size()));
            assert!(current <= max, "{algorithm:?} exceeded the budget");
        }
    }
}

#[test]
fn entries_are_reused_across_sessions() {
    let _guard = testing::isolated_session(64);

    // Session 1: a -> b -> c.
    let first_entry = {
        let base = testing::gradient_clip(16, 16, 10);
        let leaf = base.brighten(0.2).unwrap().greyscale().unwrap();
        reprioritise_current_graph();
        leaf.source().parents()[0].cache_entry().unwrap()
    };

    // Session 2: the same script re-runs; every node is a fresh
    // instance but the brighten must find its old entry through the
    // predecessor reverse-index.
    graph::reset();
    let second_entry = {
        let base = testing::gradient_clip(16, 16, 10);
        let leaf = base.brighten(0.2).unwrap().greyscale().unwrap();
        reprioritise_current_graph();
        leaf.source().parents()[0].cache_entry().unwrap()
    };

    assert!(Arc::ptr_eq(&first_entry, &second_entry));
    assert_eq!(second_entry.state.lock().age, 0);
}

#[test]
fn hotnode_boost_after_an_edit() {
    // Scenario: session 1 builds a -> b -> c; session 2 replaces c
    // with c' consuming b. b now precedes a hotnode and ranks far
    // higher; c ages.
    let _guard = testing::isolated_session(64);

    let (b_entry, c_entry, priority_before) = {
        let a = testing::gradient_clip(16, 16, 10);
        let b = a.brighten(0.2).unwrap();
        let c = b.greyscale().unwrap();
        reprioritise_current_graph();
        let b_entry = b.cache_entry().unwrap();
        let c_entry = c.cache_entry().unwrap();
        (b_entry.clone(), c_entry, b_entry.priority())
    };

    graph::reset();
    {
        let a = testing::gradient_clip(16, 16, 10);
        let b = a.brighten(0.2).unwrap();
        let _c_new = b.blur(KernelSize::Square(3)).unwrap();
        reprioritise_current_graph();

        let b_entry_now = b.cache_entry().unwrap();
        assert!(Arc::ptr_eq(&b_entry, &b_entry_now));

        let state = b_entry_now.state.lock();
        assert!(state.precedes_hotnode);
        assert!(!state.is_hotnode);
        assert_eq!(state.age, 0);
        drop(state);

        // The replaced leaf is still in the cache, one session old.
        assert_eq!(c_entry.state.lock().age, 1);
        assert!(b_entry_now.priority() > priority_before);
    }
}

#[test]
fn indirection_stack_lifts_the_root_priority() {
    // Scenario: concat + subclip over a leaf. The indirections store
    // nothing, so the concrete root below them must inherit the
    // stack's priority.
    let _guard = testing::isolated_session(64);
    let base = testing::gradient_clip(16, 16, 20);
    let stack = testing::with_transformations_disabled(|| {
        base.concat(&[base.clone()])
            .unwrap()
            .subclip_frames(0, 20)
            .unwrap()
    });
    assert!(!Clip::same_node(&stack, &base));
    reprioritise_current_graph();

    let subclip_entry = stack.cache_entry().unwrap();
    let base_entry = base.cache_entry().unwrap();
    assert!(subclip_entry.state.lock().is_indirection);
    assert_eq!(base_entry.priority(), subclip_entry.raw_priority());
}

#[test]
fn reprioritise_reentry_is_harmless() {
    let _guard = testing::isolated_session(64);
    let leaf = testing::gradient_clip(16, 16, 10).brighten(0.2).unwrap();
    let current = graph::current();
    cache::with_current(|c| c.reprioritise(&current)).unwrap();
    let entry = leaf.cache_entry().unwrap();
    let age_before = entry.state.lock().age;

    // Same graph again: logged and ignored.
    cache::with_current(|c| c.reprioritise(&current)).unwrap();
    assert_eq!(entry.state.lock().age, age_before);
    assert!(Arc::ptr_eq(&entry, &leaf.cache_entry().unwrap()));
}

#[test]
fn stale_entries_are_purged() {
    let _guard = testing::isolated_session(64);
    cache::swap(FrameCache::new(64 * 1024 * 1024, CacheAlgorithm::Specialised, false));

    let doomed_entry = {
        let leaf = testing::gradient_clip(16, 16, 10).brighten(0.9).unwrap();
        reprioritise_current_graph();
        leaf.cache_entry().unwrap()
    };

    // Enough sessions of an unrelated script for the old entry's
    // boosted priority (it was a preview leaf) to decay below the
    // purge threshold. It holds no frames.
    for _ in 0..10 {
        graph::reset();
        let _other = testing::solid_clip(16, 16, 10, (3, 3, 3)).greyscale().unwrap();
        reprioritise_current_graph();
    }

    let survivors = cache::with_current(|c| c.entries());
    assert!(
        !survivors.iter().any(|entry| Arc::ptr_eq(entry, &doomed_entry)),
        "stale empty entry should have been purged"
    );
}

#[test]
fn deeper_entries_rank_at_least_as_high() {
    let _guard = testing::isolated_session(64);
    let base = testing::gradient_clip(16, 16, 10);
    let mid = base.brighten(0.2).unwrap();
    let leaf = mid.greyscale().unwrap();
    reprioritise_current_graph();

    let mid_entry = mid.cache_entry().unwrap();
    let leaf_entry = leaf.cache_entry().unwrap();
    // Equal age; deeper root distance implies greater-or-equal
    // priority.
    assert!(leaf_entry.priority() >= mid_entry.priority());
}

#[test]
fn statistics_track_hits_and_misses() {
    let _guard = testing::isolated_session(64);
    cache::swap(FrameCache::new(
        64 * 1024 * 1024,
        CacheAlgorithm::Specialised,
        true,
    ));
    let leaf = testing::gradient_clip(16, 16, 10).brighten(0.2).unwrap();
    reprioritise_current_graph();

    leaf.frame(0).unwrap();
    leaf.frame(0).unwrap();
    leaf.frame(1).unwrap();

    cache::with_current(|c| {
        let stats = c.stats().unwrap();
        assert_eq!(stats.hits(), 1);
        assert!(stats.compulsory_misses() >= 2);
        assert_eq!(stats.noncompulsory_misses(), 0);
        assert!(stats.summary().starts_with("Cache stats:"));
    });
}
