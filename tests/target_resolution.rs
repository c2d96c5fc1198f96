//! Integration tests for the target grammar and directional navigation.

use pmux::manager::{RegistryError, SessionManager, SplitOrientation};
use pmux::target::{navigate, position_in, Direction};

#[test]
fn first_pane_after_default_session_is_percent_one() {
    let manager = SessionManager::new();
    // A pre-existing default session consumes %0.
    manager.create_session("default", "0", 80, 24).unwrap();

    let (_, pane) = manager.create_session("demo", "0", 120, 40).unwrap();
    assert_eq!(pane.external_id(), "%1");
    assert!(manager.has_pane("%1"));
}

#[test]
fn sole_pane_resolves_and_bad_window_is_out_of_range() {
    let manager = SessionManager::new();
    let (_, pane) = manager.create_session("demo", "0", 120, 40).unwrap();

    let resolved = manager.resolve_target("demo:0.0", None).unwrap();
    assert_eq!(resolved.id, pane.id);

    assert!(matches!(
        manager.resolve_target("demo:1.0", None),
        Err(RegistryError::OutOfRange(_))
    ));
}

#[test]
fn every_grammar_form_resolves_to_the_predicted_pane() {
    let manager = SessionManager::new();
    let (_, p0) = manager.create_session("demo", "0", 80, 24).unwrap();
    let p1 = manager.split_pane(p0.id, SplitOrientation::Vertical).unwrap();
    manager.create_session("other", "0", 80, 24).unwrap();

    // %N literal.
    assert_eq!(manager.resolve_target("%0", None).unwrap().id, p0.id);
    // Bare name: first window's active pane (the split made p1 active).
    assert_eq!(manager.resolve_target("demo", None).unwrap().id, p1.id);
    // name: and name:0 behave alike.
    assert_eq!(manager.resolve_target("demo:", None).unwrap().id, p1.id);
    assert_eq!(manager.resolve_target("demo:0", None).unwrap().id, p1.id);
    // Explicit pane index beats the active pane.
    assert_eq!(manager.resolve_target("demo:0.0", None).unwrap().id, p0.id);
    // Empty pane part: the active pane again.
    assert_eq!(manager.resolve_target("demo:0.", None).unwrap().id, p1.id);
    // Empty target without a caller: lowest-id session's active pane.
    assert_eq!(manager.resolve_target("", None).unwrap().id, p1.id);
}

#[test]
fn malformed_and_dangling_targets() {
    let manager = SessionManager::new();
    manager.create_session("demo", "0", 80, 24).unwrap();

    assert!(matches!(
        manager.resolve_target("demo:x", None),
        Err(RegistryError::InvalidIndex(_))
    ));
    assert!(matches!(
        manager.resolve_target("demo:0.x", None),
        Err(RegistryError::InvalidIndex(_))
    ));
    assert!(matches!(
        manager.resolve_target("ghost", None),
        Err(RegistryError::NotFound(_))
    ));
    assert!(matches!(
        manager.resolve_target("%999", None),
        Err(RegistryError::NotFound(_))
    ));
    assert!(matches!(
        manager.resolve_target("%abc", None),
        Err(RegistryError::NotFound(_))
    ));
}

#[test]
fn navigation_moves_and_clamps() {
    let manager = SessionManager::new();
    let (_, p0) = manager.create_session("demo", "0", 80, 48).unwrap();
    let p1 = manager.split_pane(p0.id, SplitOrientation::Vertical).unwrap();
    let p2 = manager.split_pane(p1.id, SplitOrientation::Vertical).unwrap();

    let dest = navigate(&manager, "", Some(p1.id), Some(Direction::Up)).unwrap();
    assert_eq!(dest.id, p0.id);
    let dest = navigate(&manager, "", Some(p1.id), Some(Direction::Down)).unwrap();
    assert_eq!(dest.id, p2.id);

    // Clamped at both ends, no wraparound.
    let dest = navigate(&manager, "", Some(p0.id), Some(Direction::Left)).unwrap();
    assert_eq!(dest.id, p0.id);
    let dest = navigate(&manager, "", Some(p2.id), Some(Direction::Right)).unwrap();
    assert_eq!(dest.id, p2.id);

    // Neutral direction: unchanged.
    let dest = navigate(&manager, "", Some(p1.id), None).unwrap();
    assert_eq!(dest.id, p1.id);
}

#[test]
fn navigation_never_leaves_the_window() {
    let manager = SessionManager::new();
    let (_, a0) = manager.create_session("a", "0", 80, 24).unwrap();
    let (_, b0) = manager.create_session("b", "0", 80, 24).unwrap();
    let a1 = manager.split_pane(a0.id, SplitOrientation::Vertical).unwrap();

    for dir in [Direction::Left, Direction::Right, Direction::Up, Direction::Down] {
        let dest = navigate(&manager, "", Some(b0.id), Some(dir)).unwrap();
        assert_eq!(dest.id, b0.id, "a single-pane window has nowhere to go");
        let dest = navigate(&manager, "", Some(a1.id), Some(dir)).unwrap();
        assert!([a0.id, a1.id].contains(&dest.id));
    }
}

#[test]
fn navigation_survives_caller_pane_removal() {
    let manager = SessionManager::new();
    let (_, p0) = manager.create_session("demo", "0", 80, 24).unwrap();
    let p1 = manager.split_pane(p0.id, SplitOrientation::Vertical).unwrap();

    // The caller's pane disappears before it navigates.
    manager.kill_pane(p1.id).unwrap();
    let dest = navigate(&manager, "", Some(p1.id), Some(Direction::Down)).unwrap();
    assert_eq!(dest.id, p0.id, "falls back to a live pane instead of failing");
}

#[test]
fn stale_position_falls_back_to_first_pane() {
    let manager = SessionManager::new();
    let (_, p0) = manager.create_session("demo", "0", 80, 24).unwrap();
    let p1 = manager.split_pane(p0.id, SplitOrientation::Vertical).unwrap();

    let panes = manager
        .list_panes_by_window_target("demo:0", None, false)
        .unwrap();
    assert_eq!(position_in(&panes, p1.id), 1);
    // A pane id that vanished between resolution and the fresh fetch.
    assert_eq!(position_in(&panes, 12345), 0);
    assert_eq!(position_in(&[], 0), 0);
}

#[test]
fn concurrent_mutation_never_panics_navigation() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    let manager = SessionManager::new();
    let (_, seed) = manager.create_session("stress", "0", 200, 100).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    // One thread splits and kills panes while others navigate from
    // whatever caller ids they last saw.
    let mutator = {
        let manager = manager.clone();
        let stop = stop.clone();
        std::thread::spawn(move || {
            let mut last = seed.id;
            for round in 0..300u64 {
                if let Ok(p) = manager.split_pane(last, SplitOrientation::Vertical) {
                    if round % 3 == 0 {
                        let _ = manager.kill_pane(p.id);
                    } else {
                        last = p.id;
                    }
                }
            }
            stop.store(true, Ordering::Release);
        })
    };

    let navigators: Vec<_> = (0..3)
        .map(|i| {
            let manager = manager.clone();
            let stop = stop.clone();
            std::thread::spawn(move || {
                let dirs = [Direction::Up, Direction::Down];
                let mut caller = seed.id;
                while !stop.load(Ordering::Acquire) {
                    match navigate(&manager, "", Some(caller), Some(dirs[i % 2])) {
                        Ok(pane) => caller = pane.id,
                        Err(RegistryError::NotFound(_)) | Err(RegistryError::NoPanes) => {}
                        Err(e) => panic!("unexpected navigation error: {e}"),
                    }
                }
            })
        })
        .collect();

    mutator.join().unwrap();
    for nav in navigators {
        nav.join().unwrap();
    }
}
