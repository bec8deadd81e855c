//! Tests for session teardown

use std::sync::Arc;

use anchor_overlay::anchors::ResolveOutcome;
use anchor_overlay::cloud::{CloudAnchorState, ResolveCompletion};
use anchor_overlay::geometry::Pose;
use anchor_overlay::session::{SkipReason, TickOutcome};
use anchor_overlay::sim::{SimAnchor, SimDecoderFactory};
use anchor_overlay::tracking::AnchorHandle;
use anchor_overlay::SessionMode;
use bevy::math::Vec3;

use crate::test_utils::{playable_record, HarnessBuilder};

#[test]
fn test_teardown_releases_every_player_once() {
    let mut h = HarnessBuilder::new(SessionMode::Resolving)
        .record(playable_record("a"))
        .record(playable_record("b"))
        .record(playable_record("c"))
        .build();
    h.session.start().expect("Start failed");
    let a = h
        .cloud
        .complete_resolve("a", Pose::from_translation(Vec3::new(0.0, 0.0, -3.0)))
        .expect("Pending a");
    let b = h
        .cloud
        .complete_resolve("b", Pose::from_translation(Vec3::new(0.0, 0.0, -6.0)))
        .expect("Pending b");
    h.session.tick();
    h.session.tick();

    h.session.teardown();
    h.session.teardown();

    let decoders = h.decoders.decoders();
    assert_eq!(decoders.len(), 4);
    for decoder in &decoders {
        assert_eq!(decoder.calls().release, 1);
        assert_eq!(decoder.calls().stop, 1);
    }
    assert!(a.is_detached());
    assert!(b.is_detached());
    assert!(h.world.is_closed());
    assert_eq!(h.session.anchors().unresolved_count(), 0);
    assert_eq!(h.session.anchors().resolved_count(), 0);
    assert_eq!(h.session.tick(), TickOutcome::Skipped(SkipReason::NoSession));
}

#[test]
fn test_late_completion_after_teardown_is_dropped() {
    let mut h = HarnessBuilder::new(SessionMode::Resolving)
        .record(playable_record("a"))
        .build();
    h.session.start().expect("Start failed");
    h.session.teardown();

    let late = SimAnchor::new(Pose::IDENTITY);
    let factory = SimDecoderFactory::new();
    let outcome = h.session.anchors().complete_resolve(
        ResolveCompletion {
            anchor_id: "a".to_string(),
            state: CloudAnchorState::Success,
            anchor: Some(late.clone() as Arc<dyn AnchorHandle>),
        },
        &factory,
    );

    assert_eq!(
        outcome,
        ResolveOutcome::Stale {
            anchor_id: "a".to_string()
        }
    );
    assert_eq!(h.session.anchors().resolved_count(), 0);
    assert!(late.is_detached());
    // nothing was allocated for it
    assert!(factory.decoders().is_empty());

    // completing through the service after teardown is harmless too
    h.cloud.complete_resolve("a", Pose::IDENTITY);
    assert_eq!(h.session.tick(), TickOutcome::Skipped(SkipReason::NoSession));
    assert!(h.decoders.decoders().is_empty());
}

#[test]
fn test_duplicate_completion_allocates_nothing() {
    let mut h = HarnessBuilder::new(SessionMode::Resolving)
        .record(playable_record("a"))
        .build();
    h.session.start().expect("Start failed");
    h.cloud.complete_resolve("a", Pose::from_translation(Vec3::new(0.0, 0.0, -3.0)));
    h.session.tick();
    assert_eq!(h.decoders.decoders().len(), 2);

    let duplicate = SimAnchor::new(Pose::IDENTITY);
    let outcome = h.session.anchors().complete_resolve(
        ResolveCompletion {
            anchor_id: "a".to_string(),
            state: CloudAnchorState::Success,
            anchor: Some(duplicate.clone() as Arc<dyn AnchorHandle>),
        },
        &h.decoders,
    );

    assert!(matches!(outcome, ResolveOutcome::Stale { .. }));
    assert!(duplicate.is_detached());
    assert_eq!(h.decoders.decoders().len(), 2);
    assert_eq!(h.session.anchors().resolved_count(), 1);
}

#[test]
fn test_release_before_playback_still_frees_decoders() {
    let mut h = HarnessBuilder::new(SessionMode::Resolving)
        .record(playable_record("a"))
        .build();
    h.session.start().expect("Start failed");
    h.cloud.complete_resolve("a", Pose::from_translation(Vec3::new(40.0, 0.0, 40.0)));
    h.session.tick();
    assert_eq!(h.session.playing(), None);

    drop(h.session);
    for decoder in h.decoders.decoders() {
        assert_eq!(decoder.calls().release, 1);
    }
}
