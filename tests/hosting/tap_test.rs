//! Tests for tap-to-anchor placement

use anchor_overlay::geometry::Pose;
use anchor_overlay::session::{SkipReason, TickOutcome};
use anchor_overlay::tracking::{
    HitResult, PlaneOrientation, ScreenPoint, SurfaceKind, TrackingState,
};
use anchor_overlay::SessionEvent;
use bevy::math::Vec3;

use crate::test_utils::{hosting_harness, plane_hit};

#[test]
fn test_tap_on_plane_places_candidate() {
    let mut h = hosting_harness();
    h.session.start().expect("Start failed");
    assert_eq!(h.drain_events(), vec![SessionEvent::PlaceAnchor]);

    h.world
        .set_hits(vec![plane_hit(PlaneOrientation::Horizontal, Vec3::new(0.0, -0.5, -2.0))]);
    h.session.tap_queue().on_tap(ScreenPoint::new(540.0, 960.0));
    let outcome = h.session.tick();

    assert_eq!(
        outcome,
        TickOutcome::Rendered {
            tracking: TrackingState::Tracking,
            drew_content: true
        }
    );
    let candidate = h.session.candidate().expect("Candidate should exist");
    assert_eq!(candidate.anchor.pose().translation, Vec3::new(0.0, -0.5, -2.0));
    assert_eq!(candidate.indicator.orientation, PlaneOrientation::Horizontal);
    assert!(candidate.anchor.anchor_id.is_none());
    assert_eq!(h.renderer.log().anchor_objects, 1);
}

#[test]
fn test_tap_outside_polygon_or_on_feature_point_is_rejected() {
    let mut h = hosting_harness();
    h.session.start().expect("Start failed");

    h.world.set_hits(vec![
        HitResult {
            surface: SurfaceKind::FeaturePoint,
            pose: Pose::from_translation(Vec3::new(0.0, 0.0, -1.0)),
            within_polygon: true,
        },
        HitResult {
            surface: SurfaceKind::Plane(PlaneOrientation::Horizontal),
            pose: Pose::from_translation(Vec3::new(0.0, 0.0, -2.0)),
            within_polygon: false,
        },
    ]);
    h.session.tap_queue().on_tap(ScreenPoint::new(10.0, 10.0));
    let outcome = h.session.tick();

    assert!(matches!(outcome, TickOutcome::Rendered { .. }));
    assert!(h.session.candidate().is_none());
    assert_eq!(h.renderer.log().planes, 1);
    // the tap was consumed, not left for the next frame
    assert!(!h.session.tap_queue().is_pending());
}

#[test]
fn test_first_valid_hit_wins_and_vertical_plane_is_recorded() {
    let mut h = hosting_harness();
    h.session.start().expect("Start failed");

    h.world.set_hits(vec![
        HitResult {
            surface: SurfaceKind::Other,
            pose: Pose::IDENTITY,
            within_polygon: true,
        },
        plane_hit(PlaneOrientation::Vertical, Vec3::new(0.0, 0.0, -3.0)),
        plane_hit(PlaneOrientation::Horizontal, Vec3::new(0.0, 0.0, -4.0)),
    ]);
    h.session.tap_queue().on_tap(ScreenPoint::new(1.0, 1.0));
    h.session.tick();

    let candidate = h.session.candidate().expect("Candidate should exist");
    assert_eq!(candidate.indicator.orientation, PlaneOrientation::Vertical);
    assert_eq!(candidate.anchor.pose().translation.z, -3.0);
}

#[test]
fn test_second_tap_replaces_and_detaches_candidate() {
    let mut h = hosting_harness();
    h.session.start().expect("Start failed");

    h.world
        .set_hits(vec![plane_hit(PlaneOrientation::Horizontal, Vec3::new(0.0, 0.0, -2.0))]);
    h.session.tap_queue().on_tap(ScreenPoint::new(1.0, 1.0));
    h.session.tick();
    let first = h.session.candidate().expect("First candidate").anchor.clone();

    h.world
        .set_hits(vec![plane_hit(PlaneOrientation::Horizontal, Vec3::new(1.0, 0.0, -3.0))]);
    h.session.tap_queue().on_tap(ScreenPoint::new(2.0, 2.0));
    h.session.tick();

    let second = &h.session.candidate().expect("Second candidate").anchor;
    assert_eq!(second.pose().translation, Vec3::new(1.0, 0.0, -3.0));
    assert_eq!(first.tracking_state(), TrackingState::Stopped);
    assert!(second.is_tracking());
}

#[test]
fn test_taps_are_dropped_while_camera_is_not_tracking() {
    let mut h = hosting_harness();
    h.session.start().expect("Start failed");

    h.world.set_tracking_state(TrackingState::Paused);
    h.world
        .set_hits(vec![plane_hit(PlaneOrientation::Horizontal, Vec3::new(0.0, 0.0, -2.0))]);
    h.session.tap_queue().on_tap(ScreenPoint::new(1.0, 1.0));
    let outcome = h.session.tick();

    assert_eq!(
        outcome,
        TickOutcome::Rendered {
            tracking: TrackingState::Paused,
            drew_content: false
        }
    );
    assert!(h.session.candidate().is_none());
    assert_eq!(h.renderer.log().backgrounds, 1);

    // once tracking returns the dropped tap does not come back
    h.world.set_tracking_state(TrackingState::Tracking);
    h.session.tick();
    assert!(h.session.candidate().is_none());
}

#[test]
fn test_paused_frames_skip_cleanly() {
    let mut h = hosting_harness();
    h.session.start().expect("Start failed");

    h.world.set_frames_paused(true);
    assert_eq!(
        h.session.tick(),
        TickOutcome::Skipped(SkipReason::FramePaused)
    );
    assert_eq!(h.renderer.log().backgrounds, 0);

    h.world.set_frames_paused(false);
    assert!(matches!(h.session.tick(), TickOutcome::Rendered { .. }));
}

#[test]
fn test_candidate_losing_tracking_hides_planes_and_object() {
    let mut h = hosting_harness();
    h.session.start().expect("Start failed");
    h.world
        .set_hits(vec![plane_hit(PlaneOrientation::Horizontal, Vec3::new(0.0, 0.0, -2.0))]);
    h.session.tap_queue().on_tap(ScreenPoint::new(1.0, 1.0));
    h.session.tick();
    assert_eq!(h.renderer.log().anchor_objects, 1);

    let placed = h.world.created_anchors();
    assert_eq!(placed.len(), 1);
    placed[0].set_tracking_state(TrackingState::Paused);
    h.renderer.clear();

    assert_eq!(
        h.session.tick(),
        TickOutcome::Rendered {
            tracking: TrackingState::Tracking,
            drew_content: false
        }
    );
    let log = h.renderer.log();
    assert_eq!(log.planes, 0);
    assert_eq!(log.anchor_objects, 0);
    assert_eq!(log.quality_indicators, 0);
    assert_eq!(log.backgrounds, 1);
}
