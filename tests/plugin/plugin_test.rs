//! Tests for ticking the session from a Bevy app

use anchor_overlay::plugin::{LastTick, SessionTaps};
use anchor_overlay::tracking::{PlaneOrientation, ScreenPoint, TrackingState};
use anchor_overlay::{
    AnchorOverlayEvent, AnchorOverlayPlugin, AnchorSession, SessionEvent, SessionMode, TickOutcome,
};
use bevy::prelude::*;

use crate::test_utils::{plane_hit, HarnessBuilder};

fn collect_events(app: &App) -> Vec<SessionEvent> {
    let events = app.world().resource::<Events<AnchorOverlayEvent>>();
    let mut cursor = events.get_cursor();
    cursor.read(events).map(|e| e.0.clone()).collect()
}

#[test]
fn test_plugin_ticks_session_and_forwards_events() {
    let h = HarnessBuilder::new(SessionMode::Hosting).build();
    let world = h.world.clone();
    let renderer = h.renderer.clone();

    let mut app = App::new();
    app.add_plugins(AnchorOverlayPlugin::new(h.session));
    app.update();

    assert_eq!(collect_events(&app), vec![SessionEvent::PlaceAnchor]);
    assert_eq!(
        app.world().resource::<LastTick>().0,
        TickOutcome::Rendered {
            tracking: TrackingState::Tracking,
            drew_content: false
        }
    );
    assert_eq!(renderer.log().planes, 1);

    // taps delivered through the resource reach the session
    world.set_hits(vec![plane_hit(
        PlaneOrientation::Horizontal,
        Vec3::new(0.0, 0.0, -2.0),
    )]);
    app.world()
        .resource::<SessionTaps>()
        .0
        .on_tap(ScreenPoint::new(1.0, 1.0));
    app.update();

    let session = app
        .world()
        .get_non_send_resource::<AnchorSession>()
        .expect("Session resource");
    assert!(session.candidate().is_some());
    assert_eq!(renderer.log().anchor_objects, 1);
}
