//! Bevy integration
//!
//! The session is not `Sync`, so it lives in the world as a non-send resource
//! and is ticked from `Update` on the main thread. Session messages are
//! re-emitted as [`AnchorOverlayEvent`]s for the rest of the app.

use bevy::prelude::*;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::events::SessionEvent;
use crate::session::{AnchorSession, TickOutcome};
use crate::tap::TapQueue;

/// A session message, forwarded into Bevy's event queue
#[derive(Event, Debug, Clone, PartialEq)]
pub struct AnchorOverlayEvent(pub SessionEvent);

#[derive(Resource)]
pub struct SessionEventsChannel(pub Receiver<SessionEvent>);

/// Tap input for the hosting screen
#[derive(Resource, Clone)]
pub struct SessionTaps(pub TapQueue);

/// Outcome of the most recent tick
#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastTick(pub TickOutcome);

pub struct AnchorOverlayPlugin {
    session: Mutex<Option<AnchorSession>>,
}

impl AnchorOverlayPlugin {
    pub fn new(session: AnchorSession) -> Self {
        Self {
            session: Mutex::new(Some(session)),
        }
    }
}

impl Plugin for AnchorOverlayPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<AnchorOverlayEvent>();

        let Some(mut session) = self.session.lock().take() else {
            warn!("Anchor overlay plugin built twice, ignoring");
            return;
        };
        if let Err(e) = session.start() {
            error!("Failed to start anchor session: {}", e);
        }

        app.insert_resource(SessionEventsChannel(session.events()))
            .insert_resource(SessionTaps(session.tap_queue()))
            .insert_non_send_resource(session)
            .add_systems(
                Update,
                (tick_anchor_session, forward_session_events).chain(),
            )
            .add_systems(Last, teardown_on_exit);
    }
}

fn tick_anchor_session(mut session: NonSendMut<AnchorSession>, mut commands: Commands) {
    let outcome = session.tick();
    if outcome == TickOutcome::Failed {
        debug!("Anchor session tick failed, continuing");
    }
    commands.insert_resource(LastTick(outcome));
}

fn forward_session_events(
    channel: Res<SessionEventsChannel>,
    mut events: EventWriter<AnchorOverlayEvent>,
) {
    for event in channel.0.try_iter() {
        events.write(AnchorOverlayEvent(event));
    }
}

fn teardown_on_exit(mut exit: EventReader<AppExit>, mut session: NonSendMut<AnchorSession>) {
    if exit.read().next().is_some() {
        session.teardown();
    }
}
