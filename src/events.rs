//! User-visible session messages
//!
//! The engine never draws UI text itself. Whatever a screen should tell the
//! user is emitted as a [`SessionEvent`] on a channel owned by the session.

use crossbeam_channel::{Receiver, Sender};
use tracing::trace;

use crate::cloud::CloudAnchorState;
use crate::quality::DistanceGuidance;
use crate::records::GeoPosition;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Hosting screen is waiting for a tap on a plane
    PlaceAnchor,
    /// Viewpoint distance hint while mapping the candidate
    Guidance(DistanceGuidance),
    /// Auto-host fired, the cloud service is processing
    HostingProcessing,
    /// Host succeeded and the record was written
    HostingFinished {
        anchor_id: String,
        location: Option<GeoPosition>,
    },
    HostFailed {
        state: CloudAnchorState,
    },
    /// Number of anchors still being resolved
    ResolvingProgress {
        remaining: usize,
    },
    ResolveFailed {
        anchor_id: String,
        state: CloudAnchorState,
    },
    /// A resolved anchor became the nearest and its video is loading
    AnchorFound {
        name: String,
    },
    VideoLoadFailed {
        name: String,
    },
    /// The device cannot run a tracking session; blocks the screen
    SessionUnavailable {
        reason: String,
    },
}

/// Sending half kept by the session
#[derive(Clone)]
pub struct EventSink {
    tx: Sender<SessionEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, Receiver<SessionEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: SessionEvent) {
        trace!("Session event: {:?}", event);
        // nobody listening is fine
        let _ = self.tx.send(event);
    }
}
