//! Tap-to-anchor input for the hosting screen
//!
//! Taps arrive on the UI thread and are consumed by the render tick. Only the
//! newest tap is kept: a tap that lands before the previous one was consumed
//! replaces it.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{AnchorError, AnchorResult};
use crate::geometry::Pose;
use crate::quality::{QualityEstimator, QualityIndicator};
use crate::tracking::{Frame, HitResult, PlaneOrientation, ScreenPoint, SpatialAnchor, TrackingState};

#[derive(Clone)]
pub struct TapQueue {
    slot: Arc<Mutex<Option<ScreenPoint>>>,
    enabled: bool,
}

impl TapQueue {
    pub fn new(enabled: bool) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            enabled,
        }
    }

    /// Record a tap; ignored when the screen does not accept taps
    pub fn on_tap(&self, point: ScreenPoint) {
        if !self.enabled {
            trace!("Ignoring tap outside hosting mode");
            return;
        }
        *self.slot.lock() = Some(point);
    }

    pub fn take(&self) -> Option<ScreenPoint> {
        self.slot.lock().take()
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().is_some()
    }
}

/// A tap that hit a usable plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptedTap {
    pub pose: Pose,
    pub orientation: PlaneOrientation,
}

pub struct TapController {
    queue: TapQueue,
}

impl TapController {
    pub fn new(queue: TapQueue) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &TapQueue {
        &self.queue
    }

    /// Deliver the pending tap, if any, against this frame.
    ///
    /// The slot is cleared whatever the outcome. `Ok(None)` means there was
    /// nothing to do this tick.
    pub fn consume(
        &self,
        frame: &dyn Frame,
        camera_tracking: TrackingState,
        host_in_flight: bool,
    ) -> AnchorResult<Option<AcceptedTap>> {
        let Some(point) = self.queue.take() else {
            return Ok(None);
        };
        if camera_tracking != TrackingState::Tracking {
            debug!("Dropping tap while camera is {:?}", camera_tracking);
            return Ok(None);
        }
        if host_in_flight {
            debug!("Dropping tap while a host is in flight");
            return Ok(None);
        }

        first_anchorable_hit(&frame.hit_test(point))
            .map(Some)
            .ok_or(AnchorError::HitTestNoMatch)
    }
}

fn first_anchorable_hit(hits: &[HitResult]) -> Option<AcceptedTap> {
    hits.iter().find_map(|hit| {
        hit.anchorable_plane().map(|orientation| AcceptedTap {
            pose: hit.pose,
            orientation,
        })
    })
}

/// The single anchor being prepared for hosting
pub struct HostCandidate {
    pub anchor: SpatialAnchor,
    pub indicator: QualityIndicator,
    pub estimator: QualityEstimator,
}

impl HostCandidate {
    pub fn new(anchor: SpatialAnchor, orientation: PlaneOrientation, estimator: QualityEstimator) -> Self {
        Self {
            anchor,
            indicator: QualityIndicator::new(orientation),
            estimator,
        }
    }
}
