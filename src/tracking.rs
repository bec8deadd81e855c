//! Tracking session contract
//!
//! The engine never talks to a concrete AR runtime. Everything it needs from
//! camera tracking (frames, hit tests, anchors and map-quality estimates) is
//! expressed by the traits in this module.

use std::fmt;
use std::sync::Arc;

use bevy::math::{Mat4, Vec2};

use crate::error::AnchorResult;
use crate::geometry::{CameraView, Pose};

/// Lifecycle of a tracked entity within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackingState {
    Tracking,
    Paused,
    Stopped,
}

/// Orientation of a detected plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaneOrientation {
    Horizontal,
    Vertical,
}

/// What a hit-test ray struck
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    Plane(PlaneOrientation),
    FeaturePoint,
    Other,
}

/// One hit-test candidate, ordered nearest first by the session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitResult {
    pub surface: SurfaceKind,
    pub pose: Pose,
    /// Whether the hit lies inside the plane's tracked polygon
    pub within_polygon: bool,
}

impl HitResult {
    /// Plane orientation when this hit can seed an anchor reliably
    pub fn anchorable_plane(&self) -> Option<PlaneOrientation> {
        match self.surface {
            SurfaceKind::Plane(orientation) if self.within_polygon => Some(orientation),
            _ => None,
        }
    }
}

/// Screen-space tap location in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint(pub Vec2);

impl ScreenPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self(Vec2::new(x, y))
    }
}

/// Live handle to an anchor tracked by the session
///
/// Pose and tracking state are refined every frame by the session.
pub trait AnchorHandle: Send + Sync {
    fn pose(&self) -> Pose;
    fn tracking_state(&self) -> TrackingState;
    /// Stop tracking; further reads report `Stopped`
    fn detach(&self);
}

/// Anchor as seen by the engine: a tracked handle plus an optional cloud id
#[derive(Clone)]
pub struct SpatialAnchor {
    pub anchor_id: Option<String>,
    handle: Arc<dyn AnchorHandle>,
}

impl SpatialAnchor {
    pub fn new(handle: Arc<dyn AnchorHandle>) -> Self {
        Self {
            anchor_id: None,
            handle,
        }
    }

    pub fn with_id(anchor_id: impl Into<String>, handle: Arc<dyn AnchorHandle>) -> Self {
        Self {
            anchor_id: Some(anchor_id.into()),
            handle,
        }
    }

    pub fn pose(&self) -> Pose {
        self.handle.pose()
    }

    pub fn tracking_state(&self) -> TrackingState {
        self.handle.tracking_state()
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking_state() == TrackingState::Tracking
    }

    pub fn detach(&self) {
        self.handle.detach();
    }

    pub fn handle(&self) -> &Arc<dyn AnchorHandle> {
        &self.handle
    }
}

impl fmt::Debug for SpatialAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialAnchor")
            .field("anchor_id", &self.anchor_id)
            .field("pose", &self.pose())
            .field("tracking_state", &self.tracking_state())
            .finish()
    }
}

/// A single camera frame
pub trait Frame {
    fn camera_pose(&self) -> Pose;
    fn tracking_state(&self) -> TrackingState;
    fn view_matrix(&self) -> Mat4;
    fn projection_matrix(&self, near: f32, far: f32) -> Mat4;
    fn hit_test(&self, point: ScreenPoint) -> Vec<HitResult>;

    fn camera_view(&self, near: f32, far: f32) -> CameraView {
        CameraView::new(
            self.camera_pose(),
            self.view_matrix(),
            self.projection_matrix(near, far),
        )
    }
}

/// Result of asking the session for the newest frame
pub enum FrameAcquisition {
    Ready(Box<dyn Frame>),
    /// The session is transiently paused; not an error
    Paused,
}

/// The device tracking session
pub trait TrackingSession: Send {
    /// Newest frame; never blocks indefinitely
    fn acquire_frame(&mut self) -> AnchorResult<FrameAcquisition>;

    /// Start tracking a new anchor at `pose`
    fn create_anchor(&mut self, pose: Pose) -> AnchorResult<Arc<dyn AnchorHandle>>;

    /// Map quality in [0, 1] for hosting an anchor seen from `camera`
    fn estimate_map_quality(&self, camera: &Pose) -> f32;

    fn pause(&mut self) {}

    fn resume(&mut self) -> AnchorResult<()> {
        Ok(())
    }

    /// Cancel outstanding native work and free resources
    fn close(&mut self) {}
}
