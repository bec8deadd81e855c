//! Frame loop driver
//!
//! [`AnchorSession`] is driven by the render thread, one [`AnchorSession::tick`]
//! per display frame. A tick acquires the newest camera frame, applies
//! whatever completed since the last tick (cloud requests, video fetches,
//! taps) and then renders through the mode's strategy:
//!
//! - hosting: the tap-placed candidate, its quality indicator and the
//!   auto-host trigger,
//! - resolving: every tracked overlay plus proximity activation.
//!
//! A failing tick is logged and reported; it never takes the session down.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bevy::math::Mat4;
use crossbeam_channel::Receiver;
use instant::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::anchors::{ResolveOutcome, SharedAnchors};
use crate::cloud::{
    CloudAnchorManager, CloudAnchorService, CloudAnchorState, CloudCompletion, HostCompletion,
    ResolveCompletion,
};
use crate::config::EngineConfig;
use crate::error::{AnchorError, AnchorResult};
use crate::events::{EventSink, SessionEvent};
use crate::geometry::{camera_facing_pose, CameraView, Pose};
use crate::proximity::{select_nearest, ProximityActivation};
use crate::quality::{QualityEstimator, QualityHistory, QualityIndicator};
use crate::records::{
    playable_records, AnchorId, AnchorRecord, AnchorRepository, Geolocation, MediaFetch,
};
use crate::tap::{AcceptedTap, HostCandidate, TapController, TapQueue};
use crate::tracking::{Frame, FrameAcquisition, SpatialAnchor, TrackingSession, TrackingState};
use crate::video::{DecoderFactory, LayerDraw};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionMode {
    Hosting,
    Resolving,
}

/// Drawing primitives for one frame, implemented by the host renderer
pub trait SceneRenderer: Send {
    fn draw_background(&mut self, frame: &dyn Frame);
    fn draw_planes(&mut self, camera: &CameraView);
    fn draw_anchor_object(&mut self, model: Mat4, camera: &CameraView);
    fn draw_quality_indicator(
        &mut self,
        anchor: &Pose,
        indicator: &QualityIndicator,
        history: &QualityHistory,
        camera: &CameraView,
    );
    fn draw_video(&mut self, layer: &LayerDraw, camera: &CameraView);
}

/// Everything the session talks to
pub struct Collaborators {
    /// `None` when the device could not create a tracking session
    pub tracking: Option<Box<dyn TrackingSession>>,
    pub cloud: Box<dyn CloudAnchorService>,
    pub repository: Box<dyn AnchorRepository>,
    pub media: Arc<dyn MediaFetch>,
    pub geolocation: Box<dyn Geolocation>,
    pub decoders: Arc<dyn DecoderFactory>,
    pub renderer: Box<dyn SceneRenderer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoSession,
    Paused,
    /// Hosting finished, the screen is about to close
    Finished,
    /// The tracking session had no frame for us this tick
    FramePaused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    Rendered {
        tracking: TrackingState,
        /// Anchor content (candidate or overlays) was drawn
        drew_content: bool,
    },
    Failed,
}

pub struct AnchorSession {
    mode: SessionMode,
    config: EngineConfig,
    tracking: Option<Box<dyn TrackingSession>>,
    cloud: CloudAnchorManager,
    repository: Box<dyn AnchorRepository>,
    media: Arc<dyn MediaFetch>,
    geolocation: Box<dyn Geolocation>,
    decoders: Arc<dyn DecoderFactory>,
    renderer: Box<dyn SceneRenderer>,
    anchors: SharedAnchors,
    records: HashMap<AnchorId, AnchorRecord>,
    taps: TapController,
    candidate: Option<HostCandidate>,
    proximity: ProximityActivation,
    events: EventSink,
    event_rx: Receiver<SessionEvent>,
    started: bool,
    paused: bool,
    finished: bool,
    torn_down: bool,
}

impl AnchorSession {
    pub fn new(mode: SessionMode, config: EngineConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            tracking,
            cloud,
            repository,
            media,
            geolocation,
            decoders,
            renderer,
        } = collaborators;

        let (events, event_rx) = EventSink::channel();
        if tracking.is_none() {
            error!("No tracking session available, anchors cannot be placed or found");
            events.emit(SessionEvent::SessionUnavailable {
                reason: "tracking session could not be created".to_string(),
            });
        }

        Self {
            mode,
            cloud: CloudAnchorManager::new(cloud, config.max_in_flight_resolves),
            config,
            tracking,
            repository,
            media,
            geolocation,
            decoders,
            renderer,
            anchors: SharedAnchors::new(),
            records: HashMap::new(),
            taps: TapController::new(TapQueue::new(mode == SessionMode::Hosting)),
            candidate: None,
            proximity: ProximityActivation::new(),
            events,
            event_rx,
            started: false,
            paused: false,
            finished: false,
            torn_down: false,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Receiver for user-visible messages; every clone sees each event once
    pub fn events(&self) -> Receiver<SessionEvent> {
        self.event_rx.clone()
    }

    /// Handle for the UI thread to deliver taps
    pub fn tap_queue(&self) -> TapQueue {
        self.taps.queue().clone()
    }

    pub fn anchors(&self) -> &SharedAnchors {
        &self.anchors
    }

    pub fn candidate(&self) -> Option<&HostCandidate> {
        self.candidate.as_ref()
    }

    pub fn playing(&self) -> Option<&str> {
        self.proximity.playing()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Load records and issue resolves (resolving), or prompt for a tap (hosting)
    pub fn start(&mut self) -> AnchorResult<()> {
        if self.started {
            return Ok(());
        }
        if self.tracking.is_none() {
            return Err(AnchorError::SessionUnavailable(
                "tracking session could not be created".to_string(),
            ));
        }
        match self.mode {
            SessionMode::Hosting => {
                info!("Hosting session started");
                self.events.emit(SessionEvent::PlaceAnchor);
            }
            SessionMode::Resolving => {
                let (order, records) = playable_records(self.repository.load()?);
                self.records = records;
                let added = self.anchors.add_unresolved(order);
                info!("Resolving {} anchor(s)", added.len());
                self.cloud.resolve_all(added);
                self.events.emit(SessionEvent::ResolvingProgress {
                    remaining: self.anchors.unresolved_count(),
                });
            }
        }
        self.started = true;
        Ok(())
    }

    pub fn tick(&mut self) -> TickOutcome {
        self.tick_at(Instant::now())
    }

    /// One frame at an explicit time, used for throttling
    pub fn tick_at(&mut self, now: Instant) -> TickOutcome {
        if self.tracking.is_none() {
            return TickOutcome::Skipped(SkipReason::NoSession);
        }
        if self.paused {
            return TickOutcome::Skipped(SkipReason::Paused);
        }
        if self.finished {
            return TickOutcome::Skipped(SkipReason::Finished);
        }

        match panic::catch_unwind(AssertUnwindSafe(|| self.render_frame(now))) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                if e.is_transient() {
                    debug!("Frame skipped: {}", e);
                } else {
                    error!("Frame failed: {}", e);
                }
                TickOutcome::Failed
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("{}", AnchorError::UnexpectedRender(message));
                TickOutcome::Failed
            }
        }
    }

    fn render_frame(&mut self, now: Instant) -> AnchorResult<TickOutcome> {
        let tracking = self
            .tracking
            .as_mut()
            .ok_or_else(|| AnchorError::SessionUnavailable("session closed".to_string()))?;
        let frame = match tracking.acquire_frame()? {
            FrameAcquisition::Ready(frame) => frame,
            FrameAcquisition::Paused => return Ok(TickOutcome::Skipped(SkipReason::FramePaused)),
        };

        let camera_state = frame.tracking_state();
        let camera = frame.camera_view(self.config.near_clip, self.config.far_clip);

        self.process_cloud_completions();
        match self.mode {
            SessionMode::Hosting => self.deliver_tap(frame.as_ref(), camera_state)?,
            SessionMode::Resolving => self.proximity.apply_fetch_results(
                &self.anchors,
                &self.records,
                &self.config,
                &self.events,
            ),
        }

        self.renderer.draw_background(frame.as_ref());
        if camera_state != TrackingState::Tracking {
            trace!("{}", AnchorError::TrackingPaused);
            return Ok(TickOutcome::Rendered {
                tracking: camera_state,
                drew_content: false,
            });
        }

        let drew_content = match self.mode {
            SessionMode::Hosting => self.render_hosting(now, &camera),
            SessionMode::Resolving => self.render_resolving(&camera),
        };
        Ok(TickOutcome::Rendered {
            tracking: camera_state,
            drew_content,
        })
    }

    fn process_cloud_completions(&mut self) {
        for completion in self.cloud.on_update() {
            match completion {
                CloudCompletion::Hosted(hosted) => self.on_host_complete(hosted),
                CloudCompletion::Resolved(resolved) => self.on_resolve_complete(resolved),
            }
        }
    }

    fn on_host_complete(&mut self, completion: HostCompletion) {
        let anchor_id = match (completion.state, completion.anchor_id) {
            (CloudAnchorState::Success, Some(anchor_id)) => anchor_id,
            (state, _) => {
                let state = if state.is_error() {
                    state
                } else {
                    CloudAnchorState::ErrorInternal
                };
                warn!("{}", AnchorError::HostFailed { state });
                if let Some(candidate) = self.candidate.as_mut() {
                    candidate.estimator.clear_latch();
                }
                self.events.emit(SessionEvent::HostFailed { state });
                return;
            }
        };

        info!("Anchor hosted as {}", anchor_id);
        if let Some(candidate) = self.candidate.as_mut() {
            candidate.anchor.anchor_id = Some(anchor_id.clone());
        }
        let location = self.geolocation.last_known_location();
        if let Err(e) = self
            .repository
            .save(AnchorRecord::hosted(anchor_id.clone(), location))
        {
            error!("Failed to save record for hosted anchor {}: {}", anchor_id, e);
        }
        self.finished = true;
        self.events.emit(SessionEvent::HostingFinished {
            anchor_id,
            location,
        });
    }

    fn on_resolve_complete(&mut self, completion: ResolveCompletion) {
        match self
            .anchors
            .complete_resolve(completion, self.decoders.as_ref())
        {
            ResolveOutcome::Resolved { remaining, .. } => {
                self.events
                    .emit(SessionEvent::ResolvingProgress { remaining });
            }
            ResolveOutcome::Failed {
                anchor_id,
                state,
                remaining,
            } => {
                self.events
                    .emit(SessionEvent::ResolveFailed { anchor_id, state });
                self.events
                    .emit(SessionEvent::ResolvingProgress { remaining });
            }
            ResolveOutcome::Stale { .. } => {}
        }
    }

    fn deliver_tap(&mut self, frame: &dyn Frame, camera_state: TrackingState) -> AnchorResult<()> {
        match self
            .taps
            .consume(frame, camera_state, self.cloud.is_host_in_flight())
        {
            Ok(Some(accepted)) => self.place_candidate(accepted),
            Ok(None) => Ok(()),
            Err(AnchorError::HitTestNoMatch) => {
                debug!("Tap did not hit a tracked plane");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn place_candidate(&mut self, tap: AcceptedTap) -> AnchorResult<()> {
        let tracking = self
            .tracking
            .as_mut()
            .ok_or_else(|| AnchorError::SessionUnavailable("session closed".to_string()))?;
        let handle = tracking.create_anchor(tap.pose)?;
        if let Some(previous) = self.candidate.take() {
            debug!("Replacing hosting candidate");
            previous.anchor.detach();
        }
        info!("Placed hosting candidate on {:?} plane", tap.orientation);
        self.candidate = Some(HostCandidate::new(
            SpatialAnchor::new(handle),
            tap.orientation,
            QualityEstimator::new(&self.config),
        ));
        Ok(())
    }

    fn render_hosting(&mut self, now: Instant, camera: &CameraView) -> bool {
        let Some(candidate) = self.candidate.as_mut() else {
            self.renderer.draw_planes(camera);
            return false;
        };
        // a candidate that lost tracking hides everything until it is back
        if !candidate.anchor.is_tracking() {
            return false;
        }

        let pose = candidate.anchor.pose();
        self.renderer.draw_anchor_object(pose.to_matrix(), camera);
        if candidate.estimator.is_latched() {
            return true;
        }

        let Some(tracking) = self.tracking.as_ref() else {
            return true;
        };
        let step = candidate
            .estimator
            .step(now, &pose, &candidate.indicator, camera, |viewpoint| {
                tracking.estimate_map_quality(viewpoint)
            });
        if let Some(guidance) = step.guidance {
            self.events.emit(SessionEvent::Guidance(guidance));
        }
        if step.trigger_host {
            match self.cloud.host(pose) {
                Ok(()) => self.events.emit(SessionEvent::HostingProcessing),
                Err(e) => {
                    warn!("Auto-host not started: {}", e);
                    candidate.estimator.clear_latch();
                }
            }
        }
        self.renderer.draw_quality_indicator(
            &pose,
            &candidate.indicator,
            candidate.estimator.history(),
            camera,
        );
        true
    }

    fn render_resolving(&mut self, camera: &CameraView) -> bool {
        let resolved = self.anchors.snapshot();
        let fallback = self.config.default_video_params();
        let mut drew_content = false;

        for anchor in resolved.iter().filter(|r| r.anchor.is_tracking()) {
            let facing = camera_facing_pose(&anchor.anchor.pose(), &camera.pose);
            let scale = self
                .records
                .get(anchor.anchor_id())
                .map_or(1.0, |record| record.scaling_factor);
            anchor.player.update(facing.to_matrix(), scale);
            for layer in anchor.player.prepare_draw(self.config.quad_scale, fallback) {
                self.renderer.draw_video(&layer, camera);
                drew_content = true;
            }
        }

        let nearest = select_nearest(&resolved, camera, self.config.disappear_distance_sq)
            .map(|index| &resolved[index]);
        self.proximity.update(
            nearest,
            &self.anchors,
            &self.records,
            self.media.as_ref(),
            &self.events,
        );
        drew_content
    }

    /// Stop tracking and rewind the playing overlay
    pub fn pause(&mut self) {
        if self.paused {
            return;
        }
        self.proximity.stop_playing(&self.anchors);
        if let Some(tracking) = self.tracking.as_mut() {
            tracking.pause();
        }
        self.paused = true;
        debug!("Session paused");
    }

    pub fn resume(&mut self) -> AnchorResult<()> {
        if !self.paused {
            return Ok(());
        }
        if let Some(tracking) = self.tracking.as_mut() {
            tracking.resume()?;
        }
        self.paused = false;
        debug!("Session resumed");
        Ok(())
    }

    /// Close tracking and free every overlay exactly once; idempotent
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        self.proximity.stop_playing(&self.anchors);
        self.cloud.cancel_all();
        let resolved = self.anchors.teardown();
        for anchor in &resolved {
            anchor.player.release();
            anchor.anchor.detach();
        }
        if let Some(candidate) = self.candidate.take() {
            candidate.anchor.detach();
        }
        if let Some(mut tracking) = self.tracking.take() {
            tracking.close();
        }
        info!("Session torn down, released {} overlay(s)", resolved.len());
    }
}

impl Drop for AnchorSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
