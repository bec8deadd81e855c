//! In-memory collaborators
//!
//! A scripted world that stands in for the device runtime: a movable camera,
//! hit tests and map-quality values set by the caller, a cloud service whose
//! requests stay pending until completed by hand, and decoders that only
//! count what was asked of them. The demo binary and the integration tests
//! run the real session against these.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bevy::math::{Mat4, Vec3};
use parking_lot::Mutex;
use tracing::debug;

use crate::cloud::{CloudAnchorService, CloudAnchorState, CompletionSender};
use crate::error::{AnchorError, AnchorResult};
use crate::geometry::{CameraView, Pose};
use crate::quality::{QualityHistory, QualityIndicator};
use crate::records::{
    AnchorRecord, AnchorRepository, GeoPosition, Geolocation, MediaFetch, VideoUriCallback,
};
use crate::session::SceneRenderer;
use crate::tracking::{
    AnchorHandle, Frame, FrameAcquisition, HitResult, ScreenPoint, TrackingSession, TrackingState,
};
use crate::video::{DecoderFactory, FrameListener, LayerDraw, TextureId, VideoDecoder};

const SIM_FOV_Y: f32 = 1.2;
const SIM_ASPECT: f32 = 0.5625;

// ---------------------------------------------------------------------------
// Tracking
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct WorldState {
    camera: Pose,
    tracking: TrackingState,
    frames_paused: bool,
    hits: Vec<HitResult>,
    quality: VecDeque<f32>,
    last_quality: f32,
    quality_queries: usize,
    anchors: Vec<Arc<SimAnchor>>,
    closed: bool,
}

/// Shared handle for steering the simulated session
#[derive(Clone)]
pub struct SimWorld {
    state: Arc<Mutex<WorldState>>,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SimWorld {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(WorldState {
                camera: Pose::IDENTITY,
                tracking: TrackingState::Tracking,
                frames_paused: false,
                hits: Vec::new(),
                quality: VecDeque::new(),
                last_quality: 0.0,
                quality_queries: 0,
                anchors: Vec::new(),
                closed: false,
            })),
        }
    }

    pub fn session(&self) -> SimTracking {
        SimTracking {
            world: self.clone(),
        }
    }

    pub fn set_camera(&self, pose: Pose) {
        self.state.lock().camera = pose;
    }

    /// Place the camera at `position`, looking at `target`
    pub fn look_at(&self, position: Vec3, target: Vec3) {
        let view = Mat4::look_at_rh(position, target, Vec3::Y);
        let (_, rotation, translation) = view.inverse().to_scale_rotation_translation();
        self.set_camera(Pose::new(translation, rotation));
    }

    pub fn set_tracking_state(&self, tracking: TrackingState) {
        self.state.lock().tracking = tracking;
    }

    pub fn set_frames_paused(&self, paused: bool) {
        self.state.lock().frames_paused = paused;
    }

    /// Hits returned for every tap, nearest first
    pub fn set_hits(&self, hits: Vec<HitResult>) {
        self.state.lock().hits = hits;
    }

    /// Queue map-quality values; the last one repeats once the queue is empty
    pub fn push_quality<I: IntoIterator<Item = f32>>(&self, values: I) {
        self.state.lock().quality.extend(values);
    }

    pub fn quality_queries(&self) -> usize {
        self.state.lock().quality_queries
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Anchors created through the session, oldest first
    pub fn created_anchors(&self) -> Vec<Arc<SimAnchor>> {
        self.state.lock().anchors.clone()
    }
}

pub struct SimTracking {
    world: SimWorld,
}

struct SimFrame {
    camera: Pose,
    tracking: TrackingState,
    hits: Vec<HitResult>,
}

impl Frame for SimFrame {
    fn camera_pose(&self) -> Pose {
        self.camera
    }

    fn tracking_state(&self) -> TrackingState {
        self.tracking
    }

    fn view_matrix(&self) -> Mat4 {
        self.camera.inverse().to_matrix()
    }

    fn projection_matrix(&self, near: f32, far: f32) -> Mat4 {
        Mat4::perspective_rh_gl(SIM_FOV_Y, SIM_ASPECT, near, far)
    }

    fn hit_test(&self, _point: ScreenPoint) -> Vec<HitResult> {
        self.hits.clone()
    }
}

impl TrackingSession for SimTracking {
    fn acquire_frame(&mut self) -> AnchorResult<FrameAcquisition> {
        let state = self.world.state.lock();
        if state.closed {
            return Err(AnchorError::SessionUnavailable("session closed".to_string()));
        }
        if state.frames_paused {
            return Ok(FrameAcquisition::Paused);
        }
        Ok(FrameAcquisition::Ready(Box::new(SimFrame {
            camera: state.camera,
            tracking: state.tracking,
            hits: state.hits.clone(),
        })))
    }

    fn create_anchor(&mut self, pose: Pose) -> AnchorResult<Arc<dyn AnchorHandle>> {
        let anchor = SimAnchor::new(pose);
        self.world.state.lock().anchors.push(Arc::clone(&anchor));
        Ok(anchor)
    }

    fn estimate_map_quality(&self, _camera: &Pose) -> f32 {
        let mut state = self.world.state.lock();
        state.quality_queries += 1;
        if let Some(value) = state.quality.pop_front() {
            state.last_quality = value;
        }
        state.last_quality
    }

    fn close(&mut self) {
        self.world.state.lock().closed = true;
    }
}

/// Anchor with a settable pose and tracking state
#[derive(Debug)]
pub struct SimAnchor {
    state: Mutex<(Pose, TrackingState)>,
}

impl SimAnchor {
    pub fn new(pose: Pose) -> Arc<SimAnchor> {
        Arc::new(Self {
            state: Mutex::new((pose, TrackingState::Tracking)),
        })
    }

    pub fn set_pose(&self, pose: Pose) {
        self.state.lock().0 = pose;
    }

    pub fn set_tracking_state(&self, tracking: TrackingState) {
        self.state.lock().1 = tracking;
    }

    pub fn is_detached(&self) -> bool {
        self.state.lock().1 == TrackingState::Stopped
    }
}

impl AnchorHandle for SimAnchor {
    fn pose(&self) -> Pose {
        self.state.lock().0
    }

    fn tracking_state(&self) -> TrackingState {
        self.state.lock().1
    }

    fn detach(&self) {
        self.state.lock().1 = TrackingState::Stopped;
    }
}

// ---------------------------------------------------------------------------
// Cloud
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CloudRequests {
    hosts: Vec<(Pose, CompletionSender)>,
    resolves: Vec<(String, CompletionSender)>,
    resolve_log: Vec<String>,
}

/// Cloud service whose requests stay pending until completed through
/// [`ManualCloud`]
#[derive(Clone, Default)]
pub struct ManualCloud {
    requests: Arc<Mutex<CloudRequests>>,
}

impl ManualCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn service(&self) -> Box<dyn CloudAnchorService> {
        Box::new(self.clone())
    }

    pub fn pending_hosts(&self) -> usize {
        self.requests.lock().hosts.len()
    }

    /// Every resolve ever issued, in order
    pub fn resolve_requests(&self) -> Vec<String> {
        self.requests.lock().resolve_log.clone()
    }

    pub fn pending_resolves(&self) -> Vec<String> {
        self.requests
            .lock()
            .resolves
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Complete the oldest pending host
    pub fn complete_host(&self, anchor_id: Option<&str>, state: CloudAnchorState) -> bool {
        let pending = {
            let mut requests = self.requests.lock();
            if requests.hosts.is_empty() {
                None
            } else {
                Some(requests.hosts.remove(0))
            }
        };
        match pending {
            Some((_, done)) => {
                done.hosted(anchor_id.map(str::to_string), state);
                true
            }
            None => false,
        }
    }

    fn take_resolve(&self, anchor_id: &str) -> Option<CompletionSender> {
        let mut requests = self.requests.lock();
        let index = requests.resolves.iter().position(|(id, _)| id == anchor_id)?;
        Some(requests.resolves.remove(index).1)
    }

    /// Resolve `anchor_id` successfully at `pose`; returns the tracked anchor
    pub fn complete_resolve(&self, anchor_id: &str, pose: Pose) -> Option<Arc<SimAnchor>> {
        let done = self.take_resolve(anchor_id)?;
        let anchor = SimAnchor::new(pose);
        done.resolved(
            anchor_id,
            CloudAnchorState::Success,
            Some(anchor.clone() as Arc<dyn AnchorHandle>),
        );
        Some(anchor)
    }

    pub fn fail_resolve(&self, anchor_id: &str, state: CloudAnchorState) -> bool {
        match self.take_resolve(anchor_id) {
            Some(done) => {
                done.resolved(anchor_id, state, None);
                true
            }
            None => false,
        }
    }
}

impl CloudAnchorService for ManualCloud {
    fn host(&mut self, pose: Pose, done: CompletionSender) {
        debug!("Sim host request at {:?}", pose.translation);
        self.requests.lock().hosts.push((pose, done));
    }

    fn resolve(&mut self, anchor_id: &str, done: CompletionSender) {
        let mut requests = self.requests.lock();
        requests.resolve_log.push(anchor_id.to_string());
        requests.resolves.push((anchor_id.to_string(), done));
    }
}

// ---------------------------------------------------------------------------
// Records, media and location
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemoryRepository {
    records: Arc<Mutex<Vec<AnchorRecord>>>,
}

impl MemoryRepository {
    pub fn new(records: Vec<AnchorRecord>) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
        }
    }

    pub fn records(&self) -> Vec<AnchorRecord> {
        self.records.lock().clone()
    }
}

impl AnchorRepository for MemoryRepository {
    fn load(&mut self) -> AnchorResult<Vec<AnchorRecord>> {
        Ok(self.records.lock().clone())
    }

    fn save(&mut self, record: AnchorRecord) -> AnchorResult<()> {
        let mut records = self.records.lock();
        match records.iter_mut().find(|r| r.anchor_id == record.anchor_id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        Ok(())
    }

    fn remove(&mut self, anchor_id: &str) -> AnchorResult<()> {
        self.records.lock().retain(|r| r.anchor_id != anchor_id);
        Ok(())
    }
}

/// Completes lookups synchronously from a fixed table
#[derive(Default)]
pub struct InstantMediaFetch {
    locations: HashMap<String, String>,
    lookups: Mutex<Vec<String>>,
}

impl InstantMediaFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_location(mut self, video_ref: &str, uri: &str) -> Self {
        self.locations.insert(video_ref.to_string(), uri.to_string());
        self
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().clone()
    }
}

impl MediaFetch for InstantMediaFetch {
    fn resolve_video_uri(&self, video_ref: &str, done: VideoUriCallback) {
        self.lookups.lock().push(video_ref.to_string());
        done(self.locations.get(video_ref).cloned());
    }
}

pub struct FixedLocation(pub Option<GeoPosition>);

impl Geolocation for FixedLocation {
    fn last_known_location(&self) -> Option<GeoPosition> {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Video
// ---------------------------------------------------------------------------

/// What a simulated decoder was asked to do
#[derive(Debug, Default, Clone)]
pub struct DecoderCalls {
    pub source: Option<String>,
    pub initialize: usize,
    pub prepare: usize,
    pub start: usize,
    pub pause: usize,
    pub seek: usize,
    pub stop: usize,
    pub release: usize,
    pub update_texture: usize,
}

#[derive(Default)]
struct DecoderProbe {
    calls: DecoderCalls,
    listener: Option<FrameListener>,
}

/// Test-side view of one decoder
#[derive(Clone)]
pub struct DecoderHandle {
    probe: Arc<Mutex<DecoderProbe>>,
}

impl DecoderHandle {
    pub fn calls(&self) -> DecoderCalls {
        self.probe.lock().calls.clone()
    }

    fn listener(&self) -> Option<FrameListener> {
        self.probe.lock().listener.clone()
    }

    /// Report the decoder ready; false before the layer initialized it
    pub fn prepared(&self, width: u32, height: u32) -> bool {
        match self.listener() {
            Some(listener) => {
                listener.on_prepared(width, height);
                true
            }
            None => false,
        }
    }

    pub fn frame_available(&self) -> bool {
        match self.listener() {
            Some(listener) => {
                listener.on_frame_available();
                true
            }
            None => false,
        }
    }
}

pub struct SimDecoder {
    probe: Arc<Mutex<DecoderProbe>>,
    texture_id: TextureId,
    fail_source: bool,
    auto_prepare: Option<(u32, u32)>,
}

impl VideoDecoder for SimDecoder {
    fn initialize(&mut self, listener: FrameListener) -> AnchorResult<TextureId> {
        let mut probe = self.probe.lock();
        probe.calls.initialize += 1;
        probe.listener = Some(listener);
        Ok(self.texture_id)
    }

    fn reset(&mut self) {}

    fn set_source(&mut self, uri: &str) -> AnchorResult<()> {
        if self.fail_source {
            return Err(AnchorError::VideoLoadFailed {
                anchor_id: String::new(),
                reason: format!("cannot open {}", uri),
            });
        }
        self.probe.lock().calls.source = Some(uri.to_string());
        Ok(())
    }

    fn set_looping(&mut self, _looping: bool) {}

    fn prepare_async(&mut self) {
        let listener = {
            let mut probe = self.probe.lock();
            probe.calls.prepare += 1;
            probe.listener.clone()
        };
        if let (Some((width, height)), Some(listener)) = (self.auto_prepare, listener) {
            listener.on_prepared(width, height);
        }
    }

    fn start(&mut self) {
        self.probe.lock().calls.start += 1;
    }

    fn pause(&mut self) {
        self.probe.lock().calls.pause += 1;
    }

    fn seek_to_start(&mut self) {
        self.probe.lock().calls.seek += 1;
    }

    fn stop(&mut self) {
        self.probe.lock().calls.stop += 1;
    }

    fn release(&mut self) {
        self.probe.lock().calls.release += 1;
    }

    fn update_texture(&mut self) -> Mat4 {
        self.probe.lock().calls.update_texture += 1;
        Mat4::IDENTITY
    }
}

/// Creates [`SimDecoder`]s and keeps a handle to each, in creation order
#[derive(Clone, Default)]
pub struct SimDecoderFactory {
    decoders: Arc<Mutex<Vec<DecoderHandle>>>,
    fail_source: bool,
    auto_prepare: Option<(u32, u32)>,
}

impl SimDecoderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every decoder refuses its source
    pub fn failing() -> Self {
        Self {
            fail_source: true,
            ..Self::default()
        }
    }

    /// Decoders report themselves prepared as soon as asked
    pub fn auto_prepared(width: u32, height: u32) -> Self {
        Self {
            auto_prepare: Some((width, height)),
            ..Self::default()
        }
    }

    pub fn decoders(&self) -> Vec<DecoderHandle> {
        self.decoders.lock().clone()
    }

    /// Main-layer decoder of the `player`th overlay built from this factory.
    /// An overlay takes two decoders, main first.
    pub fn main_decoder(&self, player: usize) -> Option<DecoderHandle> {
        self.decoders.lock().get(player * 2).cloned()
    }

    /// Backdrop decoder of the `player`th overlay built from this factory
    pub fn background_decoder(&self, player: usize) -> Option<DecoderHandle> {
        self.decoders.lock().get(player * 2 + 1).cloned()
    }
}

impl DecoderFactory for SimDecoderFactory {
    fn create(&self) -> Box<dyn VideoDecoder> {
        let probe = Arc::new(Mutex::new(DecoderProbe::default()));
        let mut decoders = self.decoders.lock();
        decoders.push(DecoderHandle {
            probe: Arc::clone(&probe),
        });
        Box::new(SimDecoder {
            probe,
            texture_id: decoders.len() as TextureId,
            fail_source: self.fail_source,
            auto_prepare: self.auto_prepare,
        })
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct RenderLog {
    pub backgrounds: usize,
    pub planes: usize,
    pub anchor_objects: usize,
    pub quality_indicators: usize,
    pub videos: Vec<LayerDraw>,
}

/// Renderer that records draw calls instead of issuing them
#[derive(Clone, Default)]
pub struct RecordingRenderer {
    log: Arc<Mutex<RenderLog>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> RenderLog {
        self.log.lock().clone()
    }

    pub fn clear(&self) {
        *self.log.lock() = RenderLog::default();
    }
}

impl SceneRenderer for RecordingRenderer {
    fn draw_background(&mut self, _frame: &dyn Frame) {
        self.log.lock().backgrounds += 1;
    }

    fn draw_planes(&mut self, _camera: &CameraView) {
        self.log.lock().planes += 1;
    }

    fn draw_anchor_object(&mut self, _model: Mat4, _camera: &CameraView) {
        self.log.lock().anchor_objects += 1;
    }

    fn draw_quality_indicator(
        &mut self,
        _anchor: &Pose,
        _indicator: &QualityIndicator,
        _history: &QualityHistory,
        _camera: &CameraView,
    ) {
        self.log.lock().quality_indicators += 1;
    }

    fn draw_video(&mut self, layer: &LayerDraw, _camera: &CameraView) {
        self.log.lock().videos.push(layer.clone());
    }
}
