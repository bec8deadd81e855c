//! Video overlay player
//!
//! Each resolved anchor owns one [`OverlayPlayer`]: a keyed main video layered
//! over a looping backdrop. A layer is driven from two sides:
//!
//! - the decoder thread reports `prepared` / `frame available` through a
//!   [`FrameListener`],
//! - the render tick pulls the newest texture and draws.
//!
//! Both sides meet only inside the layer's own lock, and no lock is held while
//! calling into the decoder.

use std::sync::Arc;

use bevy::math::{Mat4, Vec2, Vec3};
use instant::Instant;
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::error::{AnchorError, AnchorResult};
use crate::records::VideoParams;

pub type TextureId = u32;

/// Quad texture coordinates before the decoder's transform is applied
const QUAD_TEX_COORDS: [Vec2; 4] = [
    Vec2::new(0.0, 0.0),
    Vec2::new(0.0, 1.0),
    Vec2::new(1.0, 0.0),
    Vec2::new(1.0, 1.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerState {
    Uninitialized,
    /// Texture allocated, decoder preparing
    Initialized,
    /// Decoder ready and dimensions known
    Prepared,
    Playing,
    Paused,
    Released,
}

impl PlayerState {
    fn is_prepared(self) -> bool {
        matches!(
            self,
            PlayerState::Prepared | PlayerState::Playing | PlayerState::Paused
        )
    }
}

/// Decode/texture primitive provided by the platform
pub trait VideoDecoder: Send {
    /// Allocate the output texture and register `listener` for callbacks
    fn initialize(&mut self, listener: FrameListener) -> AnchorResult<TextureId>;
    fn reset(&mut self);
    fn set_source(&mut self, uri: &str) -> AnchorResult<()>;
    fn set_looping(&mut self, looping: bool);
    /// Begin preparing; completion arrives through `FrameListener::on_prepared`
    fn prepare_async(&mut self);
    fn start(&mut self);
    fn pause(&mut self);
    fn seek_to_start(&mut self);
    fn stop(&mut self);
    fn release(&mut self);
    /// Latch the newest decoded frame into the texture and return the
    /// texture-coordinate transform for it
    fn update_texture(&mut self) -> Mat4;
}

pub trait DecoderFactory: Send + Sync {
    fn create(&self) -> Box<dyn VideoDecoder>;
}

#[derive(Debug)]
struct LayerSync {
    state: PlayerState,
    started: bool,
    done: bool,
    frame_available: bool,
    is_fetching: bool,
    has_loaded: bool,
    start_time: Option<Instant>,
    video_size: Vec2,
}

impl Default for LayerSync {
    fn default() -> Self {
        Self {
            state: PlayerState::Uninitialized,
            started: false,
            done: false,
            frame_available: false,
            is_fetching: false,
            has_loaded: false,
            start_time: None,
            video_size: Vec2::ZERO,
        }
    }
}

/// Decoder-side handle to a layer; cheap to clone and safe to move to the
/// decoder's callback thread.
#[derive(Clone)]
pub struct FrameListener {
    sync: Arc<Mutex<LayerSync>>,
}

impl FrameListener {
    pub fn on_prepared(&self, width: u32, height: u32) {
        let mut sync = self.sync.lock();
        if sync.state == PlayerState::Initialized {
            sync.state = PlayerState::Prepared;
        }
        sync.video_size = Vec2::new(width as f32, height as f32);
    }

    pub fn on_frame_available(&self) {
        let mut sync = self.sync.lock();
        sync.frame_available = true;
        if !sync.has_loaded {
            sync.has_loaded = true;
            sync.start_time = Some(Instant::now());
        }
    }

    pub fn on_error(&self) {
        self.sync.lock().done = true;
    }

    pub fn on_completion(&self) {
        self.sync.lock().done = true;
    }
}

/// Render-thread-only layer data
#[derive(Debug, Clone)]
struct LayerRender {
    texture_id: TextureId,
    model: Mat4,
    tex_coords: [Vec2; 4],
    params: Option<VideoParams>,
}

impl Default for LayerRender {
    fn default() -> Self {
        Self {
            texture_id: 0,
            model: Mat4::IDENTITY,
            tex_coords: QUAD_TEX_COORDS,
            params: None,
        }
    }
}

/// Everything a renderer needs to draw one layer this frame
#[derive(Debug, Clone)]
pub struct LayerDraw {
    pub texture_id: TextureId,
    pub model: Mat4,
    pub quad: [Vec3; 4],
    pub tex_coords: [Vec2; 4],
    pub params: VideoParams,
    /// Seconds since the first decoded frame, for time-based effects
    pub elapsed_secs: f32,
}

/// One decoder plus its texture
pub struct VideoLayer {
    sync: Arc<Mutex<LayerSync>>,
    decoder: Mutex<Box<dyn VideoDecoder>>,
    render: Mutex<LayerRender>,
}

impl VideoLayer {
    pub fn new(decoder: Box<dyn VideoDecoder>) -> Self {
        Self {
            sync: Arc::new(Mutex::new(LayerSync::default())),
            decoder: Mutex::new(decoder),
            render: Mutex::new(LayerRender::default()),
        }
    }

    pub fn listener(&self) -> FrameListener {
        FrameListener {
            sync: Arc::clone(&self.sync),
        }
    }

    pub fn state(&self) -> PlayerState {
        self.sync.lock().state
    }

    pub fn is_started(&self) -> bool {
        self.sync.lock().started
    }

    pub fn frame_available(&self) -> bool {
        self.sync.lock().frame_available
    }

    /// Bind a source and mark the layer started
    pub fn play(&self, uri: &str, params: VideoParams) -> AnchorResult<()> {
        let previous = self.state();
        if previous == PlayerState::Released {
            return Err(AnchorError::VideoLoadFailed {
                anchor_id: String::new(),
                reason: "player already released".to_string(),
            });
        }

        self.render.lock().params = Some(params);
        {
            let mut decoder = self.decoder.lock();
            decoder.reset();
            if let Err(e) = decoder.set_source(uri) {
                error!("Failed to bind video source {}: {}", uri, e);
                return Err(AnchorError::VideoLoadFailed {
                    anchor_id: String::new(),
                    reason: e.to_string(),
                });
            }
            decoder.set_looping(true);
        }

        let rebind = {
            let mut sync = self.sync.lock();
            sync.started = true;
            sync.has_loaded = false;
            sync.done = false;
            let rebind = sync.state != PlayerState::Uninitialized;
            if rebind {
                sync.state = PlayerState::Initialized;
            }
            rebind
        };
        // a layer that already owns a texture has to prepare the new source
        // itself; fresh layers prepare on first draw
        if rebind {
            self.decoder.lock().prepare_async();
        }
        Ok(())
    }

    fn ensure_initialized(&self) {
        {
            let sync = self.sync.lock();
            if !sync.started || sync.state != PlayerState::Uninitialized {
                return;
            }
        }
        let listener = self.listener();
        let result = self.decoder.lock().initialize(listener);
        match result {
            Ok(texture_id) => {
                // model was already set by this tick's update
                self.render.lock().texture_id = texture_id;
                {
                    let mut sync = self.sync.lock();
                    if sync.state == PlayerState::Uninitialized {
                        sync.state = PlayerState::Initialized;
                    }
                }
                self.decoder.lock().prepare_async();
            }
            Err(e) => {
                error!("Failed to initialize video layer: {}", e);
                self.sync.lock().done = true;
            }
        }
    }

    /// Pause and rewind; only valid once prepared
    pub fn pause_playback_and_seek_to_start(&self) {
        {
            let mut sync = self.sync.lock();
            if !sync.state.is_prepared() {
                return;
            }
            sync.state = PlayerState::Paused;
        }
        let mut decoder = self.decoder.lock();
        decoder.pause();
        decoder.seek_to_start();
    }

    /// Start or resume playback; a silent no-op before the decoder is prepared
    pub fn start_playback(&self) {
        {
            let mut sync = self.sync.lock();
            match sync.state {
                PlayerState::Prepared | PlayerState::Paused => sync.state = PlayerState::Playing,
                _ => return,
            }
        }
        self.decoder.lock().start();
    }

    pub fn update(&self, anchor_matrix: Mat4, scale_factor: f32) {
        self.render.lock().model = anchor_matrix * Mat4::from_scale(Vec3::splat(scale_factor));
    }

    pub fn model_matrix(&self) -> Mat4 {
        self.render.lock().model
    }

    /// Stop and free the decoder; later calls do nothing
    pub fn release(&self) -> bool {
        {
            let mut sync = self.sync.lock();
            if sync.state == PlayerState::Released {
                return false;
            }
            sync.state = PlayerState::Released;
            sync.frame_available = false;
        }
        let mut decoder = self.decoder.lock();
        decoder.stop();
        decoder.release();
        true
    }

    /// Render-side consume: pulls a new texture if the decoder produced one
    /// and returns the draw snapshot, or `None` when there is nothing to draw.
    pub fn prepare_draw(&self, quad_scale: f32, fallback: VideoParams) -> Option<LayerDraw> {
        self.ensure_initialized();

        let (consume, video_size, start_time) = {
            let mut sync = self.sync.lock();
            if !sync.started || sync.done || !sync.state.is_prepared() {
                return None;
            }
            let consume = sync.frame_available;
            sync.frame_available = false;
            (consume, sync.video_size, sync.start_time)
        };

        // a notification landing after the clear re-arms the flag, so the
        // next tick pulls again and nothing is lost
        if consume {
            let transform = self.decoder.lock().update_texture();
            self.render.lock().tex_coords = transform_tex_coords(&transform);
        }

        let render = self.render.lock();
        Some(LayerDraw {
            texture_id: render.texture_id,
            model: render.model,
            quad: quad_vertices(video_size, quad_scale),
            tex_coords: render.tex_coords,
            params: render.params.unwrap_or(fallback),
            elapsed_secs: start_time
                .map(|t| t.elapsed().as_secs_f32())
                .unwrap_or(0.0),
        })
    }

    fn mark_fetching(&self) -> bool {
        let mut sync = self.sync.lock();
        if sync.is_fetching {
            return false;
        }
        sync.is_fetching = true;
        true
    }

    fn is_fetching(&self) -> bool {
        self.sync.lock().is_fetching
    }
}

/// Quad sized by the video aspect ratio, standing on its bottom edge
pub fn quad_vertices(video_size: Vec2, quad_scale: f32) -> [Vec3; 4] {
    let longest = video_size.x.max(video_size.y);
    if longest <= 0.0 {
        return [Vec3::ZERO; 4];
    }
    let width = video_size.x / longest * quad_scale;
    let height = video_size.y / longest * quad_scale;
    [
        Vec3::new(-width / 2.0, 0.0, 0.0),
        Vec3::new(-width / 2.0, height, 0.0),
        Vec3::new(width / 2.0, 0.0, 0.0),
        Vec3::new(width / 2.0, height, 0.0),
    ]
}

pub fn transform_tex_coords(transform: &Mat4) -> [Vec2; 4] {
    QUAD_TEX_COORDS.map(|uv| transform.transform_point3(uv.extend(0.0)).truncate())
}

/// Keyed main video over a looping backdrop
pub struct OverlayPlayer {
    anchor_id: String,
    main: VideoLayer,
    background: VideoLayer,
}

impl OverlayPlayer {
    pub fn new(anchor_id: impl Into<String>, factory: &dyn DecoderFactory) -> Self {
        Self {
            anchor_id: anchor_id.into(),
            main: VideoLayer::new(factory.create()),
            background: VideoLayer::new(factory.create()),
        }
    }

    pub fn anchor_id(&self) -> &str {
        &self.anchor_id
    }

    pub fn main(&self) -> &VideoLayer {
        &self.main
    }

    pub fn background(&self) -> &VideoLayer {
        &self.background
    }

    pub fn state(&self) -> PlayerState {
        self.main.state()
    }

    pub fn is_playing(&self) -> bool {
        self.main.state() == PlayerState::Playing
    }

    /// Claim the one-shot video fetch for this anchor
    pub fn begin_fetch(&self) -> bool {
        self.main.mark_fetching()
    }

    pub fn is_fetching(&self) -> bool {
        self.main.is_fetching()
    }

    pub fn play(
        &self,
        main_uri: &str,
        background_uri: &str,
        main_params: VideoParams,
        background_params: VideoParams,
    ) -> AnchorResult<()> {
        if let Err(e) = self.background.play(background_uri, background_params) {
            warn!("Backdrop for anchor {} failed to load: {}", self.anchor_id, e);
        }
        self.main
            .play(main_uri, main_params)
            .map_err(|e| AnchorError::VideoLoadFailed {
                anchor_id: self.anchor_id.clone(),
                reason: match e {
                    AnchorError::VideoLoadFailed { reason, .. } => reason,
                    other => other.to_string(),
                },
            })
    }

    pub fn pause_playback_and_seek_to_start(&self) {
        debug!("Pausing overlay for anchor {}", self.anchor_id);
        self.background.pause_playback_and_seek_to_start();
        self.main.pause_playback_and_seek_to_start();
    }

    pub fn start_playback(&self) {
        self.background.start_playback();
        self.main.start_playback();
    }

    pub fn update(&self, anchor_matrix: Mat4, scale_factor: f32) {
        self.background.update(anchor_matrix, scale_factor);
        self.main.update(anchor_matrix, scale_factor);
    }

    /// Draw snapshots, backdrop first
    pub fn prepare_draw(&self, quad_scale: f32, fallback: VideoParams) -> Vec<LayerDraw> {
        [&self.background, &self.main]
            .into_iter()
            .filter_map(|layer| layer.prepare_draw(quad_scale, fallback))
            .collect()
    }

    /// Idempotent; returns whether this call freed anything
    pub fn release(&self) -> bool {
        let background = self.background.release();
        let main = self.main.release();
        if background || main {
            debug!("Released overlay player for anchor {}", self.anchor_id);
        }
        background || main
    }
}
