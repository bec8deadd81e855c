//! Proximity-driven video activation
//!
//! Among the resolved anchors that are currently tracked, the nearest one that
//! is on screen or close enough plays its video; every other overlay stays
//! paused at its first frame.

use std::collections::HashMap;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::anchors::{ResolvedAnchor, SharedAnchors};
use crate::config::EngineConfig;
use crate::events::{EventSink, SessionEvent};
use crate::geometry::CameraView;
use crate::records::{AnchorId, AnchorRecord, MediaFetch};

/// Index of the nearest eligible anchor.
///
/// Eligible means tracking, and either visible or within the disappearance
/// radius. Ties keep the first anchor encountered.
pub fn select_nearest(
    anchors: &[ResolvedAnchor],
    camera: &CameraView,
    disappear_distance_sq: f32,
) -> Option<usize> {
    let mut nearest: Option<(usize, f32)> = None;
    for (index, resolved) in anchors.iter().enumerate() {
        if !resolved.anchor.is_tracking() {
            continue;
        }
        let position = resolved.anchor.pose().translation;
        let distance_sq = camera.distance_squared_to(position);
        if !(camera.is_visible(position) || distance_sq < disappear_distance_sq) {
            continue;
        }
        match nearest {
            Some((_, best)) if distance_sq >= best => {}
            _ => nearest = Some((index, distance_sq)),
        }
    }
    nearest.map(|(index, _)| index)
}

struct FetchResult {
    anchor_id: AnchorId,
    uri: Option<String>,
}

/// Tracks the single playing anchor and the lazy video fetches
pub struct ProximityActivation {
    playing: Option<AnchorId>,
    fetch_tx: Sender<FetchResult>,
    fetch_rx: Receiver<FetchResult>,
}

impl Default for ProximityActivation {
    fn default() -> Self {
        Self::new()
    }
}

impl ProximityActivation {
    pub fn new() -> Self {
        let (fetch_tx, fetch_rx) = crossbeam_channel::unbounded();
        Self {
            playing: None,
            fetch_tx,
            fetch_rx,
        }
    }

    pub fn playing(&self) -> Option<&str> {
        self.playing.as_deref()
    }

    /// Switch the playing overlay to `nearest` and keep it running
    pub fn update(
        &mut self,
        nearest: Option<&ResolvedAnchor>,
        anchors: &SharedAnchors,
        records: &HashMap<AnchorId, AnchorRecord>,
        media: &dyn MediaFetch,
        events: &EventSink,
    ) {
        let nearest_id = nearest.map(|r| r.anchor_id());
        if self.playing.as_deref() != nearest_id {
            self.stop_playing(anchors);
            if let Some(resolved) = nearest {
                self.activate(resolved, records, media, events);
            }
        }

        if let Some(resolved) = nearest {
            resolved.player.start_playback();
        }
    }

    fn activate(
        &mut self,
        resolved: &ResolvedAnchor,
        records: &HashMap<AnchorId, AnchorRecord>,
        media: &dyn MediaFetch,
        events: &EventSink,
    ) {
        let anchor_id = resolved.anchor_id().to_string();
        debug!("Nearest anchor is now {}", anchor_id);

        if resolved.player.begin_fetch() {
            match records.get(&anchor_id) {
                Some(record) => {
                    info!("Fetching video for anchor {}", anchor_id);
                    events.emit(SessionEvent::AnchorFound {
                        name: record.name.clone(),
                    });
                    let tx = self.fetch_tx.clone();
                    let fetched_id = anchor_id.clone();
                    media.resolve_video_uri(
                        &record.video_ref,
                        Box::new(move |uri| {
                            let _ = tx.send(FetchResult {
                                anchor_id: fetched_id,
                                uri,
                            });
                        }),
                    );
                }
                None => warn!("No record for resolved anchor {}", anchor_id),
            }
        }
        self.playing = Some(anchor_id);
    }

    /// Pause and rewind whatever is playing
    pub fn stop_playing(&mut self, anchors: &SharedAnchors) {
        if let Some(previous) = self.playing.take() {
            if let Some(player) = anchors.player(&previous) {
                player.pause_playback_and_seek_to_start();
            }
        }
    }

    /// Bind every fetched video location to its player
    pub fn apply_fetch_results(
        &self,
        anchors: &SharedAnchors,
        records: &HashMap<AnchorId, AnchorRecord>,
        config: &EngineConfig,
        events: &EventSink,
    ) {
        for FetchResult { anchor_id, uri } in self.fetch_rx.try_iter() {
            let Some(player) = anchors.player(&anchor_id) else {
                debug!("Dropping video fetch for departed anchor {}", anchor_id);
                continue;
            };
            let record = records.get(&anchor_id);
            let name = record.map_or_else(|| anchor_id.clone(), |r| r.name.clone());

            let Some(uri) = uri else {
                warn!("No video location for anchor {}", anchor_id);
                events.emit(SessionEvent::VideoLoadFailed { name });
                continue;
            };
            let params = record
                .and_then(|r| r.video_params)
                .unwrap_or_else(|| config.default_video_params());
            if let Err(e) = player.play(
                &uri,
                &config.background_video_uri,
                params,
                config.background_video_params(),
            ) {
                warn!("{}", e);
                events.emit(SessionEvent::VideoLoadFailed { name });
            }
        }
    }
}
