//! Anchor metadata and the collaborators that own it
//!
//! Records are loaded once per session and treated as read-only by the
//! engine. The JSON document layout used by [`JsonFileRepository`] mirrors
//! the binding documents kept by the editing tools: snake_case keys, the
//! location flattened into `latitude`/`longitude` and chroma-key parameters
//! packed as `[red, green, blue, threshold]`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AnchorError, AnchorResult};

pub type AnchorId = String;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
}

impl Color {
    pub const GREEN: Color = Color {
        red: 0.0,
        green: 1.0,
        blue: 0.0,
    };
    pub const BLACK: Color = Color {
        red: 0.0,
        green: 0.0,
        blue: 0.0,
    };

    pub fn new(red: f32, green: f32, blue: f32) -> Self {
        Self { red, green, blue }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
}

/// Chroma-key parameters for one video layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoParams {
    pub key_color: Color,
    pub chromakey_threshold: f32,
    pub is_background: bool,
}

impl VideoParams {
    pub fn new(key_color: Color, chromakey_threshold: f32, is_background: bool) -> Self {
        Self {
            key_color,
            chromakey_threshold,
            is_background,
        }
    }
}

/// Persisted metadata for one hosted anchor
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorRecord {
    pub anchor_id: AnchorId,
    pub name: String,
    pub description: Option<String>,
    pub image_ref: Option<String>,
    pub video_ref: String,
    pub enabled: bool,
    pub scaling_factor: f32,
    pub geo_position: Option<GeoPosition>,
    pub video_params: Option<VideoParams>,
}

impl AnchorRecord {
    /// Record written right after a successful host; the editing UI fills in
    /// the rest.
    pub fn hosted(anchor_id: impl Into<AnchorId>, geo_position: Option<GeoPosition>) -> Self {
        let anchor_id = anchor_id.into();
        Self {
            name: anchor_id.clone(),
            anchor_id,
            description: None,
            image_ref: None,
            video_ref: String::new(),
            enabled: false,
            scaling_factor: 1.0,
            geo_position,
            video_params: None,
        }
    }

    /// Only enabled records with a video are worth resolving
    pub fn is_playable(&self) -> bool {
        self.enabled && !self.video_ref.is_empty()
    }
}

/// Keeps playable records, keyed by anchor id, in load order
pub fn playable_records(records: Vec<AnchorRecord>) -> (Vec<AnchorId>, HashMap<AnchorId, AnchorRecord>) {
    let mut order = Vec::new();
    let mut by_id = HashMap::new();
    for record in records.into_iter().filter(AnchorRecord::is_playable) {
        if by_id.contains_key(&record.anchor_id) {
            warn!("Duplicate anchor record {}, keeping the first", record.anchor_id);
            continue;
        }
        order.push(record.anchor_id.clone());
        by_id.insert(record.anchor_id.clone(), record);
    }
    (order, by_id)
}

/// Store of anchor records, constructed per session
pub trait AnchorRepository: Send {
    fn load(&mut self) -> AnchorResult<Vec<AnchorRecord>>;
    fn save(&mut self, record: AnchorRecord) -> AnchorResult<()>;
    fn remove(&mut self, anchor_id: &str) -> AnchorResult<()>;
}

/// Completion for a video location lookup
pub type VideoUriCallback = Box<dyn FnOnce(Option<String>) + Send>;

/// Maps a stored video reference to a playable location
///
/// Implementations may complete on any thread, including synchronously.
pub trait MediaFetch: Send + Sync {
    fn resolve_video_uri(&self, video_ref: &str, done: VideoUriCallback);
}

pub trait Geolocation: Send {
    fn last_known_location(&self) -> Option<GeoPosition>;
}

/// On-disk shape of a record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordDocument {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    image_name: Option<String>,
    #[serde(default)]
    video_name: String,
    #[serde(default)]
    enabled: bool,
    scaling_factor: f32,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    video_params: Option<[f32; 4]>,
}

impl From<RecordDocument> for AnchorRecord {
    fn from(doc: RecordDocument) -> Self {
        let geo_position = match (doc.latitude, doc.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPosition {
                latitude,
                longitude,
            }),
            _ => None,
        };
        let video_params = doc.video_params.map(|[red, green, blue, threshold]| {
            VideoParams::new(Color::new(red, green, blue), threshold, false)
        });
        Self {
            anchor_id: doc.id,
            name: doc.name,
            description: doc.description,
            image_ref: doc.image_name,
            video_ref: doc.video_name,
            enabled: doc.enabled,
            scaling_factor: doc.scaling_factor,
            geo_position,
            video_params,
        }
    }
}

impl From<&AnchorRecord> for RecordDocument {
    fn from(record: &AnchorRecord) -> Self {
        Self {
            id: record.anchor_id.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            image_name: record.image_ref.clone(),
            video_name: record.video_ref.clone(),
            enabled: record.enabled,
            scaling_factor: record.scaling_factor,
            latitude: record.geo_position.map(|g| g.latitude),
            longitude: record.geo_position.map(|g| g.longitude),
            video_params: record.video_params.map(|p| {
                [
                    p.key_color.red,
                    p.key_color.green,
                    p.key_color.blue,
                    p.chromakey_threshold,
                ]
            }),
        }
    }
}

/// Repository backed by a single JSON array on disk
///
/// Writes go to a temporary sibling file first and are renamed into place.
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_documents(&self) -> AnchorResult<Vec<RecordDocument>> {
        if !self.path.exists() {
            debug!("No anchor document at {:?}, starting empty", self.path);
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_documents(&self, documents: &[RecordDocument]) -> AnchorResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let serialized = serde_json::to_string_pretty(documents)?;
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, serialized)?;
        fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            AnchorError::from(e)
        })
    }
}

impl AnchorRepository for JsonFileRepository {
    fn load(&mut self) -> AnchorResult<Vec<AnchorRecord>> {
        let records: Vec<AnchorRecord> = self
            .read_documents()?
            .into_iter()
            .map(AnchorRecord::from)
            .collect();
        info!("Loaded {} anchor record(s) from {:?}", records.len(), self.path);
        Ok(records)
    }

    fn save(&mut self, record: AnchorRecord) -> AnchorResult<()> {
        let mut documents = self.read_documents()?;
        let document = RecordDocument::from(&record);
        match documents.iter_mut().find(|d| d.id == record.anchor_id) {
            Some(existing) => *existing = document,
            None => documents.push(document),
        }
        self.write_documents(&documents)?;
        debug!("Saved anchor record {}", record.anchor_id);
        Ok(())
    }

    fn remove(&mut self, anchor_id: &str) -> AnchorResult<()> {
        let mut documents = self.read_documents()?;
        let before = documents.len();
        documents.retain(|d| d.id != anchor_id);
        if documents.len() == before {
            return Ok(());
        }
        self.write_documents(&documents)?;
        debug!("Removed anchor record {}", anchor_id);
        Ok(())
    }
}
