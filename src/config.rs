//! Engine configuration
//!
//! Every threshold the engine uses lives here. The struct is built once,
//! validated, and handed to the session by value; nothing mutates it after
//! construction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::records::{Color, VideoParams};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Mean map quality that triggers automatic hosting
    pub quality_threshold: f32,
    /// Minimum wall-clock gap between quality samples, in milliseconds
    pub quality_sample_interval_ms: u64,
    /// Squared distance under which an anchor stays eligible off screen
    pub disappear_distance_sq: f32,
    /// Guidance bounds for the hosting viewpoint, in distance units
    pub min_guidance_distance: f32,
    pub max_guidance_distance: f32,
    /// Upper bound on concurrently running resolve requests
    pub max_in_flight_resolves: usize,
    pub near_clip: f32,
    pub far_clip: f32,
    /// Size of the video quad along its longer edge before anchor scaling
    pub quad_scale: f32,
    pub default_key_color: Color,
    pub default_chromakey_threshold: f32,
    /// Location of the looping backdrop layered behind every overlay
    pub background_video_uri: String,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quality_threshold: 0.6,
            quality_sample_interval_ms: 500,
            disappear_distance_sq: 55.0,
            min_guidance_distance: 0.2,
            max_guidance_distance: 10.0,
            max_in_flight_resolves: 40,
            near_clip: 0.1,
            far_clip: 100.0,
            quad_scale: 1.8,
            default_key_color: Color::GREEN,
            default_chromakey_threshold: 0.42,
            background_video_uri: "asset://raw/background".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: EngineConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        config.validate()?;
        info!("Loaded engine configuration from {:?}", path);
        Ok(config)
    }

    /// Config at the default location, or defaults when there is none
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("anchor-overlay").join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            anyhow::bail!("Quality threshold out of range: {}", self.quality_threshold);
        }
        if self.disappear_distance_sq < 0.0 {
            anyhow::bail!(
                "Disappearance radius must not be negative: {}",
                self.disappear_distance_sq
            );
        }
        if self.min_guidance_distance >= self.max_guidance_distance {
            anyhow::bail!(
                "Guidance bounds are inverted: {} >= {}",
                self.min_guidance_distance,
                self.max_guidance_distance
            );
        }
        if self.max_in_flight_resolves == 0 {
            anyhow::bail!("At least one resolve must be allowed in flight");
        }
        if self.near_clip <= 0.0 || self.far_clip <= self.near_clip {
            anyhow::bail!("Invalid clip planes: near {} far {}", self.near_clip, self.far_clip);
        }
        if self.quad_scale <= 0.0 {
            anyhow::bail!("Quad scale must be positive: {}", self.quad_scale);
        }
        if !(0.0..=1.0).contains(&self.default_chromakey_threshold) {
            anyhow::bail!(
                "Chroma-key threshold out of range: {}",
                self.default_chromakey_threshold
            );
        }
        Ok(())
    }

    pub fn quality_sample_interval(&self) -> Duration {
        Duration::from_millis(self.quality_sample_interval_ms)
    }

    /// Parameters for records that carry none
    pub fn default_video_params(&self) -> VideoParams {
        VideoParams::new(
            self.default_key_color,
            self.default_chromakey_threshold,
            false,
        )
    }

    /// The backdrop layer is keyed on black
    pub fn background_video_params(&self) -> VideoParams {
        VideoParams::new(Color::BLACK, self.default_chromakey_threshold, true)
    }
}
