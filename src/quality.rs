//! Map-quality estimation and the auto-host trigger
//!
//! While a hosting candidate exists the estimator samples the session's map
//! quality for the current viewpoint, at most once per sample interval and
//! only while the candidate is on screen. Once the running mean of all
//! samples reaches the threshold the candidate is hosted, exactly once.

use std::time::Duration;

use bevy::math::Quat;
use instant::Instant;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::geometry::{CameraView, Pose};
use crate::tracking::PlaneOrientation;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualitySample {
    pub at: Instant,
    pub value: f32,
}

/// Samples for one hosting attempt, in arrival order
#[derive(Debug, Clone, Default)]
pub struct QualityHistory {
    samples: Vec<QualitySample>,
}

impl QualityHistory {
    pub fn push(&mut self, sample: QualitySample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[QualitySample] {
        &self.samples
    }

    /// Arithmetic mean; zero when empty
    pub fn mean(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|s| s.value).sum::<f32>() / self.samples.len() as f32
    }
}

/// Ring-shaped quality indicator drawn around the candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityIndicator {
    pub orientation: PlaneOrientation,
}

impl QualityIndicator {
    pub fn new(orientation: PlaneOrientation) -> Self {
        Self { orientation }
    }

    /// Indicator frame relative to the anchor; a wall gets the ring stood up
    pub fn ui_transform(&self) -> Pose {
        match self.orientation {
            PlaneOrientation::Horizontal => Pose::IDENTITY,
            PlaneOrientation::Vertical => {
                Pose::from_rotation(Quat::from_rotation_x(std::f32::consts::FRAC_PI_2))
            }
        }
    }

    /// Camera position in the indicator frame
    pub fn camera_in_ui_frame(&self, anchor: &Pose, camera: &Pose) -> bevy::math::Vec3 {
        anchor
            .compose(&self.ui_transform())
            .inverse()
            .compose(camera)
            .translation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistanceGuidance {
    TooClose,
    TooFar,
    InRange,
}

impl DistanceGuidance {
    pub fn classify(distance: f32, min: f32, max: f32) -> Self {
        if distance < min {
            DistanceGuidance::TooClose
        } else if distance > max {
            DistanceGuidance::TooFar
        } else {
            DistanceGuidance::InRange
        }
    }
}

/// What one estimator step decided
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityStep {
    /// Guidance, only when it changed since the last step
    pub guidance: Option<DistanceGuidance>,
    /// New sample value, if one was taken
    pub sampled: Option<f32>,
    /// The latch fired on this step; the caller must host now
    pub trigger_host: bool,
}

/// Throttled sampler plus the hosting latch for one candidate
#[derive(Debug, Clone)]
pub struct QualityEstimator {
    history: QualityHistory,
    threshold: f32,
    interval: Duration,
    min_distance: f32,
    max_distance: f32,
    last_sample_at: Option<Instant>,
    last_guidance: Option<DistanceGuidance>,
    latched: bool,
}

impl QualityEstimator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            history: QualityHistory::default(),
            threshold: config.quality_threshold,
            interval: config.quality_sample_interval(),
            min_distance: config.min_guidance_distance,
            max_distance: config.max_guidance_distance,
            last_sample_at: None,
            last_guidance: None,
            latched: false,
        }
    }

    pub fn history(&self) -> &QualityHistory {
        &self.history
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Allow another trigger after a failed host; samples are kept
    pub fn clear_latch(&mut self) {
        self.latched = false;
    }

    /// One tick of estimation.
    ///
    /// `estimate` is only invoked when a sample is due, so the session is not
    /// queried for frames that are throttled or where the candidate is off
    /// screen.
    pub fn step<F>(
        &mut self,
        now: Instant,
        anchor: &Pose,
        indicator: &QualityIndicator,
        camera: &CameraView,
        estimate: F,
    ) -> QualityStep
    where
        F: FnOnce(&Pose) -> f32,
    {
        let mut step = QualityStep {
            guidance: None,
            sampled: None,
            trigger_host: false,
        };
        if self.latched {
            return step;
        }

        let in_ui_frame = indicator.camera_in_ui_frame(anchor, &camera.pose);
        let distance = in_ui_frame.x.hypot(in_ui_frame.z);
        let guidance = DistanceGuidance::classify(distance, self.min_distance, self.max_distance);
        if self.last_guidance != Some(guidance) {
            self.last_guidance = Some(guidance);
            step.guidance = Some(guidance);
        }

        let due = self
            .last_sample_at
            .is_none_or(|last| now.saturating_duration_since(last) > self.interval);
        if !due || !camera.is_visible(anchor.translation) {
            return step;
        }

        self.last_sample_at = Some(now);
        let value = estimate(&camera.pose);
        self.history.push(QualitySample { at: now, value });
        step.sampled = Some(value);

        let mean = self.history.mean();
        debug!(
            "Map quality sample {:.3}, mean {:.3} over {} samples",
            value,
            mean,
            self.history.len()
        );
        if mean >= self.threshold {
            info!("Map quality reached {:.3}, hosting candidate", mean);
            self.latched = true;
            step.trigger_host = true;
        }
        step
    }
}
