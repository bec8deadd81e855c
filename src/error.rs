use thiserror::Error;

use crate::cloud::CloudAnchorState;

/// Error taxonomy for the anchor lifecycle engine
///
/// Transient variants are absorbed by the frame loop; per-anchor variants are
/// isolated to the anchor they name and never abort the session.
#[derive(Debug, Error)]
pub enum AnchorError {
    /// No tracking session could be created or it is not running
    #[error("Tracking session unavailable: {0}")]
    SessionUnavailable(String),

    /// Camera tracking is paused, 3D content is skipped for this frame
    #[error("Camera tracking paused")]
    TrackingPaused,

    /// A tap produced no hit on a tracked plane polygon
    #[error("Hit test found no plane within its polygon")]
    HitTestNoMatch,

    /// Resolving a cloud anchor failed, the id is abandoned for the session
    #[error("Failed to resolve anchor {anchor_id}: {state:?}")]
    ResolveFailed {
        anchor_id: String,
        state: CloudAnchorState,
    },

    /// Hosting the candidate failed, it stays re-hostable
    #[error("Failed to host anchor: {state:?}")]
    HostFailed { state: CloudAnchorState },

    /// A host operation is already pending
    #[error("A host operation is already in flight")]
    HostInFlight,

    /// The video for an anchor could not be bound or fetched
    #[error("Failed to load video for anchor {anchor_id}: {reason}")]
    VideoLoadFailed { anchor_id: String, reason: String },

    /// Anything else raised while rendering a frame
    #[error("Unexpected render error: {0}")]
    UnexpectedRender(String),

    /// Anchor metadata repository failure
    #[error("Anchor repository error: {0}")]
    Repository(String),

    /// Invalid engine configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl AnchorError {
    /// Transient conditions only cost a skipped frame
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AnchorError::SessionUnavailable(_)
                | AnchorError::TrackingPaused
                | AnchorError::HitTestNoMatch
        )
    }
}

impl From<std::io::Error> for AnchorError {
    fn from(err: std::io::Error) -> Self {
        AnchorError::Repository(err.to_string())
    }
}

impl From<serde_json::Error> for AnchorError {
    fn from(err: serde_json::Error) -> Self {
        AnchorError::Repository(format!("Malformed anchor document: {}", err))
    }
}

/// Result type for anchor engine operations
pub type AnchorResult<T> = Result<T, AnchorError>;
