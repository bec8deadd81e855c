//! Anchor Overlay Library
//!
//! Lifecycle engine for camera-tracked spatial anchors: placing and hosting a
//! new anchor once the map around it is good enough, resolving previously
//! hosted anchors, and playing a keyed video overlay on whichever resolved
//! anchor is nearest to the viewer.

pub mod anchors;
pub mod cloud;
pub mod config;
pub mod error;
pub mod events;
pub mod geometry;
pub mod plugin;
pub mod proximity;
pub mod quality;
pub mod records;
pub mod session;
#[cfg(feature = "sim")]
pub mod sim;
pub mod tap;
pub mod tracking;
pub mod video;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::{AnchorError, AnchorResult};
pub use events::SessionEvent;
pub use geometry::Pose;
pub use plugin::{AnchorOverlayEvent, AnchorOverlayPlugin};
pub use records::{AnchorRecord, JsonFileRepository};
pub use session::{AnchorSession, Collaborators, SessionMode, TickOutcome};
