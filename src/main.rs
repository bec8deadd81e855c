use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bevy::prelude::*;
use tracing::info;

use anchor_overlay::geometry::Pose;
use anchor_overlay::records::{AnchorRecord, GeoPosition};
use anchor_overlay::sim::{
    FixedLocation, InstantMediaFetch, ManualCloud, MemoryRepository, RecordingRenderer,
    SimDecoderFactory, SimWorld,
};
use anchor_overlay::{
    AnchorOverlayEvent, AnchorOverlayPlugin, AnchorSession, Collaborators, EngineConfig,
    SessionMode,
};

const DEMO_FRAMES: usize = 120;
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

fn demo_record(anchor_id: &str, video_ref: &str) -> AnchorRecord {
    AnchorRecord {
        video_ref: video_ref.to_string(),
        enabled: true,
        ..AnchorRecord::hosted(
            anchor_id,
            Some(GeoPosition {
                latitude: 59.9343,
                longitude: 30.3351,
            }),
        )
    }
}

fn log_session_events(mut events: EventReader<AnchorOverlayEvent>) {
    for AnchorOverlayEvent(event) in events.read() {
        info!("📣 {:?}", event);
    }
}

fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(&PathBuf::from(path))?,
        None => EngineConfig::load_or_default()?,
    };

    let level: tracing::Level = config
        .log_level
        .parse()
        .map_err(|_| anyhow::anyhow!("Unknown log level: {}", config.log_level))?;
    tracing_subscriber::fmt().with_max_level(level).init();

    info!("🚀 Starting anchor overlay demo");

    // Two anchors in front of the viewer; the nearer one should start playing
    let world = SimWorld::new();
    world.look_at(Vec3::new(0.0, 1.6, 0.0), Vec3::new(0.0, 1.0, -4.0));
    let cloud = ManualCloud::new();
    let media = InstantMediaFetch::new()
        .with_location("hall.mp4", "file:///media/hall.mp4")
        .with_location("stairs.mp4", "file:///media/stairs.mp4");
    let repository = MemoryRepository::new(vec![
        demo_record("hall", "hall.mp4"),
        demo_record("stairs", "stairs.mp4"),
    ]);

    let session = AnchorSession::new(
        SessionMode::Resolving,
        config,
        Collaborators {
            tracking: Some(Box::new(world.session())),
            cloud: cloud.service(),
            repository: Box::new(repository),
            media: Arc::new(media),
            geolocation: Box::new(FixedLocation(None)),
            decoders: Arc::new(SimDecoderFactory::auto_prepared(1920, 1080)),
            renderer: Box::new(RecordingRenderer::new()),
        },
    );

    let mut app = App::new();
    app.add_plugins(AnchorOverlayPlugin::new(session))
        .add_systems(Update, log_session_events);

    for frame in 0..DEMO_FRAMES {
        if frame == 10 {
            cloud.complete_resolve("hall", Pose::from_translation(Vec3::new(0.0, 1.0, -4.0)));
            cloud.complete_resolve("stairs", Pose::from_translation(Vec3::new(3.0, 1.0, -9.0)));
        }
        app.update();
        std::thread::sleep(FRAME_INTERVAL);
    }

    if let Some(mut session) = app.world_mut().remove_non_send_resource::<AnchorSession>() {
        session.teardown();
    }
    info!("✅ Demo finished");
    Ok(())
}
