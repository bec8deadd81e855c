//! Tests for the overlay player and its frame-available handshake

use std::sync::Arc;
use std::thread;

use anchor_overlay::config::EngineConfig;
use anchor_overlay::error::AnchorError;
use anchor_overlay::records::{Color, VideoParams};
use anchor_overlay::sim::SimDecoderFactory;
use anchor_overlay::video::{OverlayPlayer, PlayerState};
use bevy::math::{Mat4, Vec3};

fn params() -> VideoParams {
    EngineConfig::default().default_video_params()
}

fn background_params() -> VideoParams {
    EngineConfig::default().background_video_params()
}

fn started_player(factory: &SimDecoderFactory) -> OverlayPlayer {
    let player = OverlayPlayer::new("exhibit", factory);
    player
        .play("file:///main.mp4", "file:///background.mp4", params(), background_params())
        .expect("Play failed");
    player
}

#[test]
fn test_frame_notifications_are_pulled_without_starvation() {
    let factory = SimDecoderFactory::new();
    let player = started_player(&factory);
    let main = factory.main_decoder(0).expect("Main decoder");

    // first draw allocates the texture, nothing to show until prepared
    assert!(player.main().prepare_draw(1.8, params()).is_none());
    assert_eq!(main.calls().initialize, 1);
    assert!(main.prepared(640, 480));
    assert_eq!(player.state(), PlayerState::Prepared);

    main.frame_available();
    assert!(player.main().prepare_draw(1.8, params()).is_some());
    assert_eq!(main.calls().update_texture, 1);

    // no new frame, no pull
    player.main().prepare_draw(1.8, params());
    assert_eq!(main.calls().update_texture, 1);

    main.frame_available();
    player.main().prepare_draw(1.8, params());
    assert_eq!(main.calls().update_texture, 2);
}

#[test]
fn test_concurrent_notifications_are_never_lost() {
    let factory = SimDecoderFactory::auto_prepared(640, 480);
    let player = Arc::new(started_player(&factory));
    player.main().prepare_draw(1.8, params());
    let main = factory.main_decoder(0).expect("Main decoder");

    let producer = {
        let main = main.clone();
        thread::spawn(move || {
            for _ in 0..1_000 {
                main.frame_available();
            }
        })
    };
    for _ in 0..1_000 {
        player.main().prepare_draw(1.8, params());
    }
    producer.join().expect("Producer panicked");

    // whatever arrived after the last pull is picked up by the next one
    player.main().prepare_draw(1.8, params());
    assert!(!player.main().frame_available());
    assert!(main.calls().update_texture >= 1);
}

#[test]
fn test_playback_controls_wait_for_prepared() {
    let factory = SimDecoderFactory::new();
    let player = started_player(&factory);
    let main = factory.main_decoder(0).expect("Main decoder");

    player.start_playback();
    player.pause_playback_and_seek_to_start();
    assert_eq!(main.calls().start, 0);
    assert_eq!(main.calls().pause, 0);

    player.main().prepare_draw(1.8, params());
    main.prepared(640, 480);
    player.start_playback();
    player.start_playback();
    assert_eq!(main.calls().start, 1);
    assert!(player.is_playing());

    player.pause_playback_and_seek_to_start();
    assert_eq!(main.calls().pause, 1);
    assert_eq!(main.calls().seek, 1);
    assert_eq!(player.state(), PlayerState::Paused);
}

#[test]
fn test_release_is_idempotent() {
    let factory = SimDecoderFactory::auto_prepared(640, 480);
    let player = started_player(&factory);
    player.prepare_draw(1.8, params());

    assert!(player.release());
    assert!(!player.release());
    for decoder in factory.decoders() {
        assert_eq!(decoder.calls().release, 1);
    }
    assert_eq!(player.state(), PlayerState::Released);
    assert!(player.prepare_draw(1.8, params()).is_empty());
}

#[test]
fn test_bind_failure_leaves_player_stopped() {
    let factory = SimDecoderFactory::failing();
    let player = OverlayPlayer::new("broken", &factory);
    let result = player.play(
        "file:///missing.mp4",
        "file:///background.mp4",
        params(),
        background_params(),
    );

    match result {
        Err(AnchorError::VideoLoadFailed { anchor_id, .. }) => assert_eq!(anchor_id, "broken"),
        other => panic!("Expected VideoLoadFailed, got {:?}", other.err()),
    }
    assert!(!player.main().is_started());
    assert!(player.prepare_draw(1.8, params()).is_empty());
}

#[test]
fn test_draw_snapshot_carries_geometry_and_keying() {
    let factory = SimDecoderFactory::auto_prepared(1920, 1080);
    let player = started_player(&factory);
    let anchor = Mat4::from_translation(Vec3::new(1.0, 0.0, -2.0));
    player.update(anchor, 2.0);

    let layers = player.prepare_draw(1.8, params());
    assert_eq!(layers.len(), 2);

    let (background, main) = (&layers[0], &layers[1]);
    assert!(background.params.is_background);
    assert_eq!(background.params.key_color, Color::BLACK);
    assert_eq!(main.params.key_color, Color::GREEN);
    assert!((main.params.chromakey_threshold - 0.42).abs() < 1e-6);
    assert_eq!(main.model, anchor * Mat4::from_scale(Vec3::splat(2.0)));
    assert!((main.quad[3].x - 0.9).abs() < 1e-5);
    assert!((main.quad[3].y - 1.0125).abs() < 1e-5);
    assert_eq!(main.elapsed_secs, 0.0);
}
