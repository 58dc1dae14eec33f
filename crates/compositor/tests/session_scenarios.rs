use std::sync::atomic::{AtomicUsize, Ordering};

use pipcast_common::clock::FrameCadence;
use pipcast_common::error::{PipcastError, PipcastResult};
use pipcast_compositor::{
    compose_streams, AudioTrack, ChannelSource, ComposeOptions, CompositionMode, DrawingSurface,
    FrameLedger, FrameSource, RasterSurfaceProvider, ScriptEnd, ScriptedSource, SessionState,
    SurfaceProvider, SyntheticSource, Termination, VideoFrame,
};
use pipcast_overlay_model::options::{CompositionConfig, OverlayPosition};
use tokio::sync::mpsc;

const SCREEN: [u8; 4] = [10, 20, 30, 255];
const SCREEN_LATER: [u8; 4] = [40, 50, 60, 255];
const CAMERA: [u8; 4] = [200, 100, 0, 255];

/// Surface provider that counts acquisitions.
#[derive(Default)]
struct CountingProvider {
    acquired: AtomicUsize,
}

impl SurfaceProvider for CountingProvider {
    fn acquire(&self) -> PipcastResult<DrawingSurface> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        RasterSurfaceProvider::new().acquire()
    }
}

struct FailingProvider;

impl SurfaceProvider for FailingProvider {
    fn acquire(&self) -> PipcastResult<DrawingSurface> {
        Err(PipcastError::setup("no 2D drawing context"))
    }
}

fn options(config: CompositionConfig) -> ComposeOptions {
    ComposeOptions::new(config)
}

fn boxed(source: impl FrameSource + 'static) -> Option<Box<dyn FrameSource>> {
    Some(Box::new(source))
}

async fn drain(video: &mut mpsc::Receiver<VideoFrame>) -> Vec<VideoFrame> {
    let mut frames = Vec::new();
    while let Some(frame) = video.recv().await {
        frames.push(frame);
    }
    frames
}

#[tokio::test]
async fn static_background_is_repeated_under_every_pacing_frame() {
    let ledger = FrameLedger::new();
    let camera = ScriptedSource::new("camera")
        .push(VideoFrame::solid(32, 18, 0, CAMERA).tracked(&ledger))
        .push(VideoFrame::solid(32, 18, 33_000, CAMERA).tracked(&ledger))
        .push(VideoFrame::solid(32, 18, 66_000, CAMERA).tracked(&ledger));
    let screen = ScriptedSource::new("screen")
        .push(VideoFrame::solid(1920, 1080, 0, SCREEN).tracked(&ledger))
        .then(ScriptEnd::Idle);

    let config =
        CompositionConfig::from_strings("bottom-right", "M", "L", "16:9").unwrap();
    let surfaces = CountingProvider::default();
    let mut stream = compose_streams(
        boxed(camera),
        boxed(screen),
        None,
        &options(config),
        &surfaces,
    )
    .unwrap();
    assert_eq!(stream.mode, CompositionMode::Dual);
    assert_eq!(surfaces.acquired.load(Ordering::SeqCst), 1);

    let frames = drain(&mut stream.video).await;
    let stats = stream.session.join().await.unwrap();

    let stamps: Vec<i64> = frames.iter().map(|f| f.timestamp_us()).collect();
    assert_eq!(stamps, vec![0, 33_000, 66_000]);

    // M at 1920 wide is 288x162 with a 10px margin: left 1622, top 908.
    for frame in &frames {
        assert_eq!(frame.dimensions(), (1920, 1080));
        assert_eq!(frame.pixel(0, 0), Some(SCREEN));
        assert_eq!(frame.pixel(1621, 989), Some(SCREEN));
        assert_eq!(frame.pixel(1622 + 144, 908 + 81), Some(CAMERA));
        assert_eq!(frame.pixel(1622 + 144, 908), Some(CAMERA));
        assert_eq!(frame.pixel(1622 + 144, 1070), Some(SCREEN));
        // Rounded corner.
        assert_eq!(frame.pixel(1622, 908), Some(SCREEN));
    }

    assert_eq!(stats.frames_emitted, 3);
    assert_eq!(stats.background_frames_received, 1);
    assert_eq!(stats.background_repeats, 2);
    assert_eq!(stats.termination, Some(Termination::PacingEnded));
    assert!(!stats.background_exhausted);
    assert!(ledger.report().is_balanced(), "{:?}", ledger.report());
}

#[tokio::test]
async fn exhausted_background_keeps_last_frame() {
    let ledger = FrameLedger::new();
    let mut camera = ScriptedSource::new("camera");
    for i in 0..4 {
        camera = camera.push(VideoFrame::solid(16, 16, i * 33_333, CAMERA).tracked(&ledger));
    }
    let screen = ScriptedSource::new("screen")
        .push(VideoFrame::solid(320, 180, 0, SCREEN).tracked(&ledger))
        .push(VideoFrame::solid(320, 180, 40_000, SCREEN_LATER).tracked(&ledger))
        .then(ScriptEnd::End);

    let mut stream = compose_streams(
        boxed(camera),
        boxed(screen),
        None,
        &ComposeOptions::default(),
        &RasterSurfaceProvider::new(),
    )
    .unwrap();

    let frames = drain(&mut stream.video).await;
    let stats = stream.session.join().await.unwrap();

    let backgrounds: Vec<_> = frames.iter().map(|f| f.pixel(0, 0)).collect();
    assert_eq!(
        backgrounds,
        vec![Some(SCREEN), Some(SCREEN), Some(SCREEN_LATER), Some(SCREEN_LATER)]
    );
    assert!(stats.background_exhausted);
    assert_eq!(stats.background_frames_received, 2);
    assert_eq!(stats.background_frames_skipped, 0);
    assert_eq!(stats.termination, Some(Termination::PacingEnded));
    assert!(ledger.report().is_balanced(), "{:?}", ledger.report());
}

#[tokio::test]
async fn queued_background_frames_are_skipped_for_the_newest() {
    let ledger = FrameLedger::new();
    let (screen_tx, screen) = ChannelSource::channel("screen", 16);
    // Twelve screen frames, 0..=88ms, all queued before the first camera frame.
    for i in 0..12 {
        let colour = if i == 11 { SCREEN_LATER } else { SCREEN };
        screen_tx
            .send(VideoFrame::solid(64, 36, i * 8_000, colour).tracked(&ledger))
            .await
            .unwrap();
    }
    let camera = ScriptedSource::new("camera")
        .push(VideoFrame::solid(8, 8, 90_000, CAMERA).tracked(&ledger))
        .push(VideoFrame::solid(8, 8, 123_000, CAMERA).tracked(&ledger))
        .push(VideoFrame::solid(8, 8, 156_000, CAMERA).tracked(&ledger));

    let mut stream = compose_streams(
        boxed(camera),
        boxed(screen),
        None,
        &ComposeOptions::default(),
        &RasterSurfaceProvider::new(),
    )
    .unwrap();

    let frames = drain(&mut stream.video).await;
    let stats = stream.session.join().await.unwrap();
    drop(screen_tx);

    assert_eq!(frames.len(), 3);
    assert!(frames.iter().all(|f| f.pixel(0, 0) == Some(SCREEN_LATER)));
    assert_eq!(stats.background_frames_received, 12);
    assert_eq!(stats.background_frames_skipped, 11);
    assert_eq!(stats.background_repeats, 2);
    assert_eq!(stats.max_background_lag_us, 156_000 - 88_000);
    assert!(stats.background_skip_rate() > 90.0);

    drop(frames);
    assert!(ledger.report().is_balanced(), "{:?}", ledger.report());
}

#[tokio::test]
async fn output_timestamps_follow_pacing_source_exactly() {
    let ledger = FrameLedger::new();
    let stamps = [0_i64, 16_000, 41_000, 41_500, 90_000, 91_000, 150_000, 333_333];
    let mut camera = ScriptedSource::new("camera");
    for &ts in &stamps {
        camera = camera.push(VideoFrame::solid(8, 8, ts, CAMERA).tracked(&ledger));
    }
    // Background at a much higher rate with unrelated timestamps.
    let screen = SyntheticSource::new("screen", 64, 36, FrameCadence::new(240.0))
        .with_palette(vec![SCREEN, SCREEN_LATER])
        .tracked(&ledger);

    let mut stream = compose_streams(
        boxed(camera),
        boxed(screen),
        None,
        &ComposeOptions::default(),
        &RasterSurfaceProvider::new(),
    )
    .unwrap();

    let frames = drain(&mut stream.video).await;
    let stats = stream.session.join().await.unwrap();

    let out: Vec<i64> = frames.iter().map(|f| f.timestamp_us()).collect();
    assert_eq!(out, stamps.to_vec());
    assert_eq!(stats.frames_emitted, stamps.len() as u64);
    assert!(frames.iter().all(|f| f.dimensions() == (64, 36)));

    let report = ledger.report();
    assert!(report.is_balanced(), "{report:?}");
    assert!(report.acquired > stamps.len());
}

#[tokio::test]
async fn background_that_never_starts_falls_back_to_blank_container() {
    let camera = ScriptedSource::new("camera").push(VideoFrame::solid(40, 40, 7, CAMERA));
    let screen = ScriptedSource::new("screen").then(ScriptEnd::End);

    let mut stream = compose_streams(
        boxed(camera),
        boxed(screen),
        None,
        &ComposeOptions::default(),
        &RasterSurfaceProvider::new(),
    )
    .unwrap();

    let frames = drain(&mut stream.video).await;
    let stats = stream.session.join().await.unwrap();

    assert_eq!(frames.len(), 1);
    let frame = &frames[0];
    assert_eq!(frame.timestamp_us(), 7);
    assert_eq!(frame.dimensions(), (1920, 1080));
    assert_eq!(frame.pixel(0, 0), Some([0, 0, 0, 0]));
    // Default 1:1 M overlay: 288x288 at (1622, 782).
    assert_eq!(frame.pixel(1622 + 144, 782 + 144), Some(CAMERA));
    assert!(stats.background_exhausted);
}

#[tokio::test]
async fn primary_only_passes_frames_through_without_a_surface() {
    let ledger = FrameLedger::new();
    let inputs: Vec<VideoFrame> = (0..5)
        .map(|i| VideoFrame::solid(4, 4, i * 1_000, CAMERA).tracked(&ledger))
        .collect();
    let ids: Vec<_> = inputs.iter().map(|f| f.id()).collect();
    let camera = inputs
        .into_iter()
        .fold(ScriptedSource::new("camera"), |s, f| s.push(f));

    let surfaces = CountingProvider::default();
    let audio = AudioTrack::new("mic", 48_000, 2);
    let mut stream = compose_streams(
        boxed(camera),
        None,
        Some(audio.clone()),
        &ComposeOptions::default(),
        &surfaces,
    )
    .unwrap();
    assert_eq!(stream.mode, CompositionMode::PrimaryOnly);
    assert_eq!(stream.audio, Some(audio));

    let frames = drain(&mut stream.video).await;
    let stats = stream.session.join().await.unwrap();

    assert_eq!(frames.iter().map(|f| f.id()).collect::<Vec<_>>(), ids);
    assert_eq!(
        frames.iter().map(|f| f.timestamp_us()).collect::<Vec<_>>(),
        vec![0, 1_000, 2_000, 3_000, 4_000]
    );
    assert_eq!(surfaces.acquired.load(Ordering::SeqCst), 0);
    assert_eq!(stats.mode, CompositionMode::PrimaryOnly);
    assert_eq!(stats.frames_emitted, 5);

    drop(frames);
    assert!(ledger.report().is_balanced());
}

#[tokio::test]
async fn secondary_only_passes_frames_through_without_a_surface() {
    let screen = ScriptedSource::new("screen")
        .push(VideoFrame::solid(1920, 1080, 5, SCREEN))
        .push(VideoFrame::solid(1280, 720, 10, SCREEN_LATER));

    let surfaces = CountingProvider::default();
    let mut stream = compose_streams(
        None,
        boxed(screen),
        None,
        &ComposeOptions::default(),
        &surfaces,
    )
    .unwrap();
    assert_eq!(stream.mode, CompositionMode::SecondaryOnly);

    let frames = drain(&mut stream.video).await;
    stream.session.join().await.unwrap();

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].dimensions(), (1920, 1080));
    assert_eq!(frames[1].dimensions(), (1280, 720));
    assert_eq!(frames[1].timestamp_us(), 10);
    assert_eq!(surfaces.acquired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn surface_failure_is_fatal_before_any_frame() {
    let ledger = FrameLedger::new();
    let camera = ScriptedSource::new("camera")
        .push(VideoFrame::solid(4, 4, 0, CAMERA).tracked(&ledger));
    let screen = ScriptedSource::new("screen")
        .push(VideoFrame::solid(4, 4, 0, SCREEN).tracked(&ledger));

    let err = compose_streams(
        boxed(camera),
        boxed(screen),
        None,
        &ComposeOptions::default(),
        &FailingProvider,
    )
    .unwrap_err();

    assert!(matches!(err, PipcastError::Setup { .. }));
    assert!(ledger.report().is_balanced());
}

#[tokio::test]
async fn no_video_source_is_rejected() {
    let err = compose_streams(
        None,
        None,
        Some(AudioTrack::new("mic", 44_100, 1)),
        &ComposeOptions::default(),
        &RasterSurfaceProvider::new(),
    )
    .unwrap_err();
    assert!(matches!(err, PipcastError::NoVideoSource { .. }));
}

#[tokio::test]
async fn stop_closes_output_and_releases_held_frames() {
    let ledger = FrameLedger::new();
    let (camera_tx, camera) = ChannelSource::channel("camera", 4);
    let screen = ScriptedSource::new("screen")
        .push(VideoFrame::solid(64, 36, 0, SCREEN).tracked(&ledger))
        .then(ScriptEnd::Idle);

    let config = CompositionConfig {
        position: OverlayPosition::TopLeft,
        ..CompositionConfig::default()
    };
    let mut stream = compose_streams(
        boxed(camera),
        boxed(screen),
        None,
        &options(config),
        &RasterSurfaceProvider::new(),
    )
    .unwrap();
    let mut states = stream.session.subscribe();
    assert_eq!(stream.session.state(), SessionState::Idle);

    for i in 0..2 {
        camera_tx
            .send(VideoFrame::solid(8, 8, i * 33_333, CAMERA).tracked(&ledger))
            .await
            .unwrap();
        let out = stream.video.recv().await.unwrap();
        assert_eq!(out.timestamp_us(), i * 33_333);
    }
    assert_eq!(stream.session.state(), SessionState::Running);

    stream.session.stop();
    states
        .wait_for(|s| *s == SessionState::Closed)
        .await
        .unwrap();
    assert!(stream.video.recv().await.is_none());

    let stats = stream.session.join().await.unwrap();
    assert_eq!(stats.termination, Some(Termination::Stopped));
    assert_eq!(stats.frames_emitted, 2);
    assert!(camera_tx.is_closed());
    assert!(ledger.report().is_balanced(), "{:?}", ledger.report());
}

#[tokio::test]
async fn stop_while_waiting_for_first_background_discards_pacing_frame() {
    let ledger = FrameLedger::new();
    let (camera_tx, camera) = ChannelSource::channel("camera", 4);
    let screen = ScriptedSource::new("screen").then(ScriptEnd::Idle);

    let mut stream = compose_streams(
        boxed(camera),
        boxed(screen),
        None,
        &ComposeOptions::default(),
        &RasterSurfaceProvider::new(),
    )
    .unwrap();
    let mut states = stream.session.subscribe();

    camera_tx
        .send(VideoFrame::solid(8, 8, 0, CAMERA).tracked(&ledger))
        .await
        .unwrap();
    states
        .wait_for(|s| *s == SessionState::Running)
        .await
        .unwrap();

    stream.session.stop();
    assert!(stream.video.recv().await.is_none());

    let stats = stream.session.join().await.unwrap();
    assert_eq!(stats.frames_emitted, 0);
    assert_eq!(stats.pacing_frames_discarded, 1);
    assert!(ledger.report().is_balanced(), "{:?}", ledger.report());
}

#[tokio::test]
async fn background_arriving_after_stop_is_released_not_held() {
    let ledger = FrameLedger::new();
    let camera = ScriptedSource::new("camera")
        .push(VideoFrame::solid(8, 8, 0, CAMERA).tracked(&ledger))
        .push(VideoFrame::solid(8, 8, 33_333, CAMERA).tracked(&ledger))
        .then(ScriptEnd::Idle);
    let (screen_tx, screen) = ChannelSource::channel("screen", 4);
    screen_tx
        .send(VideoFrame::solid(32, 18, 0, SCREEN).tracked(&ledger))
        .await
        .unwrap();

    let mut stream = compose_streams(
        boxed(camera),
        boxed(screen),
        None,
        &ComposeOptions::default(),
        &RasterSurfaceProvider::new(),
    )
    .unwrap();

    // The second pacing frame leaves a background fetch in flight.
    for _ in 0..2 {
        let out = stream.video.recv().await.unwrap();
        assert_eq!(out.pixel(0, 0), Some(SCREEN));
    }

    let late = VideoFrame::solid(32, 18, 40_000, SCREEN_LATER).tracked(&ledger);
    let late_id = late.id();
    screen_tx.send(late).await.unwrap();
    stream.session.stop();

    assert!(stream.video.recv().await.is_none());
    let stats = stream.session.join().await.unwrap();

    assert_eq!(stats.termination, Some(Termination::Stopped));
    assert_eq!(stats.frames_emitted, 2);
    assert_eq!(stats.background_frames_received, 2);
    assert_eq!(stats.background_frames_discarded, 1);
    assert_eq!(stats.background_frames_skipped, 0);
    assert!(!ledger.is_live(late_id));
    assert!(ledger.report().is_balanced(), "{:?}", ledger.report());
}

#[tokio::test]
async fn dropping_the_sink_terminates_the_session() {
    let ledger = FrameLedger::new();
    let (camera_tx, camera) = ChannelSource::channel("camera", 4);
    let screen = ScriptedSource::new("screen")
        .push(VideoFrame::solid(32, 18, 0, SCREEN).tracked(&ledger))
        .then(ScriptEnd::Idle);

    let mut stream = compose_streams(
        boxed(camera),
        boxed(screen),
        None,
        &ComposeOptions::default(),
        &RasterSurfaceProvider::new(),
    )
    .unwrap();

    camera_tx
        .send(VideoFrame::solid(8, 8, 0, CAMERA).tracked(&ledger))
        .await
        .unwrap();
    assert!(stream.video.recv().await.is_some());
    drop(stream.video);

    let stats = stream.session.join().await.unwrap();
    assert_eq!(stats.termination, Some(Termination::SinkClosed));
    assert_eq!(stats.frames_emitted, 1);
    assert!(ledger.report().is_balanced(), "{:?}", ledger.report());
}

#[tokio::test]
async fn stats_serialize_for_reporting() {
    let camera = ScriptedSource::new("camera").push(VideoFrame::solid(2, 2, 0, CAMERA));
    let mut stream = compose_streams(
        boxed(camera),
        None,
        None,
        &ComposeOptions::default(),
        &RasterSurfaceProvider::new(),
    )
    .unwrap();
    drain(&mut stream.video).await;
    let stats = stream.session.join().await.unwrap();

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["mode"], "primary_only");
    assert_eq!(json["termination"], "pacing_ended");
    assert_eq!(json["frames_emitted"], 1);
    assert_eq!(json["background_frames_discarded"], 0);
}
