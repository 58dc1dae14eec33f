//! Run a composition session over synthetic sources.

use pipcast_common::clock::FrameCadence;
use pipcast_common::config::AppConfig;
use pipcast_compositor::{
    compose_streams, AudioTrack, ChannelSource, ComposeOptions, CompositionMode, FrameLedger,
    FrameSource, LedgerReport, RasterSurfaceProvider, SessionStats, SyntheticSource, VideoFrame,
};
use pipcast_overlay_model::layout::{select_sources, Layout};
use serde::Serialize;
use tokio::sync::mpsc;

use super::{overlay_config, parse_size};
use crate::OverlayArgs;

pub struct ComposeArgs {
    pub overlay: OverlayArgs,
    pub layout: String,
    pub frames: u64,
    pub camera_fps: f64,
    pub screen_fps: f64,
    pub camera_size: String,
    pub screen_size: String,
    pub live: bool,
    pub json: bool,
}

#[derive(Serialize)]
struct ComposeReport {
    layout: Layout,
    mode: CompositionMode,
    output_frames: u64,
    output_size: Option<(u32, u32)>,
    first_timestamp_us: Option<i64>,
    last_timestamp_us: Option<i64>,
    stats: SessionStats,
    ledger: LedgerReport,
}

pub async fn run(app: &AppConfig, args: ComposeArgs) -> anyhow::Result<()> {
    let mut options = ComposeOptions::from_app_config(app)?;
    options.config = overlay_config(app, &args.overlay)?;
    let layout: Layout = args.layout.parse()?;
    let (camera_w, camera_h) = parse_size(&args.camera_size)?;
    let (screen_w, screen_h) = parse_size(&args.screen_size)?;
    anyhow::ensure!(args.frames > 0, "--frames must be at least 1");

    let camera_cadence = FrameCadence::new(args.camera_fps);
    let screen_cadence = FrameCadence::new(args.screen_fps);
    // Enough screen frames to span the camera run on their own.
    let screen_frames =
        ((args.frames as f64 * screen_cadence.fps() / camera_cadence.fps()).ceil() as u64).max(1);

    let ledger = FrameLedger::new();
    let mut camera = SyntheticSource::new("camera", camera_w, camera_h, camera_cadence)
        .with_palette(vec![[220, 120, 40, 255], [200, 100, 30, 255]])
        .with_limit(args.frames)
        .tracked(&ledger);
    let mut screen = SyntheticSource::new("screen", screen_w, screen_h, screen_cadence)
        .with_palette(vec![[30, 40, 60, 255], [40, 50, 70, 255], [50, 60, 80, 255]])
        .with_limit(screen_frames)
        .tracked(&ledger);
    if args.live {
        camera = camera.live();
        screen = screen.live();
    }

    // The screen is fed through a channel the way a capture backend would,
    // so a slow consumer sees it queue up.
    let (screen_tx, screen_feed) = ChannelSource::channel("screen", 4);
    let feeder = tokio::spawn(feed(screen, screen_tx));

    let camera: Box<dyn FrameSource> = Box::new(camera);
    let screen: Box<dyn FrameSource> = Box::new(screen_feed);
    let (selected, excluded) = select_sources(layout, Some(camera), Some(screen));
    for source in &excluded {
        tracing::info!(source = source.label(), %layout, "Source not recorded in this layout");
    }

    let mut stream = compose_streams(
        selected.pacing,
        selected.background,
        Some(AudioTrack::new("microphone", 48_000, 2)),
        &options,
        &RasterSurfaceProvider::new(),
    )?;
    drop(excluded);

    let mut output_frames = 0u64;
    let mut output_size = None;
    let mut first_timestamp_us = None;
    let mut last_timestamp_us = None;
    let mut interrupted = false;

    loop {
        tokio::select! {
            frame = stream.video.recv() => {
                let Some(frame) = frame else { break };
                output_frames += 1;
                output_size = Some(frame.dimensions());
                first_timestamp_us.get_or_insert(frame.timestamp_us());
                last_timestamp_us = Some(frame.timestamp_us());
                frame.release();
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                println!("Stopping composition...");
                interrupted = true;
                stream.session.stop();
            }
        }
    }

    let stats = stream.session.join().await?;
    feeder.await?;
    let report = ComposeReport {
        layout,
        mode: stream.mode,
        output_frames,
        output_size,
        first_timestamp_us,
        last_timestamp_us,
        stats,
        ledger: ledger.report(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, &options);
    }

    anyhow::ensure!(
        report.ledger.is_balanced(),
        "Frame ledger is unbalanced: {} outstanding, {} violations",
        report.ledger.outstanding.len(),
        report.ledger.violations.len()
    );
    Ok(())
}

/// Push every frame of `source` into `tx` until either side ends.
async fn feed(mut source: SyntheticSource, tx: mpsc::Sender<VideoFrame>) {
    while let Some(frame) = source.next_frame().await {
        if tx.send(frame).await.is_err() {
            tracing::debug!(produced = source.produced(), "Screen consumer gone");
            break;
        }
    }
}

fn print_report(report: &ComposeReport, options: &ComposeOptions) {
    let stats = &report.stats;

    println!("Composition ({})", report.mode);
    println!("  Layout: {}", report.layout);
    println!(
        "  Overlay: {} {} corner {} aspect {}",
        options.config.position, options.config.size, options.config.corner, options.config.aspect
    );
    if let Some(reason) = stats.termination {
        println!("  Ended: {reason}");
    }
    println!();

    println!("Output:");
    println!("  Frames: {}", report.output_frames);
    if let Some((w, h)) = report.output_size {
        println!("  Size: {w}x{h}");
    }
    if let (Some(first), Some(last)) = (report.first_timestamp_us, report.last_timestamp_us) {
        println!(
            "  Timestamps: {:.3}s .. {:.3}s",
            first as f64 / 1e6,
            last as f64 / 1e6
        );
    }
    println!();

    if report.mode == CompositionMode::Dual {
        println!("Background:");
        println!("  Received: {}", stats.background_frames_received);
        println!(
            "  Skipped: {} ({:.1}%)",
            stats.background_frames_skipped,
            stats.background_skip_rate()
        );
        println!("  Reused: {}", stats.background_repeats);
        println!(
            "  Max lag: {:.1}ms",
            stats.max_background_lag_us as f64 / 1000.0
        );
        println!("  Exhausted: {}", stats.background_exhausted);
        println!();
    }

    println!("Frame ledger:");
    println!("  Acquired: {}", report.ledger.acquired);
    println!("  Released: {}", report.ledger.released);
    if report.ledger.is_balanced() {
        println!("  [OK] Every frame released exactly once");
    } else {
        println!(
            "  [FAIL] {} outstanding, {} violations",
            report.ledger.outstanding.len(),
            report.ledger.violations.len()
        );
    }
}
