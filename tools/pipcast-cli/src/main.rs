//! PipCast CLI: run composition sessions and inspect overlay geometry.
//!
//! Usage:
//!   pipcast compose [OPTIONS]      Run a synthetic two-source session
//!   pipcast geometry [OPTIONS]     Print overlay rectangles for a container
//!   pipcast preview [OPTIONS]      Print the live preview placement
//!   pipcast config <show|init>     Show or create the configuration file

use clap::{Args, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "pipcast",
    about = "Picture-in-picture composition of camera and screen video",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Overlay options. Unset values come from the configuration file.
#[derive(Args, Debug, Clone, Default)]
pub struct OverlayArgs {
    /// Overlay corner: top-left, top-right, bottom-left, bottom-right
    #[arg(long)]
    position: Option<String>,

    /// Overlay size class: S, M, L, XL
    #[arg(long)]
    size: Option<String>,

    /// Corner rounding class: S, M, L, XL
    #[arg(long)]
    corner: Option<String>,

    /// Overlay aspect ratio, W:H
    #[arg(long)]
    aspect: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a composition session over synthetic camera and screen sources
    Compose {
        #[command(flatten)]
        overlay: OverlayArgs,

        /// Which sources to record: screen-only, camera-only, screen-and-camera
        #[arg(long, default_value = "screen-and-camera")]
        layout: String,

        /// Number of camera frames to compose
        #[arg(long, default_value = "90")]
        frames: u64,

        /// Camera frame rate (pacing)
        #[arg(long, default_value = "30")]
        camera_fps: f64,

        /// Screen frame rate (background)
        #[arg(long, default_value = "10")]
        screen_fps: f64,

        /// Camera frame size, WxH
        #[arg(long, default_value = "640x480")]
        camera_size: String,

        /// Screen frame size, WxH
        #[arg(long, default_value = "1920x1080")]
        screen_size: String,

        /// Produce frames in real time instead of as fast as possible
        #[arg(long)]
        live: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the recording and preview overlay rectangles for a container
    Geometry {
        #[command(flatten)]
        overlay: OverlayArgs,

        /// Container width
        #[arg(long, default_value = "1920")]
        width: u32,

        /// Container height
        #[arg(long, default_value = "1080")]
        height: u32,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the live preview overlay placement
    Preview {
        #[command(flatten)]
        overlay: OverlayArgs,

        /// Preview layout
        #[arg(long, default_value = "screen-and-camera")]
        layout: String,

        /// Observed background width (omit when no screen source is present)
        #[arg(long, requires = "height")]
        width: Option<u32>,

        /// Observed background height
        #[arg(long, requires = "width")]
        height: Option<u32>,

        /// Treat the camera as absent
        #[arg(long)]
        no_camera: bool,
    },

    /// Show or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = pipcast_common::config::AppConfig::load();

    // Initialize logging
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    pipcast_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Compose {
            overlay,
            layout,
            frames,
            camera_fps,
            screen_fps,
            camera_size,
            screen_size,
            live,
            json,
        } => {
            commands::compose::run(
                &config,
                commands::compose::ComposeArgs {
                    overlay,
                    layout,
                    frames,
                    camera_fps,
                    screen_fps,
                    camera_size,
                    screen_size,
                    live,
                    json,
                },
            )
            .await
        }
        Commands::Geometry {
            overlay,
            width,
            height,
            json,
        } => commands::geometry::run(&config, &overlay, width, height, json),
        Commands::Preview {
            overlay,
            layout,
            width,
            height,
            no_camera,
        } => commands::preview::run(&config, &overlay, &layout, width.zip(height), !no_camera),
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show(&config),
            ConfigAction::Init { force } => commands::config::init(force),
        },
    }
}
