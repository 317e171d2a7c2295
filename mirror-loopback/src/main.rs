//! mirror-loopback entry point.
//!
//! ```text
//! mirror-loopback                  Run with mirror-loopback.toml (or defaults)
//! mirror-loopback --config <path>  Load a custom config TOML
//! mirror-loopback --gen-config     Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mirror_loopback::config::LoopbackConfig;
use mirror_loopback::loopback::Loopback;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "mirror-loopback", about = "Mirror synthetic capture through loopback UDP")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "mirror-loopback.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        println!("{}", LoopbackConfig::default_toml()?);
        return Ok(());
    }

    let config = LoopbackConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("mirror-loopback v{}", env!("CARGO_PKG_VERSION"));
    info!("receiver port: {}", config.network.port);
    info!("mtu: {}", config.network.mtu);
    info!(
        "video: {} ({}x{} @ {} fps), audio: {}",
        config.video.enabled,
        config.video.width,
        config.video.height,
        config.video.fps,
        config.audio.enabled
    );

    let loopback = Loopback::new(config);
    let stop = loopback.stop_handle();

    // The mirror API blocks, so Ctrl-C is awaited on a side thread with
    // its own small runtime.
    let signals = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    std::thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            if let Err(e) = signals.block_on(tokio::signal::ctrl_c()) {
                warn!("cannot listen for Ctrl-C: {e}");
                return;
            }
            info!("Ctrl-C received, shutting down");
            stop.store(false, Ordering::SeqCst);
        })?;

    let summary = loopback.run()?;
    info!(
        "done: {} video and {} audio frames received, {} dropped",
        summary.video_frames, summary.audio_frames, summary.received.dropped
    );
    Ok(())
}
