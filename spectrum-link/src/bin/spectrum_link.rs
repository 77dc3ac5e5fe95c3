use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use spectrum_link::config::{
    DEFAULT_BAND_COUNT, DEFAULT_BAUD_RATE, DEFAULT_BLOCK_SIZE, DEFAULT_SAMPLE_RATE_HZ,
};
use spectrum_link::{CpalCapture, LinkError, SerialSink, StreamConfig, StreamingController};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "spectrum-link")]
#[command(about = "Stream live audio spectrum bands to a microcontroller over serial", long_about = None)]
#[command(version)]
struct Args {
    /// Serial port of the display controller (e.g. /dev/ttyUSB0, COM3)
    #[arg(long, env = "SPECTRUM_LINK_PORT")]
    port: String,

    /// Serial baud rate
    #[arg(long, env = "SPECTRUM_LINK_BAUD", default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Capture sample rate in Hz
    #[arg(long, env = "SPECTRUM_LINK_SAMPLE_RATE", default_value_t = DEFAULT_SAMPLE_RATE_HZ)]
    sample_rate: u32,

    /// Samples per FFT block (power of two, 8..=4096)
    #[arg(long, env = "SPECTRUM_LINK_BLOCK_SIZE", default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Bands (bytes) per frame
    #[arg(long, env = "SPECTRUM_LINK_BANDS", default_value_t = DEFAULT_BAND_COUNT)]
    bands: usize,

    /// Input device name, defaults to the system default input
    #[arg(long, env = "SPECTRUM_LINK_DEVICE")]
    device: Option<String>,

    /// Milliseconds to wait after opening the port before streaming
    #[arg(long, env = "SPECTRUM_LINK_SETTLE_MS", default_value_t = 2000)]
    settle_ms: u64,

    /// Per-frame serial write timeout in milliseconds
    #[arg(long, env = "SPECTRUM_LINK_WRITE_TIMEOUT_MS", default_value_t = 25)]
    write_timeout_ms: u64,

    /// Seconds between throughput reports, 0 to disable
    #[arg(long, env = "SPECTRUM_LINK_STATS_SECS", default_value_t = 10)]
    stats_secs: u64,

    /// Log level
    #[arg(long, value_enum, env = "SPECTRUM_LINK_LOG", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Args {
    fn stream_config(&self) -> StreamConfig {
        let mut config = StreamConfig::new(self.port.clone());
        config.baud_rate = self.baud;
        config.sample_rate = self.sample_rate;
        config.block_size = self.block_size;
        config.band_count = self.bands;
        config.device = self.device.clone();
        config.settle_delay = Duration::from_millis(self.settle_ms);
        config.write_timeout = Duration::from_millis(self.write_timeout_ms);
        config.stats_interval = Duration::from_secs(self.stats_secs);
        config
    }
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8) -> anyhow::Result<()> {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "spectrum_link=error",
        LogLevel::Warn => "spectrum_link=warn",
        LogLevel::Info => "spectrum_link=info",
        LogLevel::Debug => "spectrum_link=debug",
        LogLevel::Trace => "spectrum_link=trace",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("failed to initialize tracing")
}

fn run(args: &Args) -> Result<(), LinkError> {
    let config = args.stream_config();
    let sink = SerialSink::from_config(&config);
    let mut controller = StreamingController::new(config, sink, CpalCapture::new())?;

    let stop = controller.stop_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received stop signal, shutting down");
        stop.stop();
    }) {
        // Without the handler Ctrl+C still terminates, just without cleanup
        error!("Failed to install Ctrl+C handler: {}", e);
    }

    let summary = controller.run()?;
    info!(
        "Stopped after {:.1}s, {} frames sent",
        summary.streamed_for.as_secs_f64(),
        summary.stats.frames_sent
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(args.log_level, args.verbose) {
        eprintln!("{:#}", e);
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
