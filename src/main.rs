//! CLI entry point: stream a G-code file to a motion controller.

use std::path::PathBuf;

use clap::Parser;
use tokio::io::BufReader;

use grblstream::config::{self, StreamConfig};
use grblstream::controller::StreamController;
use grblstream::error::StreamError;
use grblstream::source::CommandSource;
use grblstream::transport;

#[derive(Parser, Debug)]
#[command(
    name = "grblstream",
    about = "Stream G-code to a GRBL-class motion controller over a serial port.",
    version
)]
struct Cli {
    /// Serial device the controller is attached to (e.g. /dev/ttyACM0)
    #[arg(short, long)]
    device: String,

    /// G-code file to stream
    #[arg(short, long)]
    file: PathBuf,

    /// TOML file overriding the stream defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log every command and response
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // Bad usage exits 1; --help and --version exit 0.
            std::process::exit(if err.use_stderr() { 1 } else { 0 });
        }
    };

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    if let Err(err) = run(cli).await {
        tracing::error!("{err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), StreamError> {
    let config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => StreamConfig::default(),
    };

    let file = tokio::fs::File::open(&cli.file)
        .await
        .map_err(|e| StreamError::OpenSource {
            path: cli.file.clone(),
            source: e,
        })?;
    let mut source = CommandSource::new(BufReader::new(file));

    tracing::info!("opening {} at {} baud", cli.device, config.baud);
    let port = transport::open_port(&cli.device, &config).map_err(|e| StreamError::OpenDevice {
        path: cli.device.clone(),
        source: e,
    })?;

    let mut controller = StreamController::new(port, config);
    let stats = tokio::select! {
        result = controller.run(&mut source) => result?,
        _ = tokio::signal::ctrl_c() => return Err(StreamError::Interrupted),
    };

    tracing::info!(
        "done: {} commands sent ({} bytes), {} comments skipped, {} responses ({} ok, {} error), {} still unacknowledged",
        stats.commands_sent,
        stats.bytes_sent,
        stats.comments_skipped,
        stats.acks_total(),
        stats.acks_ok,
        stats.acks_error,
        controller.pending(),
    );
    Ok(())
}
