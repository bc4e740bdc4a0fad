//! TriboDAQ - Command-line entry point
//!
//! Provides:
//! - `ports`: list serial endpoints
//! - `monitor`: print decoded readings from a port for a while
//! - `run`: configure the rig, record one experiment and report statistics

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tribodaq_rs::{
    backend::list_ports,
    config::{self, AppConfig, SerialConfig},
    types::Reading,
    DeviceController, SensorSource,
};

#[derive(Parser)]
#[command(name = "tribodaq")]
#[command(about = "Serial telemetry acquisition for a tribology rig", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available serial ports
    Ports,

    /// Print decoded readings from a port
    Monitor {
        /// Serial port (defaults to the configured one)
        #[arg(long)]
        port: Option<String>,

        /// Line speed
        #[arg(long)]
        baud: Option<u32>,

        /// How long to listen, in seconds
        #[arg(long, default_value = "10")]
        seconds: u64,

        /// Configuration file (JSON or TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run one experiment and record it
    Run {
        /// Configuration file (JSON or TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Serial port override
        #[arg(long)]
        port: Option<String>,

        /// Sensor source override
        #[arg(long, value_enum)]
        source: Option<SourceArg>,

        /// Experiment duration override, in seconds
        #[arg(long)]
        duration: Option<f64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Fixed,
    Controlled,
}

impl From<SourceArg> for SensorSource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Fixed => SensorSource::Fixed,
            SourceArg::Controlled => SensorSource::Controlled,
        }
    }
}

fn main() -> Result<()> {
    let _log_guard = init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Ports => ports(),
        Commands::Monitor {
            port,
            baud,
            seconds,
            config,
        } => {
            let mut serial = load_config(config.as_ref())?.serial;
            if let Some(port) = port {
                serial.port = port;
            }
            if let Some(baud) = baud {
                serial.baud_rate = baud;
            }
            monitor(&serial, Duration::from_secs(seconds))
        }
        Commands::Run {
            config,
            port,
            source,
            duration,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(port) = port {
                config.serial.port = port;
            }
            if let Some(source) = source {
                config.sensor_source = source.into();
            }
            if let Some(duration) = duration {
                config.experiment.experiment_duration_s = duration;
            }
            run(&config)
        }
    }
}

/// Stdout logging plus a daily log file in the app data directory
fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let (file_layer, guard) = match config::ensure_app_data_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir.join("logs"), "tribodaq.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tribodaq_rs=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(AppConfig::default()),
    }
}

fn ports() -> Result<()> {
    let ports = list_ports();
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}", port);
    }
    Ok(())
}

fn monitor(serial: &SerialConfig, listen_for: Duration) -> Result<()> {
    let mut controller = DeviceController::serial(&AppConfig::default());
    controller
        .connect(serial)
        .with_context(|| format!("Failed to open {}", serial.port))?;
    println!("Listening on {} for {:?}", serial.port, listen_for);

    let deadline = Instant::now() + listen_for;
    while Instant::now() < deadline && controller.is_reading() {
        for reading in controller.drain_queued() {
            print_reading(&reading);
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    for reading in controller.drain_queued() {
        print_reading(&reading);
    }

    let stats = controller.reader_stats();
    controller.disconnect();
    println!(
        "{} bytes, {} lines, {} readings, {} dropped",
        stats.bytes_read, stats.lines, stats.readings, stats.dropped_lines
    );
    Ok(())
}

fn print_reading(reading: &Reading) {
    if reading.is_measurement() {
        println!(
            "t={:?} force_x={:?} force_z={:?} | {}",
            reading.time, reading.force_x, reading.force_z, reading.raw
        );
    } else if let Some(message) = &reading.message {
        println!("[status] {}", message);
    }
}

fn run(config: &AppConfig) -> Result<()> {
    let mut controller = DeviceController::serial(config);
    controller
        .connect(&config.serial)
        .with_context(|| format!("Failed to open {}", config.serial.port))?;

    let total = config.experiment.experiment_duration_s;
    let log_path = controller.start_experiment(&config.experiment)?;
    println!("Recording to {}", log_path.display());

    // The rig's clock may stop short of the nominal duration
    let grace = Duration::try_from_secs_f64(total.max(0.0) * 1.5 + 10.0)
        .unwrap_or(Duration::from_secs(600));
    let deadline = Instant::now() + grace;
    let interval = config.data.plot_update_interval().max(Duration::from_millis(100));

    let mut last_reported = -1.0;
    loop {
        std::thread::sleep(interval);
        let progress = controller.progress(total);
        if progress - last_reported >= 1.0 || progress >= 100.0 {
            println!("Progress: {:5.1}%", progress);
            last_reported = progress;
        }
        if progress >= 100.0 {
            break;
        }
        if !controller.is_reading() {
            tracing::error!(
                "Reader stopped: {}",
                controller.reader_error().unwrap_or_default()
            );
            break;
        }
        if Instant::now() >= deadline {
            tracing::warn!("Experiment did not complete in time, stopping");
            break;
        }
    }

    let log_path = controller.stop_experiment();
    let stats = controller.statistics();
    controller.disconnect();

    if let Some(path) = log_path {
        println!("Run log: {}", path.display());
    }
    if stats.is_empty() {
        println!("No data collected");
    }
    for (key, value) in stats.as_map() {
        println!("{:>14}: {:.3}", key, value);
    }
    Ok(())
}
