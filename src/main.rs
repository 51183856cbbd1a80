use anyhow::Result;
use boothcam::{BoothService, BoothcamConfig};
use clap::Parser;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "boothcam")]
#[command(about = "Photo booth camera server with MJPEG streaming and image effects")]
#[command(version)]
#[command(long_about = "Exposes a gphoto2-controlled camera to concurrent viewers as an \
MJPEG stream, supports one-shot high-resolution captures against the same device, and \
applies pixel effects to the live stream or captured images. Degrades to a simulation \
mode with synthetic frames when no camera is attached.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "boothcam.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Force simulation mode even when a camera is attached
    #[arg(long, help = "Force simulation mode with synthetic frames")]
    simulate: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the server")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting boothcam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = match BoothcamConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    if args.simulate {
        config.camera.simulate = true;
    }

    let service = BoothService::new(config).await.map_err(|e| {
        error!("Failed to initialize service: {}", e);
        e
    })?;

    // SIGINT triggers a clean shutdown: stream stopped, viewers dropped
    let shutdown_service = service.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            shutdown_service.shutdown().await;
        }
    });

    service.run().await.map_err(|e| {
        error!("Server error: {}", e);
        e
    })?;

    info!("Boothcam exited cleanly");
    Ok(())
}

fn print_default_config() -> Result<()> {
    let config = BoothcamConfig::default();
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("boothcam={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_target(true).boxed()
        }
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}
