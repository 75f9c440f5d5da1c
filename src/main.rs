use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use sat_o_cache::config::Config;
use sat_o_cache::orbit::{Sgp4Orbit, TleCatalog};
use sat_o_cache::position::ObserverLocation;
use sat_o_cache::{web, SatellitePositionService, ServiceConfig};

#[derive(Parser)]
#[command(name = "sat-o-cache")]
#[command(about = "Cached satellite position service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and cache maintenance
    Serve {
        #[arg(short, long)]
        config: String,
    },
    /// Validate a config file and the TLE folder it points to
    Validate {
        #[arg(short, long)]
        config: String,
    },
    /// Compute one position from a TLE folder and print it as JSON
    Position {
        #[arg(long)]
        tle_folder: PathBuf,
        #[arg(long)]
        id: u32,
        /// Observer as "lat,lon[,alt_m]"
        #[arg(long)]
        observer: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => serve(&config).await,
        Commands::Validate { config } => validate(&config),
        Commands::Position {
            tle_folder,
            id,
            observer,
        } => position(&tle_folder, id, observer.as_deref()).await,
    }
}

fn load_config(path: &str) -> Option<Config> {
    match Config::from_file(path) {
        Ok(c) => Some(c),
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            None
        }
    }
}

fn load_catalog(folder: &Path) -> Option<TleCatalog> {
    match TleCatalog::load_dir(folder) {
        Ok(catalog) => Some(catalog),
        Err(e) => {
            eprintln!("Error loading TLEs: {}", e);
            None
        }
    }
}

async fn serve(path: &str) -> ExitCode {
    let Some(config) = load_config(path) else {
        return ExitCode::FAILURE;
    };
    let service_config = match ServiceConfig::try_from(&config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let Some(catalog) = load_catalog(&config.orbit.tle_folder) else {
        return ExitCode::FAILURE;
    };

    let orbit = Arc::new(Sgp4Orbit::new(catalog));
    let catalog = orbit.catalog();
    let service = Arc::new(SatellitePositionService::new(orbit, service_config));
    service.start();

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for ctrl-c: {}", e);
        }
        log::info!("shutting down");
    };

    let result = web::run_server(Arc::new(config), service.clone(), catalog, shutdown).await;
    service.stop().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn validate(path: &str) -> ExitCode {
    let Some(config) = load_config(path) else {
        return ExitCode::FAILURE;
    };
    if let Err(e) = ServiceConfig::try_from(&config) {
        eprintln!("Invalid config: {}", e);
        return ExitCode::FAILURE;
    }
    let Some(catalog) = load_catalog(&config.orbit.tle_folder) else {
        return ExitCode::FAILURE;
    };

    println!("Config is valid");
    println!(
        "  cache: ttl {:?}, max {} positions",
        config.cache.ttl, config.cache.max_positions
    );
    println!("  events: max {}", config.events.max_events);
    println!(
        "  maintenance: every {:?} (backoff {:?})",
        config.maintenance.interval, config.maintenance.error_backoff
    );
    println!("  satellites: {}", catalog.len());
    println!("  api keys: {}", config.api_keys.len());
    ExitCode::SUCCESS
}

async fn position(tle_folder: &Path, id: u32, observer: Option<&str>) -> ExitCode {
    let observer = match observer.map(ObserverLocation::from_coordinates).transpose() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Invalid observer: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let Some(catalog) = load_catalog(tle_folder) else {
        return ExitCode::FAILURE;
    };

    let service =
        SatellitePositionService::new(Arc::new(Sgp4Orbit::new(catalog)), ServiceConfig::default());

    let position = match service.get_satellite_position(id, observer.as_ref()).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error computing position: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(position.as_ref()) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error encoding position: {}", e);
            ExitCode::FAILURE
        }
    }
}
