//! busloop - managed background event loop for IPC bus proxies.
//!
//! Main entry point for the busloop CLI.

mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use busloop_config::{Config, ConfigLoader, ConfigValidator, LoggingConfig};
use busloop_protocols::PropertyMap;
use busloop_runloop::{BusLoop, BusProxy, LoopConfig, MemoryBus};

use crate::cli::{Cli, Commands};

const CONFIG_FILE: &str = "busloop.toml";

/// Pick the configuration file: explicit path, then the working directory,
/// then the user config directory.
fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|dir| dir.join("busloop").join(CONFIG_FILE))
        .unwrap_or(local)
}

/// Initialize tracing with a stderr layer and an optional rolling file layer.
fn init_tracing(
    logging: &LoggingConfig,
    log_dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let log_dir = log_dir.or_else(|| {
        logging
            .dir
            .as_deref()
            .map(|dir| PathBuf::from(ConfigLoader::expand_path(dir)))
    });

    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("busloop")
                .filename_suffix("log")
                .max_log_files(7)
                .build(&dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // Flushes buffered lines at exit.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(())
}

fn load_config(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    let config = ConfigLoader::load_or_default(path)?;
    Ok(config)
}

/// Export every configured service on a fresh in-memory bus.
fn seed_bus(config: &Config) -> Result<MemoryBus, Box<dyn std::error::Error>> {
    let bus = MemoryBus::new();
    for service in &config.services {
        for object in &service.objects {
            bus.register_object(
                &service.name,
                &object.path,
                &object.interface,
                object.properties.clone(),
            )?;
        }
        debug!(service = %service.name, objects = service.objects.len(), "service seeded");
    }
    Ok(bus)
}

fn print_properties(properties: &PropertyMap, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(properties)?);
        return Ok(());
    }
    if properties.is_empty() {
        println!("(no properties)");
        return Ok(());
    }
    let width = properties.keys().map(String::len).max().unwrap_or(0);
    for (name, value) in properties {
        println!("{:<width$}  {}", name, value, width = width);
    }
    Ok(())
}

fn run_probe(
    config: &Config,
    service: Option<String>,
    path: Option<String>,
    interface: Option<String>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = service.unwrap_or_else(|| config.target.service.clone());
    let path = path.unwrap_or_else(|| config.target.path.clone());
    let interface = interface.unwrap_or_else(|| service.clone());

    let bus = Arc::new(seed_bus(config)?);
    let loop_config = LoopConfig::default().with_thread_name(config.runloop.thread_name.clone());
    let bus_loop = BusLoop::connect_with_config(bus, &service, &path, &loop_config)?;

    let proxy = BusProxy::<PropertyMap>::new(&bus_loop, &service, &path, &interface)?;
    let (tx, rx) = mpsc::channel();
    proxy.get_properties(move |result| {
        let _ = tx.send(result);
    })?;

    let timeout = Duration::from_secs(config.probe.timeout_secs);
    let outcome = rx.recv_timeout(timeout);
    bus_loop.shutdown();

    match outcome {
        Ok(Ok(properties)) => {
            info!(object = %proxy.address(), count = properties.len(), "properties fetched");
            print_properties(&properties, json)
        }
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(format!("no reply from {} within {:?}", proxy.address(), timeout).into()),
    }
}

fn run_check_config(path: &Path, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let result = ConfigValidator::validate(config);
    for warning in &result.warnings {
        println!("warning: {}: {}", warning.path, warning.message);
    }
    for err in &result.errors {
        println!("error: {}: {}", err.path, err.message);
    }
    result.into_result()?;
    println!("{}: ok", path.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config);
    let config = load_config(&config_path)?;

    init_tracing(&config.logging, cli.log_dir)?;
    debug!(path = %config_path.display(), "configuration loaded");

    let outcome = match cli.command {
        Commands::Probe {
            service,
            path,
            interface,
            json,
        } => {
            let validation = ConfigValidator::validate(&config);
            for warning in &validation.warnings {
                warn!(path = %warning.path, "{}", warning.message);
            }
            validation.into_result()?;
            run_probe(&config, service, path, interface, json)
        }
        Commands::CheckConfig => run_check_config(&config_path, &config),
    };

    if let Err(e) = &outcome {
        error!(error = %e, "busloop failed");
    }
    outcome
}
