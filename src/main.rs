use battery_backend::api;
use battery_backend::config::AppConfig;
use battery_backend::firmware::FirmwareRegistry;
use battery_backend::telemetry::{IngestionPipeline, NotificationDispatcher, TelemetryStore};
use dotenvy::dotenv;
use log::{error, info, warn};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenv().ok();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    // Ensure data and log directories exist
    for dir in [&config.data_path, &config.log_path, &config.firmware_path()] {
        if let Err(e) = fs::create_dir_all(dir) {
            eprintln!("Failed to create directory {:?}: {}", dir, e);
            std::process::exit(1);
        }
    }
    if let Some(parent) = Path::new(&config.database_url).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!("Failed to create database directory {:?}: {}", parent, e);
                std::process::exit(1);
            }
        }
    }

    // initialize logging
    let file_appender = match RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("battery")
        .filename_suffix("log")
        .max_log_files(config.max_log_days)
        .build(&config.log_path)
    {
        Ok(appender) => appender,
        Err(e) => {
            eprintln!("Failed to create rolling log file: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr)) // console
        .with(fmt::layer().with_ansi(false).with_writer(file_appender)) // file
        .init();

    info!("Logging initialized.");
    info!("Data path: {:?}", config.data_path);
    info!("Database: {}", config.database_url);
    if config.api_key_generated {
        warn!("BATTERY_API_KEY not set, generated api_key {}", config.api_key);
    }

    let pool = match battery_backend::init_database(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Database initialization failed: {e}");
            std::process::exit(1);
        }
    };
    info!("Database ready.");

    let dispatcher =
        NotificationDispatcher::from_config(config.telegram.as_ref(), config.notify_timeout);
    let pipeline = IngestionPipeline::new(TelemetryStore::new(pool), dispatcher);
    let registry = Arc::new(FirmwareRegistry::new(config.firmware_path()));

    let rest_api_config = api::rest::RestApiConfig {
        listen_address: config.listen_address,
        max_firmware_size: config.max_firmware_size,
        api_key: config.api_key.clone(),
        pipeline,
        registry,
    };
    let mut rest_api = api::rest::RestApi::new(rest_api_config);
    if let Err(e) = rest_api.start_blocking().await {
        error!("Server error: {e}");
        std::process::exit(1);
    }
}
