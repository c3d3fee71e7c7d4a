//! pagedeploy - Entry Point
//!
//! HTTP service that generates static apps from briefs and publishes them.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;

use pagedeploy::app::run::run;
use pagedeploy::app::state::AppState;
use pagedeploy::filesys::file::File;
use pagedeploy::logs::init_logging;
use pagedeploy::storage::settings::{Settings, DEFAULT_SETTINGS_FILE};
use pagedeploy::utils::version_info;

use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return ExitCode::SUCCESS;
    }

    let settings_file = File::new(
        cli_args
            .get("config")
            .map(String::as_str)
            .unwrap_or(DEFAULT_SETTINGS_FILE),
    );

    // Write a default settings file and exit
    if cli_args.contains_key("init-config") {
        return match settings_file.create_json(&Settings::default()).await {
            Ok(()) => {
                println!("Wrote default settings to {}", settings_file.path().display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Unable to write {}: {}", settings_file.path().display(), e);
                ExitCode::FAILURE
            }
        };
    }

    let dotenv = dotenvy::dotenv();

    // Retrieve the settings file; every field has a default
    let settings_found = settings_file.exists().await;
    let mut settings = if settings_found {
        match settings_file.read_json::<Settings>().await {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Unable to read settings file: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        Settings::default()
    };
    if let Err(e) = settings.apply_env_vars() {
        eprintln!("Invalid environment: {}", e);
        return ExitCode::FAILURE;
    }

    // Initialize logging
    let _log_guard = match init_logging(settings.log_options()) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };
    match dotenv {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Ignoring unreadable .env file: {}", e),
    }
    if !settings_found {
        warn!(
            "No settings file at {}, using defaults",
            settings_file.path().display()
        );
    }

    let options = match settings.into_options() {
        Ok(options) => options,
        Err(e) => {
            error!("Invalid settings: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Validate configuration and backends, then exit
    if cli_args.contains_key("check-config") {
        return match AppState::init(&options) {
            Ok(_) => {
                info!("Configuration is valid");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Configuration is invalid: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    info!("Running pagedeploy with options: {:?}", options);
    match run(version.version, options, await_shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to run pagedeploy: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Unable to install signal handlers, falling back to Ctrl+C");
                    if tokio::signal::ctrl_c().await.is_err() {
                        error!("Failed to listen for Ctrl+C");
                    }
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            error!("Failed to listen for Ctrl+C");
        }
        info!("Ctrl+C received, shutting down...");
    }
}
