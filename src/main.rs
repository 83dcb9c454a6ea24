mod app;
mod cli;
mod config;
mod error;
mod model;
mod providers;
mod util;

use std::process::ExitCode;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::ZohoError;

fn init_tracing(debug: bool) {
    let fallback = if debug { "zpanel=debug" } else { "zpanel=info" };
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|raw| {
            let raw = raw.trim();
            if raw.is_empty() {
                return None;
            }
            EnvFilter::try_new(raw).ok()
        })
        .unwrap_or_else(|| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let command = match cli::parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let config = match config::load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.debug);
    tracing::debug!(?config, "configuration loaded");

    let service = providers::create_service(&config);
    match cli::run(command, &config, service).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<ZohoError>() {
                Some(zoho) => eprintln!("Error: {}", zoho.report(config.debug)),
                None => eprintln!("Error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
