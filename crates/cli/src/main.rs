use std::process::ExitCode;

use shopmate_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use shopmate_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

fn main() -> ExitCode {
    // Commands report config errors themselves; logging falls back to defaults.
    let config = AppConfig::load(LoadOptions::default()).unwrap_or_default();
    init_logging(&config);

    tracing::debug!(event_name = "system.cli.started", correlation_id = "cli", "shopmate cli started");
    shopmate_cli::run()
}
