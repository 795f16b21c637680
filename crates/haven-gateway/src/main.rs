use anyhow::Result;
use clap::Parser;
use haven_gateway::{
    cli::{Cli, Commands},
    config::{init_config, load_config},
    server,
};
use haven_telemetry::TelemetryConfig;
use haven_utils::ShutdownController;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        log,
        config,
        command,
    } = Cli::parse();

    let config_path = config.parse::<PathBuf>()?;
    init_config(&config_path)?;
    let opts = match command {
        Commands::Init => return Ok(()),
        Commands::Daemon(opts) => opts,
    };
    let mut gateway_config = load_config(&config_path)?;
    gateway_config.merge_log_level(log);
    gateway_config.merge_daemon_opts(opts);

    let telemetry = &gateway_config.telemetry;
    let _guard = TelemetryConfig::new("haven-gateway")
        .with_log_level(&gateway_config.log_level)
        .with_json_log(telemetry.json_log)
        .with_tree_trace(telemetry.tree_trace)
        .with_chrome_trace(telemetry.chrome_trace)
        .with_jaeger_trace(telemetry.jaeger_trace)
        .with_tokio_console(telemetry.tokio_console)
        .init()?;

    let shutdown = ShutdownController::default();
    shutdown.install_ctrl_c_handler();

    let result = server::start(gateway_config, shutdown).await;
    TelemetryConfig::teardown();
    result
}
