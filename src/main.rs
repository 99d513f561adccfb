use bookcache_engine::cli::Cli;
use clap::Parser;
use log::info;
use std::process::ExitCode as ProcessExitCode;

#[tokio::main]
async fn main() -> ProcessExitCode {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    info!("Starting bookcache-engine...");
    let cli = Cli::parse();

    match bookcache_engine::run(cli).await {
        Ok(code) => ProcessExitCode::from(code as u8),
        Err(e) => {
            log::error!("{e:#}");
            ProcessExitCode::from(bookcache_engine::cli::ExitCode::ConfigError as u8)
        }
    }
}
