use std::env;
use std::error::Error;

use clap::Parser;
use dualsense_hub::cli::{self, Args, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let log_level = match env::var("LOG_LEVEL") {
        Ok(value) => value,
        Err(_) => "info".to_string(),
    };
    env::set_var("RUST_LOG", log_level);
    env_logger::init();

    let args = Args::parse();
    let settings = cli::load_settings(args.config.as_ref())?;
    let cmd = args.cmd.unwrap_or(Commands::Run);

    if matches!(cmd, Commands::Run) {
        const VERSION: &str = env!("CARGO_PKG_VERSION");
        log::info!("Starting dualsense-hub v{}", VERSION);
    }
    cli::main_cli(settings, cmd).await?;

    Ok(())
}
