use clap::Parser;
use log::info;
use sn2n::config::ServerConfig;
use sn2n::server::{AppState, serve};
use std::env;
use std::error::Error;

#[derive(Parser)]
#[command(author, version, about = "HTML-to-Notion conversion service", long_about = None)]
struct Cli {
    /// Notion API token (or set NOTION_TOKEN environment variable)
    #[arg(short, long)]
    token: Option<String>,

    /// Port to listen on (or set SN2N_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // CLI overrides land in the environment before config is read.
    if let Some(token) = &cli.token {
        unsafe { env::set_var("NOTION_TOKEN", token) };
    }
    if let Some(port) = cli.port {
        unsafe { env::set_var("SN2N_PORT", port.to_string()) };
    }
    if cli.verbose {
        unsafe { env::set_var("SN2N_VERBOSE", "1") };
    }

    let config = ServerConfig::from_env()?;

    let mut builder = env_logger::Builder::from_default_env();
    if config.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    } else if env::var("RUST_LOG").is_err() {
        builder.filter_level(log::LevelFilter::Info);
    }
    builder.init();

    info!(
        "sn2n {} starting (Notion API version {}, strict traversal {})",
        sn2n::VERSION,
        config.notion_version,
        if config.strict_order { "on" } else { "default" }
    );

    let state = AppState::new(config)?;
    serve(state).await?;

    Ok(())
}
