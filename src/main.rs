mod cli;
mod engine;
mod error;
mod model;
mod orchestrator;
mod preview;
mod text_summary;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    // RUST_LOG wins over -v.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("imagecap={default_level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_logging(args.verbose);

    match cli::run(args).await {
        Ok(()) => {
            // Exit explicitly: an abandoned stdin reader would otherwise keep the runtime alive.
            std::process::exit(0);
        }
        Err(e) => Err(e),
    }
}
