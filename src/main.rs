mod browser;
mod cli;
mod error;
mod proxy;
mod scraper;
mod storage;
mod utils;

use anyhow::Result;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::parse_args();

    utils::init_logging(args.verbose, args.log_file.clone())?;

    info!("Starting snatch v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = cli::process_command(args).await {
        error!("Error: {:#}", e);
        return Err(e);
    }

    Ok(())
}
