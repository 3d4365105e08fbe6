mod args;
mod output;
mod runner;
mod server;

use anyhow::Result;
use clap::Parser;
use patchscout_telemetry::init_logging;

use args::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    match cli.command {
        Commands::Serve(args) => server::serve(args).await?,
        Commands::Scan(args) => runner::run_scan(args).await?,
        Commands::Tools(args) => runner::list_tools(&args)?,
        Commands::CveImport { file, database_url } => {
            runner::import_cves(&file, &database_url).await?
        }
    }

    Ok(())
}
