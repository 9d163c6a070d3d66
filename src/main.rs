use autoroute::cli::run_cli;
use autoroute::logging::{init_logging, LogConfig};

fn main() -> anyhow::Result<()> {
    init_logging(&LogConfig::from_env())?;
    run_cli()
}
