mod cli;

use clap::Parser;
use cli::{Cli, Commands, ConfigArgs};
use probekit::config::Config;
use probekit::observability;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    observability::init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config(args) => show_config(args)?,
    }

    Ok(())
}

fn show_config(args: ConfigArgs) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = match args.path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let rendered = config.to_toml_string()?;

    match args.output {
        Some(output) => {
            std::fs::write(&output, rendered)?;
            tracing::info!(path = %output.display(), "Configuration written");
        }
        None => print!("{}", rendered),
    }

    Ok(())
}
