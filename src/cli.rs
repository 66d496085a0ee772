use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "probekit")]
#[command(about = "probekit CLI", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the effective configuration and print it as TOML
    Config(ConfigArgs),
}

#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// Load this file instead of `PROBEKIT_CONFIG` / `config/probekit.toml`
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Write the rendered configuration here instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
}
