use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "gie-etl")]
#[command(about = "Boundary, landcover and integration steps for geospatial impact evaluation data")]
pub struct CliConfig {
    /// Path to the project TOML configuration
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: PathBuf,

    /// Explicit .env file (defaults to the nearest .env)
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose output", global = true)]
    pub verbose: bool,

    /// Override monitoring setting from config
    #[arg(long, global = true)]
    pub monitor: Option<bool>,

    /// Emit JSON log lines instead of the compact format
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Download geoBoundaries administrative boundaries
    Boundary,
    /// Download ESA landcover from the Climate Data Store and reclassify it
    Landcover,
    /// Randomly assign treatment to the child-level units
    Treatment,
    /// Join boundaries, treatment and landcover zonal statistics
    Integrate,
    /// Run boundary, landcover and integrate in order
    All,
    /// Validate configuration and credentials without processing anything
    Check,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Boundary => "boundary",
            Command::Landcover => "landcover",
            Command::Treatment => "treatment",
            Command::Integrate => "integrate",
            Command::All => "all",
            Command::Check => "check",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subcommand_with_global_flags() {
        let cli = CliConfig::parse_from(["gie-etl", "landcover", "-v", "--config", "conf/x.toml"]);
        assert_eq!(cli.command, Command::Landcover);
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("conf/x.toml"));
        assert_eq!(cli.monitor, None);
    }

    #[test]
    fn test_default_config_path() {
        let cli = CliConfig::parse_from(["gie-etl", "boundary"]);
        assert_eq!(cli.config, PathBuf::from("config.toml"));
        assert_eq!(cli.command.name(), "boundary");
    }
}
