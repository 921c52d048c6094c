use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct StowageArgs {
    /// YAML file with the service, metadata, auth and blob store settings
    #[arg(short, long, env = "STOWAGE_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,
}
