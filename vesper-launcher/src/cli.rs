use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    #[arg(long, default_value = "config.yaml")]
    pub config: PathBuf,
}
