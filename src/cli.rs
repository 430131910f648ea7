//! Command-line entry point: resolves a config path and runs the server.
//!
//! Follows the teacher's `structopt`-derived CLI shape (`src/cli.rs`); there is no
//! customer/merchant subcommand split here since this crate has one binary and one
//! mode of operation.

use std::path::PathBuf;

use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "relaylinkd", about = "A framed message-passing TCP server")]
pub struct Cli {
    /// Path to the TOML config file. Defaults to the per-OS config directory.
    #[structopt(long, short = "c")]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn config_path(&self) -> Result<PathBuf, anyhow::Error> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => crate::defaults::config_path(),
        }
    }
}
