//! Command line interface for the `pdumux` gateway binary.

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

/// Command line arguments for the `pdumux` binary.
#[derive(Debug, Parser)]
#[command(
    name = "pdumux",
    version,
    about = "Demultiplex PDUs received on shared TCP and UDP sockets"
)]
pub struct Cli {
    /// JSON gateway configuration.
    #[arg(short, long)]
    pub config: PathBuf,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,

    /// Period of the continuation driver, in milliseconds.
    #[arg(long, default_value_t = 10)]
    pub drive_interval_ms: u64,
}
