//! Store and fetch records from the terminal
//!
//! With no action, reads one action per line from stdin until end of input:
//! ```text
//! PUT hello world
//!  - Created: 1
//! GET 1
//!  - hello world
//! ```
//! With an action on the command line, runs just that action.

#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use clap::Parser;
use tsq::controller::{Backend, Tsq};
use tsq_common::logging;

/// Store and fetch records from the terminal
#[derive(Parser, Debug)]
#[command(name = "tsq")]
#[command(about = "Record storage over interchangeable backends", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (otherwise `TSQ_CONFIG`, ./tsq.config.ron, then
    /// /etc/tsq/tsq.config.ron)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage backend to use instead of the configured one
    #[arg(short, long, value_enum)]
    backend: Option<Backend>,

    /// Run a single action, e.g. `PUT hello` or `GET 1`, and exit
    #[arg(trailing_var_arg = true)]
    action: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init();

    let mut tsq = Tsq::load(cli.config.as_deref())?;
    if let Some(backend) = cli.backend {
        tsq = tsq.with_backend(backend);
    }

    if cli.action.is_empty() {
        tsq.run().await?;
        // A pending stdin read sits on a blocking thread that would hold up
        // runtime shutdown until the next line arrives
        std::process::exit(0);
    }

    println!("{}", tsq.run_action(&cli.action.join(" ")).await?);
    Ok(())
}
