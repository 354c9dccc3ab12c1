// Desktop/tooling crate — unwrap/expect/panic acceptable in non-embedded code.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod check;
mod doc;
mod step;
mod test;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Bare-metal target the library crates must build for.
pub const TARGET: &str = "riscv32imac-unknown-none-elf";

/// Library crates of the workspace.
pub const LIB_CRATES: [&str; 2] = ["cache", "transfer"];

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Cache maintenance and transfer channel development tasks", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the library crates for the bare-metal target and the host
    Check,
    /// Run unit, integration and doc tests
    Test {
        /// Run only unit tests
        #[arg(long)]
        unit: bool,
        /// Run only integration tests
        #[arg(long)]
        integration: bool,
    },
    /// Build and optionally open documentation
    Doc {
        /// Open documentation in browser
        #[arg(long)]
        open: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => check::run(),
        Commands::Test { unit, integration } => test::run(unit, integration),
        Commands::Doc { open } => doc::run(open),
    }
}
