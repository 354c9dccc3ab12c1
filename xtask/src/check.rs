use anyhow::Result;
use colored::Colorize;
use std::time::Instant;

use crate::step::{cargo, lib_packages, Severity};
use crate::TARGET;

pub fn run() -> Result<()> {
    println!();
    println!("{}", "🔍 Checking library crates...".cyan().bold());
    println!();

    let total_start = Instant::now();
    let packages = lib_packages();

    // Check 1: bare-metal target, no logging backend
    let mut args = vec!["check", "--target", TARGET];
    args.extend(&packages);
    cargo(&format!("Checking {TARGET} (no_std)"), &args, Severity::Fatal)?;

    // Check 2: bare-metal target with defmt
    args.extend(["--features", "cache/defmt,transfer/defmt"]);
    cargo(&format!("Checking {TARGET} with defmt"), &args, Severity::Fatal)?;

    // Check 3: host with tracing and mocks
    let mut args = vec!["check", "--features", "cache/tracing,transfer/tracing,transfer/std"];
    args.extend(&packages);
    cargo("Checking host build with tracing", &args, Severity::Fatal)?;

    // Check 4: Clippy lints
    cargo(
        "Running clippy",
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
        Severity::Advisory,
    )?;

    // Check 5: Format check
    let fmt = cargo("Checking formatting", &["fmt", "--all", "--check"], Severity::Advisory)?;
    if !fmt.status.success() {
        eprintln!("     Run 'cargo fmt --all' to fix");
        println!();
    }

    println!(
        "{}",
        format!(
            "✓ All checks completed in {:.2}s",
            total_start.elapsed().as_secs_f64()
        )
        .green()
        .bold()
    );
    println!();

    Ok(())
}
