use anyhow::{Context, Result};
use colored::Colorize;
use std::process::{Command, Output};
use std::time::Instant;

/// Whether a failing step aborts the task or only warns.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fatal,
    Advisory,
}

/// Run `cargo <args>`, printing a progress line and the elapsed time.
///
/// Returns the captured output on success (or on advisory failure).
pub fn cargo(label: &str, args: &[&str], severity: Severity) -> Result<Output> {
    println!("{}", format!("  {label}...").cyan());
    let start = Instant::now();

    let output = Command::new("cargo")
        .args(args)
        .output()
        .with_context(|| format!("Failed to run {label}"))?;

    if output.status.success() {
        println!(
            "{}",
            format!("  ✓ {label} passed in {:.2}s", start.elapsed().as_secs_f64()).green()
        );
        println!();
        return Ok(output);
    }

    match severity {
        Severity::Fatal => {
            eprintln!("{}", format!("  ✗ {label} failed").red().bold());
            eprintln!();
            eprintln!("{}", String::from_utf8_lossy(&output.stderr));
            for line in String::from_utf8_lossy(&output.stdout).lines() {
                eprintln!("  {line}");
            }
            anyhow::bail!("{label} failed");
        }
        Severity::Advisory => {
            eprintln!("{}", format!("  ⚠ {label} reported problems").yellow().bold());
            eprintln!();
            eprintln!("{}", String::from_utf8_lossy(&output.stderr));
            println!();
            Ok(output)
        }
    }
}

/// `-p <crate>` for every library crate.
pub fn lib_packages() -> Vec<&'static str> {
    crate::LIB_CRATES
        .iter()
        .flat_map(|name| ["-p", *name])
        .collect()
}
