use anyhow::Result;
use colored::Colorize;
use std::time::Instant;

use crate::step::{cargo, lib_packages, Severity};

pub fn run(unit_only: bool, integration_only: bool) -> Result<()> {
    println!();
    println!("{}", "🧪 Running tests...".cyan().bold());
    println!();

    let total_start = Instant::now();
    let packages = lib_packages();

    let run_unit = !integration_only;
    let run_integration = !unit_only;

    // Test 1: Unit tests (mocks are compiled in under cfg(test))
    if run_unit {
        let mut args = vec!["test", "--lib"];
        args.extend(&packages);
        let output = cargo("Unit tests", &args, Severity::Fatal)?;
        print_summary(&output.stdout);
    }

    // Test 2: Integration and property tests under tests/
    if run_integration {
        let mut args = vec!["test", "--tests"];
        args.extend(&packages);
        let output = cargo("Integration tests", &args, Severity::Fatal)?;
        print_summary(&output.stdout);
    }

    // Test 3: Doc tests
    let mut args = vec!["test", "--doc"];
    args.extend(&packages);
    let output = cargo("Doc tests", &args, Severity::Advisory)?;
    if output.status.success() {
        print_summary(&output.stdout);
    }

    println!(
        "{}",
        format!(
            "✓ All tests completed in {:.2}s",
            total_start.elapsed().as_secs_f64()
        )
        .green()
        .bold()
    );
    println!();

    Ok(())
}

fn print_summary(stdout: &[u8]) {
    let output = String::from_utf8_lossy(stdout);
    println!("    {}", extract_test_summary(&output).dimmed());
    println!();
}

fn extract_test_summary(output: &str) -> String {
    // Look for lines like "test result: ok. 5 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out"
    for line in output.lines() {
        if line.contains("test result:") {
            if let Some(summary) = line.split("test result:").nth(1) {
                return summary.trim().to_string();
            }
        }
    }
    "(summary not available)".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_is_taken_from_result_line() {
        let out = "running 3 tests\ntest result: ok. 3 passed; 0 failed\n";
        assert_eq!(extract_test_summary(out), "ok. 3 passed; 0 failed");
        assert_eq!(extract_test_summary("nothing"), "(summary not available)");
    }
}
