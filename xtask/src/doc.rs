use anyhow::Result;
use colored::Colorize;

use crate::step::{cargo, lib_packages, Severity};

pub fn run(open: bool) -> Result<()> {
    println!();
    println!("{}", "📚 Building documentation...".cyan().bold());
    println!();

    let mut args = vec!["doc", "--no-deps", "--features", "transfer/std"];
    args.extend(lib_packages());
    if open {
        args.push("--open");
    }
    cargo("Documentation build", &args, Severity::Fatal)?;

    if !open {
        println!(
            "   {}",
            "Open target/doc/transfer/index.html in your browser".dimmed()
        );
        println!(
            "   {}",
            "Or run 'cargo run -p xtask -- doc --open'".dimmed()
        );
        println!();
    }

    Ok(())
}
