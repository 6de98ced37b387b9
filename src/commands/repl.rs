// SPDX-License-Identifier: MIT OR Apache-2.0

//! Line-oriented question loop over one long-lived retriever

use anyhow::Result;
use colored::Colorize;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::Path;

use policy_rag::config::Config;

use crate::cli::OutputFormat;
use crate::commands::context::{print_grounding, unavailable};
use crate::commands::open_retriever;

/// Run the repl command
///
/// When no index can be opened, each question is answered as unavailable
/// and the next question tries to open it again.
pub fn run(config: &Config, out: Option<&Path>, k: Option<usize>, format: OutputFormat) -> Result<()> {
    let k = config.merge_k(k);
    let mut retriever = open_retriever(config, out);
    let interactive = io::stdin().is_terminal();

    if interactive {
        match &retriever {
            Ok(retriever) => println!(
                "{} {} chunks loaded, Ctrl+D to exit",
                "✓".green(),
                retriever.snapshot().current().len()
            ),
            Err(e) => println!("{} No index loaded yet: {:#}", "✗".red(), e),
        }
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        if interactive {
            print!("{} ", ">".cyan());
            io::stdout().flush()?;
        }
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let query = line.trim();
        if query.is_empty() {
            continue;
        }

        if retriever.is_err() {
            retriever = open_retriever(config, out);
        }
        let grounding = match &retriever {
            Ok(retriever) => {
                match retriever.reload_if_changed() {
                    Ok(true) => tracing::info!("picked up rebuilt index"),
                    Ok(false) => {}
                    Err(e) => tracing::warn!("keeping current index: {}", e),
                }
                retriever.ground(query, k)
            }
            Err(e) => unavailable(e),
        };

        if let Err(e) = print_grounding(&grounding, format) {
            eprintln!("{} {}", "✗".red(), e);
        }
        if format == OutputFormat::Text {
            println!();
        }
    }

    Ok(())
}
