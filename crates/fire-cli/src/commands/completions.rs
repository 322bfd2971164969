//! Completions command - shell completion scripts for `fire`

use anyhow::{bail, Context, Result};
use clap::{Args, CommandFactory};
use clap_complete::{generate, generate_to, Shell};
use std::io;
use std::path::PathBuf;

use crate::args::Args as CliArgs;

/// Completions command arguments
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Target shell, detected from $SHELL when omitted
    #[arg(value_enum)]
    pub shell: Option<Shell>,

    /// Write the script into this directory instead of stdout
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,
}

/// Execute completions command
pub fn execute(args: &CompletionsArgs) -> Result<()> {
    let Some(shell) = args.shell.or_else(Shell::from_env) else {
        bail!("Cannot detect the shell from $SHELL; pass one explicitly");
    };

    let mut cmd = CliArgs::command();
    let bin = cmd.get_name().to_string();

    match &args.output {
        Some(dir) => {
            let path = generate_to(shell, &mut cmd, bin, dir).with_context(|| {
                format!("Failed to write {shell} completions to {}", dir.display())
            })?;
            println!("Completions written to {}", path.display());
        }
        None => generate(shell, &mut cmd, bin, &mut io::stdout()),
    }
    Ok(())
}
