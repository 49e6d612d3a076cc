//! Command-line interface for Turnstile.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use turnstile_ir::Flavor;
use turnstile_lower::LoweringOptions;

#[derive(Parser)]
#[command(name = "turnstile")]
#[command(about = "Lowers generator methods into resumable state machines", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the synthesized state machine
    Lower {
        /// Generator file (JSON)
        file: PathBuf,
        #[command(flatten)]
        options: OptionFlags,
        /// Print the resume-state table as JSON instead of the machine
        #[arg(long)]
        debug_map: bool,
    },
    /// Lower the generator and iterate it on the reference runtime
    Run {
        /// Generator file (JSON)
        file: PathBuf,
        #[command(flatten)]
        options: OptionFlags,
        /// Integer argument passed to the generator, in order
        #[arg(long = "arg", value_name = "N")]
        args: Vec<i64>,
        /// Dispose the enumerator after this many values
        #[arg(long, value_name = "N")]
        dispose_after: Option<usize>,
    },
}

/// Flags that override the options stored in the generator file.
#[derive(Args, Debug, Default)]
pub struct OptionFlags {
    /// Lower to a re-iterable machine with GetEnumerator
    #[arg(long)]
    pub reiterable: bool,
    /// Link the token parameter with the token passed to GetEnumerator
    #[arg(long)]
    pub linked_cancellation: bool,
    /// Resume-state table of a previous compilation (as printed by `--debug-map`)
    #[arg(long, value_name = "FILE")]
    pub seed: Option<PathBuf>,
}

impl OptionFlags {
    pub fn apply(&self, options: &mut LoweringOptions) {
        if self.reiterable {
            options.flavor = Flavor::Reiterable;
        }
        if self.linked_cancellation {
            options.linked_cancellation = true;
        }
    }
}
