#![allow(missing_docs)]

mod generate_dedx;

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;

/// Configuration flags shared by every subcommand.
#[derive(Parser)]
pub struct GlobalConfiguration {
    /// Suppress progress messages written to stderr.
    #[arg(long)]
    pub quiet: bool,
}

/// Behaviour common to every subcommand: run it against the shared
/// configuration and report an exit code.
///
/// A single subcommand doesn't yet justify an `enum_dispatch`-based
/// dispatcher; a plain match in [`SubcommandEnum::run`] does the same job
/// without the extra dependency.
pub trait Subcommand {
    /// Runs the subcommand.
    ///
    /// # Errors
    ///
    /// Propagates whatever the subcommand itself fails with.
    fn run(&self, cfg: &GlobalConfiguration) -> Result<ExitCode>;
}

#[derive(Parser)]
pub enum SubcommandEnum {
    GenerateDedx(generate_dedx::Opts),
}

impl SubcommandEnum {
    /// Dispatches to the selected subcommand's [`Subcommand::run`].
    ///
    /// # Errors
    ///
    /// Propagates whatever the selected subcommand fails with.
    pub fn run(&self, cfg: &GlobalConfiguration) -> Result<ExitCode> {
        match self {
            Self::GenerateDedx(opts) => opts.run(cfg),
        }
    }
}

#[derive(Parser)]
#[command(arg_required_else_help = true, author, about, disable_help_subcommand = true, name = "pumas")]
pub struct Opts {
    #[command(flatten)]
    pub configuration: GlobalConfiguration,
    #[command(subcommand)]
    pub subcommand: SubcommandEnum,
}
