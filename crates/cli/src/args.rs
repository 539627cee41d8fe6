//! mcc CLI arguments.

use clap::{ColorChoice, Parser, ValueHint};
use std::path::PathBuf;

/// Compiler and interpreter for the Mini-C language.
#[derive(Debug, Parser)]
#[command(name = "mcc", version, about)]
pub struct Args {
    /// Source file to compile and run.
    #[arg(value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    /// Stop after the given compiler stage instead of running the program.
    #[arg(long, value_enum)]
    pub stop_after: Option<CompilerStage>,
    /// Print the compiled bytecode before running.
    #[arg(long)]
    pub dump_bytecode: bool,

    /// Coloring.
    #[arg(long, value_enum, default_value_t)]
    pub color: ColorChoice,
    /// Use verbose output.
    #[arg(long, short)]
    pub verbose: bool,
}

/// A compiler stage to stop at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum CompilerStage {
    /// Lexing, parsing, type checking and bytecode emission.
    Parsing,
}

pub(crate) fn color_choice(color: ColorChoice) -> mcc_interface::ColorChoice {
    match color {
        ColorChoice::Auto => mcc_interface::ColorChoice::Auto,
        ColorChoice::Always => mcc_interface::ColorChoice::Always,
        ColorChoice::Never => mcc_interface::ColorChoice::Never,
    }
}
