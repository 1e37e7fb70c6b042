mod chain;
mod diff;
mod info;
mod kdm;
mod verify;

pub use chain::Chain;
pub use diff::Diff;
pub use info::Info;
pub use kdm::Kdm;
pub use verify::Verify;

use clap::{ArgAction, ColorChoice, Parser, Subcommand};

/// Verify, compare and key Digital Cinema Packages.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// When to output colored text.
    #[arg(long, global = true, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Log more; repeat for debug and trace output.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    Chain(Chain),
    Diff(Diff),
    Info(Info),
    Kdm(Kdm),
    Verify(Verify),
}
