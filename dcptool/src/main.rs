mod commands;
mod logger;

use clap::{ColorChoice, Parser};
use commands::{Args, Commands};
use kdam::{term, term::Colorizer};
use logger::Logger;
use std::{
    io::{IsTerminal, stderr},
    process,
};

fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let color = match args.color {
        ColorChoice::Always => true,
        ColorChoice::Auto => stderr().is_terminal(),
        ColorChoice::Never => false,
    };
    term::init(color);
    colored::control::set_override(color);
    Logger::init(args.verbose, args.quiet)?;

    match args.command {
        Commands::Chain(args) => args.execute()?,
        Commands::Diff(args) => args.execute()?,
        Commands::Info(args) => args.execute()?,
        Commands::Kdm(args) => args.execute()?,
        Commands::Verify(args) => args.execute()?,
    }

    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".colorize("bold red"), e);
        process::exit(1);
    }
}
