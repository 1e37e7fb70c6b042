use anyhow::{Result, bail};
use clap::Args;
use dcp::{CancellationToken, VerificationNote, VerificationNoteType, VerifyOptions};
use kdam::{BarExt, Column, RichProgress, term::Colorizer, tqdm};
use std::{path::PathBuf, sync::Mutex};

/// Check packages for missing or corrupt files and inconsistent metadata.
#[derive(Debug, Clone, Args)]
pub struct Verify {
    /// Package directories to check.
    #[arg(required = true)]
    directories: Vec<PathBuf>,

    /// Number of threads used to digest essence files.
    /// By default one thread per CPU is used.
    #[arg(short, long, default_value_t = 0)]
    threads: usize,

    /// Print the notes as a json array instead of text.
    #[arg(long)]
    json: bool,

    /// Do not show a progress bar.
    #[arg(long)]
    no_progress: bool,
}

impl Verify {
    pub fn execute(self) -> Result<()> {
        let cancel = CancellationToken::new();
        let handler_token = cancel.clone();
        ctrlc::set_handler(move || handler_token.cancel())?;

        let options = VerifyOptions {
            threads: self.threads,
            cancel: Some(cancel),
            ..Default::default()
        };

        let show_progress = !self.json && !self.no_progress;
        let pb = Mutex::new(RichProgress::new(
            tqdm!(total = 1000, disable = !show_progress),
            vec![
                Column::Animation,
                Column::Percentage(1),
                Column::Text("•".to_owned()),
                Column::ElapsedTime,
            ],
        ));

        let mut stage = |name: &str, path: Option<&std::path::Path>| {
            let message = match path {
                Some(path) => format!("{} {}", name.colorize("bold green"), path.display()),
                None => name.colorize("bold green"),
            };

            if let Ok(mut pb) = pb.lock() {
                if show_progress {
                    let _ = pb.write(message);
                    let _ = pb.update_to(0);
                } else if !self.json {
                    println!("{message}");
                }
            }
        };
        let progress = |fraction: f32| {
            if show_progress && let Ok(mut pb) = pb.lock() {
                let _ = pb.update_to((fraction * 1000.0) as usize);
            }
        };

        let notes = dcp::verify_with(&self.directories, &mut stage, &progress, &options)?;
        if let Ok(mut pb) = pb.lock() {
            let _ = pb.clear();
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&notes)?);
        } else {
            print_notes(&notes);
        }

        let errors = notes
            .iter()
            .filter(|x| x.type_ == VerificationNoteType::Error)
            .count();
        if errors > 0 {
            bail!("verification found {errors} error(s)");
        }

        Ok(())
    }
}

fn print_notes(notes: &[VerificationNote]) {
    if notes.is_empty() {
        println!("{} no problems found", "Done".colorize("bold green"));
        return;
    }

    for note in notes {
        let label = match note.type_ {
            VerificationNoteType::Error => "Error".colorize("bold red"),
            VerificationNoteType::Warning => "Warning".colorize("bold yellow"),
        };
        println!("{label} {note}");
    }
}
