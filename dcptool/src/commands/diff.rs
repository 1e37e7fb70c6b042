use anyhow::{Result, bail};
use clap::Args;
use dcp::{Dcp, EqualityOptions, NoteType, ReadOptions, essence::MxfProbe};
use kdam::term::Colorizer;
use std::path::{Path, PathBuf};

/// Compare two packages.
#[derive(Debug, Clone, Args)]
pub struct Diff {
    /// First package directory.
    a: PathBuf,

    /// Second package directory.
    b: PathBuf,

    /// Maximum allowed mean pixel error between picture frames.
    #[arg(long, default_value_t = 5.0)]
    mean_pixel: f64,

    /// Maximum allowed standard deviation of pixel error between picture frames.
    #[arg(long, default_value_t = 5.0)]
    std_dev_pixel: f64,

    /// Maximum allowed difference between audio samples.
    #[arg(long, default_value_t = 0)]
    audio_sample: i32,

    /// Allow CPL annotation texts to differ.
    #[arg(long)]
    cpl_annotation_texts: bool,

    /// Allow reel annotation texts to differ.
    #[arg(long)]
    reel_annotation_texts: bool,

    /// Require the asset hashes recorded in the CPLs to match.
    #[arg(long)]
    strict_reel_hashes: bool,

    /// Carry on comparing (and reading) after the first difference.
    #[arg(short, long)]
    keep_going: bool,

    /// Show notes as well as errors.
    #[arg(long)]
    notes: bool,
}

impl Diff {
    pub fn execute(self) -> Result<()> {
        let a = self.read(&self.a)?;
        let b = self.read(&self.b)?;

        let options = EqualityOptions {
            max_mean_pixel_error: self.mean_pixel,
            max_std_dev_pixel_error: self.std_dev_pixel,
            max_audio_sample_error: self.audio_sample,
            cpl_annotation_texts_can_differ: self.cpl_annotation_texts,
            reel_annotation_texts_can_differ: self.reel_annotation_texts,
            reel_hashes_can_differ: !self.strict_reel_hashes,
            keep_going: self.keep_going,
        };

        let same = a.equals(&b, &options, &mut |kind, message| match kind {
            NoteType::Error => println!("{} {message}", "Error".colorize("bold red")),
            NoteType::Note if self.notes => println!("{} {message}", "Note".colorize("cyan")),
            NoteType::Note => (),
            NoteType::Progress => log::debug!("{message}"),
        })?;

        if !same {
            bail!("packages differ");
        }

        println!("{} packages are identical", "Done".colorize("bold green"));
        Ok(())
    }

    fn read(&self, directory: &Path) -> Result<Dcp> {
        let mut dcp = Dcp::new(directory)?;
        let options = ReadOptions {
            keep_going: self.keep_going,
            ..Default::default()
        };

        for error in dcp.read(&options, &MxfProbe)? {
            println!("{} {error}", "Warning".colorize("bold yellow"));
        }

        Ok(dcp)
    }
}
