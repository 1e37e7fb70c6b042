use anyhow::Result;
use clap::Args;
use dcp::{Cpl, Dcp, ReadOptions, ReelAssetKind, essence::MxfProbe};
use kdam::term::Colorizer;
use std::path::PathBuf;

/// Describe the compositions of a package.
#[derive(Debug, Clone, Args)]
pub struct Info {
    /// Package directory.
    directory: PathBuf,

    /// List every reel and its assets.
    #[arg(short, long)]
    reels: bool,
}

impl Info {
    pub fn execute(self) -> Result<()> {
        let mut dcp = Dcp::new(&self.directory)?;
        let options = ReadOptions {
            keep_going: true,
            ..Default::default()
        };

        for error in dcp.read(&options, &MxfProbe)? {
            println!("{} {error}", "Warning".colorize("bold yellow"));
        }

        println!("{} {}", "Package".colorize("cyan"), dcp.directory().display());
        if let Some(standard) = dcp.standard() {
            println!("{} {standard}", "Standard".colorize("cyan"));
        }
        println!("{} {}", "Encrypted".colorize("cyan"), dcp.encrypted()?);

        for cpl in dcp.cpls() {
            self.print_cpl(cpl);
        }

        Ok(())
    }

    fn print_cpl(&self, cpl: &Cpl) {
        let seconds = cpl
            .reels
            .iter()
            .filter_map(|x| x.main_picture.as_ref())
            .map(|x| x.duration.unwrap_or(x.intrinsic_duration) as f64 / x.edit_rate.as_f64())
            .sum::<f64>();

        println!();
        println!("{} {} ({})", "CPL".colorize("bold green"), cpl.content_title_text, cpl.id);
        println!("    {} {}", "Kind".colorize("cyan"), cpl.content_kind);
        println!("    {} {}", "Issued".colorize("cyan"), cpl.metadata.issue_date);
        println!("    {} {}", "Reels".colorize("cyan"), cpl.reels.len());
        println!("    {} {}", "Length".colorize("cyan"), timecode(seconds));

        if !self.reels {
            return;
        }

        for (index, reel) in cpl.reels.iter().enumerate() {
            println!("    {} {} ({})", "Reel".colorize("bold"), index + 1, reel.id);

            for asset in reel.assets() {
                let kind = match &asset.kind {
                    ReelAssetKind::Picture { stereo: true, .. } => "Stereo picture",
                    ReelAssetKind::Picture { .. } => "Picture",
                    ReelAssetKind::Sound { .. } => "Sound",
                    ReelAssetKind::Subtitle { .. } => "Subtitle",
                };

                let mut details = format!(
                    "{} frames at {} fps",
                    asset.duration.unwrap_or(asset.intrinsic_duration),
                    asset.edit_rate.as_f64()
                );
                if let ReelAssetKind::Picture { screen_aspect_ratio, .. } = &asset.kind {
                    details += &format!(", {:.2}:1", screen_aspect_ratio.as_f64());
                }
                if asset.key_id.is_some() {
                    details += ", encrypted";
                }
                if !asset.resolved() {
                    details += ", missing";
                }

                println!("        {} {} ({details})", kind.colorize("cyan"), asset.id);
            }
        }
    }
}

fn timecode(seconds: f64) -> String {
    let total = seconds.round() as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, total / 60 % 60, total % 60)
}
