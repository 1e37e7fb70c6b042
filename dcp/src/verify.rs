//! Consistency checks over finished packages.
//!
//! [`verify`] reads each package, then walks every CPL and reel in order,
//! checking the digests recorded in the PKL and CPL against each other and
//! against the files on disk. Problems are returned as notes; verification
//! itself never stops at the first one.

use crate::{
    Error, Result,
    cancel::CancellationToken,
    dcp::{Dcp, ReadOptions},
    essence::{EssenceProbe, MxfProbe},
    reel::{ReelAsset, ReelAssetKind},
    utils,
};
use rayon::prelude::*;
use serde::Serialize;
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationNoteType {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationNoteCode {
    /// The package could not be read at all.
    GeneralRead,
    /// The CPL file does not match the digest in the PKL.
    CplHashIncorrect,
    InvalidPictureFrameRate,
    /// A picture file does not match the digest in the PKL.
    PictureHashIncorrect,
    /// The CPL and PKL record different digests for a picture asset.
    PklCplPictureHashesDisagree,
    SoundHashIncorrect,
    PklCplSoundHashesDisagree,
    /// An AssetMap entry has an empty `<Path>`.
    EmptyAssetPath,
    MissingAsset,
    MismatchedStandard,
    UnresolvedReference,
    /// A reel asset plays for less than one second.
    DurationTooSmall,
    IntrinsicDurationTooSmall,
}

impl VerificationNoteCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GeneralRead => "GENERAL_READ",
            Self::CplHashIncorrect => "CPL_HASH_INCORRECT",
            Self::InvalidPictureFrameRate => "INVALID_PICTURE_FRAME_RATE",
            Self::PictureHashIncorrect => "PICTURE_HASH_INCORRECT",
            Self::PklCplPictureHashesDisagree => "PKL_CPL_PICTURE_HASHES_DISAGREE",
            Self::SoundHashIncorrect => "SOUND_HASH_INCORRECT",
            Self::PklCplSoundHashesDisagree => "PKL_CPL_SOUND_HASHES_DISAGREE",
            Self::EmptyAssetPath => "EMPTY_ASSET_PATH",
            Self::MissingAsset => "MISSING_ASSET",
            Self::MismatchedStandard => "MISMATCHED_STANDARD",
            Self::UnresolvedReference => "UNRESOLVED_REFERENCE",
            Self::DurationTooSmall => "DURATION_TOO_SMALL",
            Self::IntrinsicDurationTooSmall => "INTRINSIC_DURATION_TOO_SMALL",
        }
    }
}

impl fmt::Display for VerificationNoteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One problem found by [`verify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationNote {
    #[serde(rename = "type")]
    pub type_: VerificationNoteType,
    pub code: VerificationNoteCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl VerificationNote {
    pub fn error(code: VerificationNoteCode) -> Self {
        Self {
            type_: VerificationNoteType::Error,
            code,
            note: None,
            file: None,
        }
    }

    pub fn warning(code: VerificationNoteCode) -> Self {
        Self {
            type_: VerificationNoteType::Warning,
            ..Self::error(code)
        }
    }

    pub fn with_note<T: Into<String>>(mut self, note: T) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_file<T: Into<PathBuf>>(mut self, file: T) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl fmt::Display for VerificationNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if let Some(note) = &self.note {
            write!(f, ": {note}")?;
        }
        if let Some(file) = &self.file {
            write!(f, " ({})", file.display())?;
        }
        Ok(())
    }
}

/// How [`verify_with`] does its work.
#[derive(Clone, Default)]
pub struct VerifyOptions {
    /// Number of threads used to compute digests; 0 means one per CPU.
    pub threads: usize,
    pub cancel: Option<CancellationToken>,
    /// Classifies MXF files; [`MxfProbe`] if not set.
    pub probe: Option<Arc<dyn EssenceProbe>>,
}

impl fmt::Debug for VerifyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifyOptions")
            .field("threads", &self.threads)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

/// Verify packages with the default options.
///
/// `stage` is told about each step as it starts, with the file it concerns
/// if there is one. `progress` receives the fraction of each digest done.
/// Problems with the packages come back as notes; an error means verification
/// itself could not run, e.g. the digest thread pool could not be built.
pub fn verify(
    directories: &[PathBuf],
    stage: &mut dyn FnMut(&str, Option<&Path>),
    progress: &(dyn Fn(f32) + Sync),
) -> Result<Vec<VerificationNote>> {
    verify_with(directories, stage, progress, &VerifyOptions::default())
}

/// Verify packages, returning [`Error::Cancelled`] if `options.cancel` is cancelled.
pub fn verify_with(
    directories: &[PathBuf],
    stage: &mut dyn FnMut(&str, Option<&Path>),
    progress: &(dyn Fn(f32) + Sync),
    options: &VerifyOptions,
) -> Result<Vec<VerificationNote>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.threads)
        .build()?;
    let check = || match &options.cancel {
        Some(x) => x.check(),
        None => Ok(()),
    };

    let default_probe = MxfProbe;
    let probe = options.probe.as_deref().unwrap_or(&default_probe);

    let mut notes = vec![];

    for directory in directories {
        check()?;

        let mut dcp = match Dcp::new(directory) {
            Ok(x) => x,
            Err(e) => {
                notes.push(VerificationNote::error(VerificationNoteCode::GeneralRead).with_note(e.to_string()));
                continue;
            }
        };
        stage("Checking DCP", Some(dcp.directory()));

        let read_options = ReadOptions {
            keep_going: true,
            ..Default::default()
        };

        match dcp.read(&read_options, probe) {
            Ok(errors) => notes.extend(errors.into_iter().map(read_note)),
            Err(e) => {
                notes.push(VerificationNote::error(VerificationNoteCode::GeneralRead).with_note(e.to_string()));
                continue;
            }
        }

        // Digest everything up front; the walk below then finds them memoized.
        let assets = dcp
            .cpls()
            .iter()
            .flat_map(|x| x.reel_assets())
            .filter_map(|x| x.asset().cloned())
            .collect::<Vec<_>>();
        pool.install(|| {
            assets.par_iter().try_for_each(|x| {
                check()?;
                if let Err(e) = x.digest_with_progress(Some(progress)) {
                    log::debug!("could not digest {}: {e}", x.path().display());
                }
                Ok::<_, Error>(())
            })
        })?;

        for cpl in dcp.cpls() {
            check()?;
            stage("Checking CPL", cpl.file());

            if let Some(file) = cpl.file() {
                for pkl in dcp.pkls() {
                    let Some(hash) = pkl.hash(&cpl.id) else {
                        continue;
                    };
                    match utils::make_digest(file, None) {
                        Ok(x) if x == hash => {}
                        Ok(_) => notes.push(
                            VerificationNote::error(VerificationNoteCode::CplHashIncorrect).with_file(file),
                        ),
                        Err(e) => notes.push(
                            VerificationNote::error(VerificationNoteCode::GeneralRead)
                                .with_note(e.to_string())
                                .with_file(file),
                        ),
                    }
                }
            }

            for reel in &cpl.reels {
                check()?;
                stage("Checking reel", None);

                for asset in reel.assets() {
                    notes.extend(check_durations(asset));
                }

                if let Some(picture) = &reel.main_picture {
                    if !picture.frame_rate_allowed() {
                        let rate = match &picture.kind {
                            ReelAssetKind::Picture { frame_rate, .. } => frame_rate.to_string(),
                            _ => String::new(),
                        };
                        notes.push(
                            VerificationNote::error(VerificationNoteCode::InvalidPictureFrameRate)
                                .with_note(format!("{rate} frame rate")),
                        );
                    }

                    if let Some(asset) = picture.asset() {
                        stage("Checking picture asset hash", Some(asset.path()));
                        notes.extend(check_hash(
                            &dcp,
                            picture,
                            VerificationNoteCode::PictureHashIncorrect,
                            VerificationNoteCode::PklCplPictureHashesDisagree,
                        ));
                    }
                }

                if let Some(sound) = &reel.main_sound
                    && let Some(asset) = sound.asset()
                {
                    check()?;
                    stage("Checking sound asset hash", Some(asset.path()));
                    notes.extend(check_hash(
                        &dcp,
                        sound,
                        VerificationNoteCode::SoundHashIncorrect,
                        VerificationNoteCode::PklCplSoundHashesDisagree,
                    ));
                }
            }
        }
    }

    Ok(notes)
}

fn read_note(error: Error) -> VerificationNote {
    use VerificationNoteCode as Code;

    match error {
        Error::MissingAsset(path) => VerificationNote::error(Code::MissingAsset).with_file(path),
        Error::EmptyAssetPath(id) => VerificationNote::warning(Code::EmptyAssetPath).with_note(id),
        Error::MismatchedStandard { path, .. } => VerificationNote::error(Code::MismatchedStandard).with_file(path),
        e @ Error::UnresolvedReference { .. } => {
            VerificationNote::error(Code::UnresolvedReference).with_note(e.to_string())
        }
        e => VerificationNote::error(Code::GeneralRead).with_note(e.to_string()),
    }
}

// The PKL is the reference: a CPL which disagrees with it is reported
// before the file itself is looked at.
fn check_hash(
    dcp: &Dcp,
    reel_asset: &ReelAsset,
    incorrect: VerificationNoteCode,
    disagree: VerificationNoteCode,
) -> Option<VerificationNote> {
    let asset = reel_asset.asset()?;
    let pkl_hash = dcp.pkls().iter().find_map(|x| x.hash(asset.id()))?;

    if let Some(cpl_hash) = &reel_asset.hash
        && cpl_hash.trim() != pkl_hash
    {
        return Some(VerificationNote::error(disagree).with_file(asset.path()));
    }

    match asset.digest() {
        Ok(x) if x == pkl_hash => None,
        Ok(_) => Some(VerificationNote::error(incorrect).with_file(asset.path())),
        Err(e) => Some(
            VerificationNote::error(VerificationNoteCode::GeneralRead)
                .with_note(e.to_string())
                .with_file(asset.path()),
        ),
    }
}

fn check_durations(asset: &ReelAsset) -> Vec<VerificationNote> {
    let seconds = |frames: i64| frames * asset.edit_rate.denominator / asset.edit_rate.numerator.max(1);
    let mut notes = vec![];

    if let Some(duration) = asset.duration
        && seconds(duration) < 1
    {
        notes.push(
            VerificationNote::error(VerificationNoteCode::DurationTooSmall)
                .with_note(format!("asset {} duration is {duration} frames", asset.id)),
        );
    }

    if seconds(asset.intrinsic_duration) < 1 {
        notes.push(
            VerificationNote::error(VerificationNoteCode::IntrinsicDurationTooSmall).with_note(format!(
                "asset {} intrinsic duration is {} frames",
                asset.id, asset.intrinsic_duration
            )),
        );
    }

    notes
}
