mod common;

use common::{TestResult, edit, find, reference_package};
use dcp::{
    CancellationToken, Error, Standard, VerificationNote, VerificationNoteCode as Code, VerificationNoteType,
    VerifyOptions, verify, verify_with,
};
use std::{
    fs::{self, OpenOptions},
    io::{Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

fn run(directory: &Path) -> TestResult<(Vec<(String, Option<PathBuf>)>, Vec<VerificationNote>)> {
    let mut stages = vec![];
    let notes = verify(
        &[directory.to_owned()],
        &mut |name, path| stages.push((name.to_owned(), path.map(|x| x.to_owned()))),
        &|_| {},
    )?;
    Ok((stages, notes))
}

fn codes(notes: &[VerificationNote]) -> Vec<Code> {
    notes.iter().map(|x| x.code).collect()
}

fn corrupt(path: &Path) -> TestResult {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(4096))?;
    file.write_all(&42_i32.to_le_bytes())?;
    Ok(())
}

#[test]
fn intact_package_has_no_notes() -> TestResult {
    let dir = tempfile::tempdir()?;
    reference_package(dir.path(), Standard::Smpte)?;
    let root = fs::canonicalize(dir.path())?;
    let cpl = find(&root, "cpl_")?;

    let (stages, notes) = run(dir.path())?;

    assert_eq!(
        stages,
        [
            ("Checking DCP".to_owned(), Some(root.clone())),
            ("Checking CPL".to_owned(), Some(cpl)),
            ("Checking reel".to_owned(), None),
            ("Checking picture asset hash".to_owned(), Some(root.join("video.mxf"))),
            ("Checking sound asset hash".to_owned(), Some(root.join("audio.mxf"))),
        ]
    );
    assert!(notes.is_empty(), "{notes:?}");
    Ok(())
}

#[test]
fn corrupt_essence() -> TestResult {
    let dir = tempfile::tempdir()?;
    reference_package(dir.path(), Standard::Smpte)?;
    corrupt(&dir.path().join("video.mxf"))?;
    corrupt(&dir.path().join("audio.mxf"))?;

    let (_, notes) = run(dir.path())?;

    assert_eq!(codes(&notes), [Code::PictureHashIncorrect, Code::SoundHashIncorrect]);
    assert!(notes.iter().all(|x| x.type_ == VerificationNoteType::Error));
    assert_eq!(notes[0].file, Some(fs::canonicalize(dir.path().join("video.mxf"))?));
    Ok(())
}

#[test]
fn corrupt_picture_only() -> TestResult {
    let dir = tempfile::tempdir()?;
    reference_package(dir.path(), Standard::Smpte)?;
    corrupt(&dir.path().join("video.mxf"))?;

    let (_, notes) = run(dir.path())?;

    assert_eq!(codes(&notes), [Code::PictureHashIncorrect]);
    assert_eq!(notes[0].type_, VerificationNoteType::Error);
    assert_eq!(notes[0].file, Some(fs::canonicalize(dir.path().join("video.mxf"))?));
    Ok(())
}

#[test]
fn corrupt_pkl_hashes() -> TestResult {
    let dir = tempfile::tempdir()?;
    reference_package(dir.path(), Standard::Smpte)?;
    edit(&find(dir.path(), "pkl_")?, "<Hash>", "<Hash>x")?;

    let (_, notes) = run(dir.path())?;

    assert_eq!(
        codes(&notes),
        [
            Code::CplHashIncorrect,
            Code::PklCplPictureHashesDisagree,
            Code::PklCplSoundHashesDisagree
        ]
    );
    Ok(())
}

#[test]
fn bad_content_kind() -> TestResult {
    let dir = tempfile::tempdir()?;
    reference_package(dir.path(), Standard::Smpte)?;
    edit(&find(dir.path(), "cpl_")?, "<ContentKind>", "<ContentKind>x")?;

    let (_, notes) = run(dir.path())?;

    assert_eq!(codes(&notes), [Code::GeneralRead]);
    assert_eq!(notes[0].note.as_deref(), Some("Bad content kind 'xfeature'"));
    Ok(())
}

#[test]
fn invalid_frame_rate() -> TestResult {
    let dir = tempfile::tempdir()?;
    reference_package(dir.path(), Standard::Smpte)?;
    edit(&find(dir.path(), "cpl_")?, "<FrameRate>24 1", "<FrameRate>99 1")?;

    let (_, notes) = run(dir.path())?;

    assert_eq!(codes(&notes), [Code::CplHashIncorrect, Code::InvalidPictureFrameRate]);
    Ok(())
}

#[test]
fn missing_essence() -> TestResult {
    let dir = tempfile::tempdir()?;
    reference_package(dir.path(), Standard::Smpte)?;
    fs::remove_file(dir.path().join("video.mxf"))?;

    let (stages, notes) = run(dir.path())?;

    assert_eq!(codes(&notes), [Code::MissingAsset]);
    assert_eq!(notes[0].type_, VerificationNoteType::Error);
    assert!(!stages.iter().any(|(x, _)| x == "Checking picture asset hash"));
    Ok(())
}

#[test]
fn empty_asset_path() -> TestResult {
    let dir = tempfile::tempdir()?;
    reference_package(dir.path(), Standard::Smpte)?;
    edit(&dir.path().join("ASSETMAP.xml"), "<Path>video.mxf</Path>", "<Path></Path>")?;

    let (_, notes) = run(dir.path())?;

    assert_eq!(codes(&notes), [Code::EmptyAssetPath]);
    assert_eq!(notes[0].type_, VerificationNoteType::Warning);
    Ok(())
}

#[test]
fn mismatched_standard() -> TestResult {
    let dir = tempfile::tempdir()?;
    reference_package(dir.path(), Standard::Smpte)?;
    edit(
        &find(dir.path(), "cpl_")?,
        "http://www.smpte-ra.org/schemas/429-7/2006/CPL",
        "http://www.digicine.com/PROTO-ASDCP-CPL-20040511#",
    )?;

    let (_, notes) = run(dir.path())?;

    assert_eq!(codes(&notes), [Code::MismatchedStandard, Code::CplHashIncorrect]);
    assert_eq!(notes[0].type_, VerificationNoteType::Error);
    Ok(())
}

#[test]
fn interop_package_is_intact() -> TestResult {
    let dir = tempfile::tempdir()?;
    reference_package(dir.path(), Standard::Interop)?;
    assert!(dir.path().join("ASSETMAP").exists());
    assert!(dir.path().join("VOLINDEX").exists());

    let (_, notes) = run(dir.path())?;
    assert!(notes.is_empty(), "{notes:?}");
    Ok(())
}

#[test]
fn several_packages_in_order() -> TestResult {
    let a = tempfile::tempdir()?;
    let b = tempfile::tempdir()?;
    reference_package(a.path(), Standard::Smpte)?;
    reference_package(b.path(), Standard::Smpte)?;
    fs::remove_file(b.path().join("audio.mxf"))?;

    let options = VerifyOptions {
        threads: 2,
        ..Default::default()
    };
    let notes = verify_with(
        &[a.path().to_owned(), b.path().to_owned()],
        &mut |_, _| {},
        &|_| {},
        &options,
    )?;

    assert_eq!(codes(&notes), [Code::MissingAsset]);
    assert_eq!(notes[0].file, Some(fs::canonicalize(b.path())?.join("audio.mxf")));
    Ok(())
}

#[test]
fn cancelled_verification() -> TestResult {
    let dir = tempfile::tempdir()?;
    reference_package(dir.path(), Standard::Smpte)?;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let options = VerifyOptions {
        cancel: Some(cancel),
        ..Default::default()
    };

    let result = verify_with(&[dir.path().to_owned()], &mut |_, _| {}, &|_| {}, &options);
    assert!(matches!(result, Err(Error::Cancelled)));
    Ok(())
}
