mod common;

use common::{TestResult, edit, fake_mxf, find, metadata, reference_package};
use dcp::{
    Asset, AssetKind, ContentKind, Cpl, Dcp, EqualityOptions, Error, Fraction, NameFormat, NoteType, ReadOptions,
    Reel, ReelAsset, Standard, essence::MxfProbe, essence::labels, subtitle::InteropSubtitle, utils,
};
use std::{fs, path::Path, sync::Arc};

fn read(directory: &Path, keep_going: bool) -> dcp::Result<(Dcp, Vec<Error>)> {
    let mut dcp = Dcp::new(directory)?;
    let options = ReadOptions {
        keep_going,
        ..Default::default()
    };
    let errors = dcp.read(&options, &MxfProbe)?;
    Ok((dcp, errors))
}

fn copy_directory(from: &Path, to: &Path) -> TestResult {
    for entry in fs::read_dir(from)? {
        let path = entry?.path();
        if let Some(name) = path.file_name() {
            fs::copy(&path, to.join(name))?;
        }
    }
    Ok(())
}

#[test]
fn written_package_reads_back() -> TestResult {
    let dir = tempfile::tempdir()?;
    let written = reference_package(dir.path(), Standard::Smpte)?;

    let (dcp, errors) = read(dir.path(), false)?;
    assert!(errors.is_empty());
    assert_eq!(dcp.standard(), Some(Standard::Smpte));
    assert_eq!(dcp.cpls().len(), 1);
    assert_eq!(dcp.pkls().len(), 1);

    let cpl = &dcp.cpls()[0];
    assert_eq!(cpl.id, written.cpls()[0].id);
    assert_eq!(cpl.content_kind, ContentKind::Feature);
    assert_eq!(cpl.standard(), Some(Standard::Smpte));
    assert!(cpl.reel_assets().all(|x| x.resolved()));
    assert!(!dcp.encrypted()?);

    let pkl = &dcp.pkls()[0];
    for asset in cpl.reel_assets() {
        let asset = asset.asset().ok_or("unresolved")?;
        assert_eq!(pkl.hash(asset.id()), Some(utils::make_digest(asset.path(), None)?.as_str()));
    }

    // The CPL itself, picture and sound.
    assert_eq!(dcp.assets().len(), 3);
    Ok(())
}

#[test]
fn missing_assets_are_survivable() -> TestResult {
    let dir = tempfile::tempdir()?;
    reference_package(dir.path(), Standard::Smpte)?;
    fs::remove_file(dir.path().join("audio.mxf"))?;

    let (dcp, errors) = read(dir.path(), true)?;
    assert!(matches!(&errors[..], [Error::MissingAsset(x)] if x.ends_with("audio.mxf")));

    let cpl = &dcp.cpls()[0];
    assert_eq!(cpl.reel_assets().filter(|x| x.resolved()).count(), 1);

    let err = read(dir.path(), false).unwrap_err();
    assert!(matches!(err, Error::MissingAsset(_)));
    Ok(())
}

#[test]
fn unknown_reference_is_reported() -> TestResult {
    let dir = tempfile::tempdir()?;
    reference_package(dir.path(), Standard::Smpte)?;

    let cpl = find(dir.path(), "cpl_")?;
    let content = fs::read_to_string(&cpl)?;
    let start = content.find("<MainSound>").ok_or("no sound")?;
    let id_start = start + content[start..].find("urn:uuid:").ok_or("no id")? + "urn:uuid:".len();
    let id = &content[id_start..id_start + 36];
    edit(&cpl, &format!("<Id>urn:uuid:{id}"), "<Id>urn:uuid:00000000-0000-0000-0000-000000000000")?;

    let (_, errors) = read(dir.path(), true)?;
    assert!(
        matches!(&errors[..], [Error::UnresolvedReference { asset_id, .. }] if asset_id == "00000000-0000-0000-0000-000000000000"),
        "{errors:?}"
    );
    Ok(())
}

#[test]
fn packages_compare() -> TestResult {
    let a = tempfile::tempdir()?;
    let b = tempfile::tempdir()?;
    reference_package(a.path(), Standard::Smpte)?;
    copy_directory(a.path(), b.path())?;

    let (first, _) = read(a.path(), false)?;
    let (second, _) = read(b.path(), false)?;
    let options = EqualityOptions::default();
    let mut notes = vec![];
    assert!(first.equals(&second, &options, &mut |kind, note| notes.push((kind, note)))?);
    assert!(notes.is_empty(), "{notes:?}");

    edit(
        &find(b.path(), "cpl_")?,
        "<AnnotationText>A Test DCP</AnnotationText>",
        "<AnnotationText>Another DCP</AnnotationText>",
    )?;
    let (second, _) = read(b.path(), false)?;

    assert!(!first.equals(&second, &options, &mut |kind, note| notes.push((kind, note)))?);
    assert_eq!(notes.pop().map(|x| x.0), Some(NoteType::Error));

    let lenient = EqualityOptions {
        cpl_annotation_texts_can_differ: true,
        ..Default::default()
    };
    assert!(first.equals(&second, &lenient, &mut |_, _| {})?);

    let empty = Dcp::new(tempfile::tempdir()?.path())?;
    notes.clear();
    assert!(!first.equals(&empty, &options, &mut |kind, note| notes.push((kind, note)))?);
    assert_eq!(notes, [(NoteType::Error, "CPL counts differ: 1 vs 0".to_owned())]);
    Ok(())
}

#[test]
fn interop_subtitle_brings_its_font() -> TestResult {
    let dir = tempfile::tempdir()?;
    let mut dcp = Dcp::new(dir.path())?;
    let root = dcp.directory().to_owned();

    let subtitle_id = utils::make_uuid();
    fs::write(
        root.join("subs.xml"),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<DCSubtitle Version="1.0">
  <SubtitleID>{subtitle_id}</SubtitleID>
  <MovieTitle>A Test DCP</MovieTitle>
  <ReelNumber>1</ReelNumber>
  <Language>French</Language>
  <LoadFont Id="theFont" URI="font.ttf"/>
</DCSubtitle>
"#
        ),
    )?;
    fs::write(root.join("font.ttf"), b"not really a font")?;
    fake_mxf(&root.join("video.mxf"), &labels::JPEG_2000)?;

    let fonts = InteropSubtitle::read(&root.join("subs.xml"))?.fonts;
    let subtitle = Arc::new(
        Asset::new(
            subtitle_id.as_str(),
            root.join("subs.xml"),
            AssetKind::Subtitle {
                standard: Standard::Interop,
                fonts,
            },
        )
        .with_timing(Fraction::new(24, 1), 24),
    );
    let picture = Arc::new(
        Asset::new(utils::make_uuid(), root.join("video.mxf"), AssetKind::MonoPicture)
            .with_timing(Fraction::new(24, 1), 24),
    );

    let mut cpl = Cpl::new("A Test DCP", ContentKind::Feature, metadata());
    cpl.add(
        Reel::new()
            .with_picture(ReelAsset::picture(picture, 0))
            .with_subtitle(ReelAsset::subtitle(subtitle, 0)),
    );
    dcp.add(cpl);

    // CPL, picture, subtitle and font.
    assert_eq!(dcp.assets().len(), 4);
    let font_id = |dcp: &Dcp| {
        dcp.assets()
            .iter()
            .find(|x| matches!(x.kind(), AssetKind::Font))
            .map(|x| x.id().to_owned())
    };
    let font = font_id(&dcp).ok_or("no font asset")?;
    assert_eq!(font_id(&dcp).as_deref(), Some(font.as_str()));
    dcp.write_xml(Standard::Interop, &metadata(), None, &NameFormat::default())?;

    let asset_map = fs::read_to_string(root.join("ASSETMAP"))?;
    assert!(asset_map.contains("<Path>font.ttf</Path>"));
    assert!(asset_map.contains(&font));
    assert!(fs::read_to_string(find(&root, "pkl_")?)?.contains(&font));

    let (read, errors) = read(&root, false)?;
    assert!(errors.is_empty());
    assert!(read.cpls()[0].reel_assets().all(|x| x.resolved()));

    let assets = read.assets();
    assert_eq!(assets.len(), 4);
    let font = assets
        .iter()
        .find(|x| matches!(x.kind(), AssetKind::Font))
        .ok_or("no font")?;
    assert_eq!(font.path(), root.join("font.ttf"));
    Ok(())
}

#[test]
fn interop_subtitle_in_smpte_package() -> TestResult {
    let dir = tempfile::tempdir()?;
    reference_package(dir.path(), Standard::Smpte)?;

    // Sneak a DCSubtitle into the AssetMap.
    let id = utils::make_uuid();
    fs::write(
        dir.path().join("subs.xml"),
        format!("<DCSubtitle Version=\"1.0\"><SubtitleID>{id}</SubtitleID></DCSubtitle>"),
    )?;
    edit(
        &dir.path().join("ASSETMAP.xml"),
        "</AssetList>",
        &format!(
            "<Asset><Id>urn:uuid:{id}</Id><ChunkList><Chunk><Path>subs.xml</Path></Chunk></ChunkList></Asset></AssetList>"
        ),
    )?;

    let (_, errors) = read(dir.path(), true)?;
    assert!(
        matches!(
            &errors[..],
            [Error::MismatchedStandard {
                expected: Standard::Smpte,
                found: Standard::Interop,
                ..
            }]
        ),
        "{errors:?}"
    );
    Ok(())
}
