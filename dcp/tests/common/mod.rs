#![allow(dead_code)]

use dcp::{
    Asset, AssetKind, CertificateChain, ChainSubject, ContentKind, Cpl, Dcp, Fraction, Key, NameFormat, Reel,
    ReelAsset, Standard, XmlMetadata, essence::labels, utils,
};
use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
};

pub type TestResult<T = ()> = Result<T, Box<dyn Error>>;

pub static SIGNER: LazyLock<CertificateChain> =
    LazyLock::new(|| CertificateChain::generate(&ChainSubject::default()).unwrap());

pub static RECIPIENT: LazyLock<CertificateChain> = LazyLock::new(|| {
    CertificateChain::generate(&ChainSubject {
        organisation: "cinema.example.org".to_owned(),
        leaf_common_name: "SM.projector.NOT_FOR_PRODUCTION".to_owned(),
        ..Default::default()
    })
    .unwrap()
});

pub fn metadata() -> XmlMetadata {
    XmlMetadata::new("dcp tests", "dcp tests", "2013-01-01T00:00:00+00:00")
}

/// Write something an MXF probe will take for essence of the kind given by `label`.
pub fn fake_mxf(path: &Path, label: &[u8]) -> TestResult {
    let mut data = labels::PARTITION_PACK.to_vec();
    data.extend_from_slice(&[0; 51]);
    data.extend_from_slice(label);
    data.extend((0..16384_u32).map(|x| (x * 7 % 251) as u8));
    fs::write(path, data)?;
    Ok(())
}

/// The CPL of the reference package: one 24 frame reel of picture and sound.
pub fn reference_cpl(directory: &Path, key: Option<Key>) -> TestResult<Cpl> {
    let video = directory.join("video.mxf");
    let audio = directory.join("audio.mxf");
    fake_mxf(&video, &labels::JPEG_2000)?;
    fake_mxf(&audio, &labels::PCM)?;

    let picture = Arc::new(
        Asset::new(utils::make_uuid(), video, AssetKind::MonoPicture).with_timing(Fraction::new(24, 1), 24),
    );
    let sound =
        Arc::new(Asset::new(utils::make_uuid(), audio, AssetKind::Sound).with_timing(Fraction::new(24, 1), 24));

    let mut picture = ReelAsset::picture(picture, 0);
    let mut sound = ReelAsset::sound(sound, 0);
    if let Some(key) = key {
        picture = picture.with_key(key);
        sound = sound.with_key(key);
    }

    let mut cpl = Cpl::new("A Test DCP", ContentKind::Feature, metadata());
    cpl.add(Reel::new().with_picture(picture).with_sound(sound));
    Ok(cpl)
}

/// Author a complete package in `directory`.
pub fn reference_package(directory: &Path, standard: Standard) -> TestResult<Dcp> {
    let mut dcp = Dcp::new(directory)?;
    let cpl = reference_cpl(dcp.directory(), None)?;
    dcp.add(cpl);
    dcp.write_xml(standard, &metadata(), None, &NameFormat::default())?;
    Ok(dcp)
}

/// First file in `directory` whose name starts with `prefix`.
pub fn find(directory: &Path, prefix: &str) -> TestResult<PathBuf> {
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        if path
            .file_name()
            .is_some_and(|x| x.to_string_lossy().starts_with(prefix))
        {
            return Ok(path);
        }
    }

    Err(format!("no {prefix}* in {}", directory.display()).into())
}

/// Replace every `from` in a file with `to`.
pub fn edit(path: &Path, from: &str, to: &str) -> TestResult {
    let content = fs::read_to_string(path)?;
    assert!(content.contains(from), "'{from}' not found in {}", path.display());
    fs::write(path, content.replace(from, to))?;
    Ok(())
}
