//! Comparison of the essence behind two reel assets.

use crate::{
    NoteType, Result, Standard,
    asset::{Asset, AssetKind},
    types::EqualityOptions,
    xml::{Element, Node},
};

/// Decides whether the files behind two assets hold the same content.
///
/// A comparator which decodes pictures and sound can use the pixel and sample
/// tolerances in [`EqualityOptions`]; [`DigestComparator`] cannot, so for it
/// any byte difference is a difference.
pub trait EssenceComparator: Send + Sync {
    fn compare(
        &self,
        a: &Asset,
        b: &Asset,
        options: &EqualityOptions,
        note: &mut dyn FnMut(NoteType, String),
    ) -> Result<bool>;
}

/// Compares essence by digest, and Interop subtitles node by node.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestComparator;

impl EssenceComparator for DigestComparator {
    fn compare(
        &self,
        a: &Asset,
        b: &Asset,
        _options: &EqualityOptions,
        note: &mut dyn FnMut(NoteType, String),
    ) -> Result<bool> {
        if std::mem::discriminant(a.kind()) != std::mem::discriminant(b.kind()) {
            note(NoteType::Error, format!("asset kinds differ ({} vs {})", a.id(), b.id()));
            return Ok(false);
        }

        if a.edit_rate() != b.edit_rate() {
            note(NoteType::Error, "asset edit rates differ".to_owned());
            return Ok(false);
        }

        if a.intrinsic_duration() != b.intrinsic_duration() {
            note(NoteType::Error, "asset intrinsic durations differ".to_owned());
            return Ok(false);
        }

        if let (
            AssetKind::Subtitle {
                standard: Standard::Interop,
                ..
            },
            AssetKind::Subtitle {
                standard: Standard::Interop,
                ..
            },
        ) = (a.kind(), b.kind())
        {
            let a_root = Element::read_file(a.path())?;
            let b_root = Element::read_file(b.path())?;
            return Ok(compare_nodes(&a_root, &b_root, "", note));
        }

        note(
            NoteType::Progress,
            format!("comparing {} and {}", a.path().display(), b.path().display()),
        );

        if a.digest()? != b.digest()? {
            let what = match a.kind() {
                AssetKind::MonoPicture | AssetKind::StereoPicture => "picture",
                AssetKind::Sound => "sound",
                AssetKind::Subtitle { .. } => "subtitle",
                AssetKind::Font => "font",
                AssetKind::Cpl => "CPL",
            };
            note(NoteType::Error, format!("{what} data differ"));
            return Ok(false);
        }

        Ok(true)
    }
}

/// Compare two element trees, noting the first difference found.
///
/// `SubtitleID` is ignored, since two copies of a subtitle file are expected
/// to differ only in their id.
pub fn compare_nodes(
    a: &Element,
    b: &Element,
    path: &str,
    note: &mut dyn FnMut(NoteType, String),
) -> bool {
    let path = format!("{path}/{}", a.local_name());

    if a.local_name() != b.local_name() {
        note(
            NoteType::Error,
            format!("subtitle nodes differ: {path} vs {}", b.local_name()),
        );
        return false;
    }

    if a.local_name() == "SubtitleID" {
        return true;
    }

    let mut a_attributes = a.attributes.clone();
    let mut b_attributes = b.attributes.clone();
    a_attributes.sort();
    b_attributes.sort();
    if a_attributes != b_attributes {
        note(NoteType::Error, format!("subtitle attributes differ at {path}"));
        return false;
    }

    if a.text().trim() != b.text().trim() {
        note(
            NoteType::Error,
            format!("subtitle text differs at {path}: {} vs {}", a.text().trim(), b.text().trim()),
        );
        return false;
    }

    let a_children = a.children.iter().filter(|x| matches!(x, Node::Element(_))).count();
    let b_children = b.children.iter().filter(|x| matches!(x, Node::Element(_))).count();
    if a_children != b_children {
        note(NoteType::Error, format!("subtitle node counts differ at {path}"));
        return false;
    }

    a.elements()
        .zip(b.elements())
        .all(|(x, y)| compare_nodes(x, y, &path, note))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn node_diff() {
        let a = Element::parse(r#"<DCSubtitle><SubtitleID>a</SubtitleID><Text V="1">hi</Text></DCSubtitle>"#).unwrap();
        let b = Element::parse(r#"<DCSubtitle><SubtitleID>b</SubtitleID><Text V="1">hi</Text></DCSubtitle>"#).unwrap();
        let c = Element::parse(r#"<DCSubtitle><SubtitleID>a</SubtitleID><Text V="2">hi</Text></DCSubtitle>"#).unwrap();

        let mut notes = vec![];
        assert!(compare_nodes(&a, &b, "", &mut |_, x| notes.push(x)));
        assert!(!compare_nodes(&a, &c, "", &mut |_, x| notes.push(x)));
        assert_eq!(notes, ["subtitle attributes differ at /DCSubtitle/Text"]);
    }

    #[test]
    fn digests_decide() {
        let dir = tempfile::tempdir().unwrap();
        let (x, y, z) = (dir.path().join("x"), dir.path().join("y"), dir.path().join("z"));
        fs::write(&x, b"one").unwrap();
        fs::write(&y, b"one").unwrap();
        fs::write(&z, b"two").unwrap();

        let x = Asset::new("1", x, AssetKind::Sound);
        let y = Asset::new("2", y, AssetKind::Sound);
        let z = Asset::new("3", z, AssetKind::Sound);
        let options = EqualityOptions::default();

        let mut notes = vec![];
        let mut note = |t: NoteType, s: String| notes.push((t, s));
        assert!(DigestComparator.compare(&x, &y, &options, &mut note).unwrap());
        assert!(!DigestComparator.compare(&x, &z, &options, &mut note).unwrap());
        assert!(notes.contains(&(NoteType::Error, "sound data differ".to_owned())));
    }
}
