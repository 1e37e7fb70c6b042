use crate::{
    Error, Fraction, NoteType, ParsePolicy, Result, Standard,
    asset::{Asset, AssetKind},
    compare::EssenceComparator,
    key::Key,
    types::EqualityOptions,
    utils,
    xml::Element,
};
use std::sync::Arc;

const STEREO_NS_SMPTE: &str = "http://www.smpte-ra.org/schemas/429-10/2008/Main-Stereo-Picture-CPL";
const STEREO_NS_INTEROP: &str = "http://www.digicine.com/schemas/437-Y/2007/Main-Stereo-Picture-CPL";

/// Aspect ratios an Interop `<ScreenAspectRatio>` may hold.
const INTEROP_ASPECT_RATIOS: [f32; 6] = [1.33, 1.66, 1.77, 1.85, 2.00, 2.39];

/// Frame rates a picture asset may declare.
const ALLOWED_FRAME_RATES: [i64; 7] = [24, 25, 30, 48, 50, 60, 96];

const COMMON_ELEMENTS: [&str; 8] = [
    "Id",
    "AnnotationText",
    "EditRate",
    "IntrinsicDuration",
    "EntryPoint",
    "Duration",
    "KeyId",
    "Hash",
];

/// Kind-specific part of a [`ReelAsset`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReelAssetKind {
    Picture {
        stereo: bool,
        frame_rate: Fraction,
        screen_aspect_ratio: Fraction,
    },
    Sound {
        language: Option<String>,
    },
    Subtitle {
        language: Option<String>,
    },
}

impl ReelAssetKind {
    /// Name of the element describing this asset in a CPL `<AssetList>`.
    pub fn cpl_node_name(&self) -> &'static str {
        match self {
            Self::Picture { stereo: false, .. } => "MainPicture",
            Self::Picture { stereo: true, .. } => "MainStereoscopicPicture",
            Self::Sound { .. } => "MainSound",
            Self::Subtitle { .. } => "MainSubtitle",
        }
    }

    /// Four-character key type written into KDMs for this kind of asset.
    pub fn key_type(&self) -> &'static str {
        match self {
            Self::Picture { .. } => "MDIK",
            Self::Sound { .. } => "MDAK",
            Self::Subtitle { .. } => "MDSK",
        }
    }

    fn specific_elements(&self) -> &'static [&'static str] {
        match self {
            Self::Picture { .. } => &["FrameRate", "ScreenAspectRatio"],
            Self::Sound { .. } | Self::Subtitle { .. } => &["Language"],
        }
    }
}

/// A reference from a reel to an asset, with the part of it to play.
///
/// The reference is unresolved (only [`id`](Self::id) is known) until
/// [`resolve`](Self::resolve) finds the asset itself.
#[derive(Debug, Clone)]
pub struct ReelAsset {
    pub id: String,
    pub kind: ReelAssetKind,
    pub annotation_text: Option<String>,
    pub edit_rate: Fraction,
    pub intrinsic_duration: i64,
    pub entry_point: Option<i64>,
    pub duration: Option<i64>,
    /// Digest of the asset as recorded in the CPL.
    pub hash: Option<String>,
    pub key_id: Option<String>,
    /// Content key, once known from a KDM or when authoring.
    pub key: Option<Key>,
    asset: Option<Arc<Asset>>,
}

impl ReelAsset {
    /// A reference to all of `asset` starting at `entry_point`.
    ///
    /// An entry point past the end of the asset gives a duration of 0.
    pub fn new(asset: Arc<Asset>, kind: ReelAssetKind, entry_point: i64) -> Self {
        Self {
            id: asset.id().to_owned(),
            kind,
            annotation_text: None,
            edit_rate: asset.edit_rate(),
            intrinsic_duration: asset.intrinsic_duration(),
            entry_point: Some(entry_point),
            duration: Some((asset.intrinsic_duration() - entry_point).max(0)),
            hash: None,
            key_id: None,
            key: None,
            asset: Some(asset),
        }
    }

    /// A reference to a picture asset with the usual 24 fps and 1.85:1 flat framing.
    pub fn picture(asset: Arc<Asset>, entry_point: i64) -> Self {
        let stereo = matches!(asset.kind(), AssetKind::StereoPicture);
        let kind = ReelAssetKind::Picture {
            stereo,
            frame_rate: asset.edit_rate(),
            screen_aspect_ratio: Fraction::new(1998, 1080),
        };
        Self::new(asset, kind, entry_point)
    }

    pub fn sound(asset: Arc<Asset>, entry_point: i64) -> Self {
        Self::new(asset, ReelAssetKind::Sound { language: None }, entry_point)
    }

    pub fn subtitle(asset: Arc<Asset>, entry_point: i64) -> Self {
        Self::new(asset, ReelAssetKind::Subtitle { language: None }, entry_point)
    }

    /// Mark this asset as encrypted with `key`, under a new key id.
    pub fn with_key(mut self, key: Key) -> Self {
        self.key_id = Some(utils::make_uuid());
        self.key = Some(key);
        self
    }

    pub fn asset(&self) -> Option<&Arc<Asset>> {
        self.asset.as_ref()
    }

    pub fn resolved(&self) -> bool {
        self.asset.is_some()
    }

    pub fn encrypted(&self) -> bool {
        self.key_id.is_some()
    }

    /// Point this reference at the asset in `assets` with the same id, if any.
    pub fn resolve(&mut self, assets: &[Arc<Asset>]) -> bool {
        if let Some(asset) = assets.iter().find(|x| x.id() == self.id) {
            self.asset = Some(asset.clone());
        }

        self.resolved()
    }

    /// Whether `<FrameRate>` is one of the rates a projection server must accept.
    pub fn frame_rate_allowed(&self) -> bool {
        match &self.kind {
            ReelAssetKind::Picture { frame_rate, .. } => {
                frame_rate.denominator == 1 && ALLOWED_FRAME_RATES.contains(&frame_rate.numerator)
            }
            _ => true,
        }
    }

    pub(crate) fn read(node: &Element, policy: ParsePolicy) -> Result<Self> {
        let kind = match node.local_name() {
            "MainPicture" | "MainStereoscopicPicture" => ReelAssetKind::Picture {
                stereo: node.local_name() == "MainStereoscopicPicture",
                frame_rate: node.string_child("FrameRate")?.parse()?,
                screen_aspect_ratio: read_aspect_ratio(node)?,
            },
            "MainSound" => ReelAssetKind::Sound {
                language: node.optional_string_child("Language"),
            },
            "MainSubtitle" => ReelAssetKind::Subtitle {
                language: node.optional_string_child("Language"),
            },
            x => {
                return Err(Error::UnexpectedElement {
                    parent: "AssetList".to_owned(),
                    element: x.to_owned(),
                });
            }
        };

        for child in node.elements() {
            let name = child.local_name();
            if !COMMON_ELEMENTS.contains(&name) && !kind.specific_elements().contains(&name) {
                unexpected(policy, node.local_name(), name)?;
            }
        }

        Ok(Self {
            id: utils::remove_urn_uuid(&node.string_child("Id")?),
            kind,
            annotation_text: node.optional_string_child("AnnotationText"),
            edit_rate: node.string_child("EditRate")?.parse()?,
            intrinsic_duration: node.number_child("IntrinsicDuration")?,
            entry_point: node.optional_number_child("EntryPoint")?,
            duration: node.optional_number_child("Duration")?,
            hash: node.optional_string_child("Hash"),
            key_id: node
                .optional_string_child("KeyId")
                .map(|x| utils::remove_urn_uuid(&x)),
            key: None,
            asset: None,
        })
    }

    pub(crate) fn write_to_cpl(&self, asset_list: &mut Element, standard: Standard) -> Result<()> {
        let hash = match (&self.hash, &self.asset) {
            (Some(hash), _) => Some(hash.clone()),
            (None, Some(asset)) => Some(asset.digest()?),
            (None, None) => None,
        };

        let node = match &self.kind {
            ReelAssetKind::Picture { stereo: true, .. } => {
                let namespace = match standard {
                    Standard::Interop => STEREO_NS_INTEROP,
                    Standard::Smpte => STEREO_NS_SMPTE,
                };
                let mut node = Element::new("msp-cpl:MainStereoscopicPicture");
                node.set_attribute("xmlns:msp-cpl", namespace);
                asset_list.push(node)
            }
            kind => asset_list.add_child(kind.cpl_node_name()),
        };

        node.add_text_child("Id", format!("urn:uuid:{}", self.id));
        if let Some(annotation_text) = &self.annotation_text {
            node.add_text_child("AnnotationText", annotation_text);
        }
        node.add_text_child("EditRate", self.edit_rate.to_string());
        node.add_text_child("IntrinsicDuration", self.intrinsic_duration.to_string());
        if let Some(entry_point) = self.entry_point {
            node.add_text_child("EntryPoint", entry_point.to_string());
        }
        if let Some(duration) = self.duration {
            node.add_text_child("Duration", duration.to_string());
        }
        if let Some(key_id) = &self.key_id {
            node.add_text_child("KeyId", format!("urn:uuid:{key_id}"));
        }
        if let Some(hash) = hash {
            node.add_text_child("Hash", hash);
        }

        match &self.kind {
            ReelAssetKind::Picture {
                frame_rate,
                screen_aspect_ratio,
                ..
            } => {
                node.add_text_child("FrameRate", frame_rate.to_string());
                let ratio = match standard {
                    Standard::Interop => interop_aspect_ratio(*screen_aspect_ratio),
                    Standard::Smpte => screen_aspect_ratio.to_string(),
                };
                node.add_text_child("ScreenAspectRatio", ratio);
            }
            ReelAssetKind::Sound { language } | ReelAssetKind::Subtitle { language } => {
                if let Some(language) = language {
                    node.add_text_child("Language", language);
                }
            }
        }

        Ok(())
    }

    /// Compare with another reference, reporting differences through `note`.
    ///
    /// With `options.keep_going` every difference is reported; otherwise the
    /// comparison stops at the first one.
    pub fn equals(
        &self,
        other: &ReelAsset,
        options: &EqualityOptions,
        comparator: &dyn EssenceComparator,
        note: &mut dyn FnMut(NoteType, String),
    ) -> Result<bool> {
        let name = self.kind.cpl_node_name();
        let mut errors = vec![];

        if self.annotation_text != other.annotation_text {
            let message = format!(
                "Reel {name}: annotation texts differ ({} vs {})",
                self.annotation_text.as_deref().unwrap_or_default(),
                other.annotation_text.as_deref().unwrap_or_default()
            );
            if options.reel_annotation_texts_can_differ {
                note(NoteType::Note, message);
            } else {
                errors.push(message);
            }
        }

        if self.kind.cpl_node_name() != other.kind.cpl_node_name() {
            errors.push(format!("Reel: asset kinds differ ({name} vs {})", other.kind.cpl_node_name()));
        }

        if self.edit_rate != other.edit_rate {
            errors.push(format!("Reel {name}: edit rates differ"));
        }

        if self.intrinsic_duration != other.intrinsic_duration {
            errors.push(format!(
                "Reel {name}: intrinsic durations differ ({} vs {})",
                self.intrinsic_duration, other.intrinsic_duration
            ));
        }

        if self.entry_point != other.entry_point {
            errors.push(format!("Reel {name}: entry points differ"));
        }

        if self.duration != other.duration {
            errors.push(format!("Reel {name}: durations differ"));
        }

        if self.hash != other.hash {
            let message = format!("Reel {name}: hashes differ");
            if options.reel_hashes_can_differ {
                note(NoteType::Note, message);
            } else {
                errors.push(message);
            }
        }

        if let (
            ReelAssetKind::Picture {
                frame_rate: a_rate,
                screen_aspect_ratio: a_ratio,
                ..
            },
            ReelAssetKind::Picture {
                frame_rate: b_rate,
                screen_aspect_ratio: b_ratio,
                ..
            },
        ) = (&self.kind, &other.kind)
        {
            if a_rate != b_rate {
                errors.push("frame rates differ in reel".to_owned());
            }

            if a_ratio != b_ratio {
                errors.push("screen aspect ratios differ in reel".to_owned());
            }
        }

        if !options.keep_going {
            errors.truncate(1);
        }

        let same = errors.is_empty();
        for message in errors {
            note(NoteType::Error, message);
        }

        if !same && !options.keep_going {
            return Ok(false);
        }

        if let (Some(a), Some(b)) = (&self.asset, &other.asset) {
            return Ok(comparator.compare(a, b, options, note)? && same);
        }

        Ok(same)
    }
}

/// A reel: at most one each of picture, sound and subtitle.
#[derive(Debug, Clone, Default)]
pub struct Reel {
    pub id: String,
    pub annotation_text: Option<String>,
    pub main_picture: Option<ReelAsset>,
    pub main_sound: Option<ReelAsset>,
    pub main_subtitle: Option<ReelAsset>,
}

impl Reel {
    pub fn new() -> Self {
        Self {
            id: utils::make_uuid(),
            ..Default::default()
        }
    }

    pub fn with_picture(mut self, asset: ReelAsset) -> Self {
        self.main_picture = Some(asset);
        self
    }

    pub fn with_sound(mut self, asset: ReelAsset) -> Self {
        self.main_sound = Some(asset);
        self
    }

    pub fn with_subtitle(mut self, asset: ReelAsset) -> Self {
        self.main_subtitle = Some(asset);
        self
    }

    /// Picture, sound and subtitle references in that order, skipping absent ones.
    pub fn assets(&self) -> impl Iterator<Item = &ReelAsset> {
        [&self.main_picture, &self.main_sound, &self.main_subtitle]
            .into_iter()
            .flatten()
    }

    pub fn assets_mut(&mut self) -> impl Iterator<Item = &mut ReelAsset> {
        [&mut self.main_picture, &mut self.main_sound, &mut self.main_subtitle]
            .into_iter()
            .flatten()
    }

    /// Resolve every reference against `assets`, returning the ids which could not be found.
    pub fn resolve_refs(&mut self, assets: &[Arc<Asset>]) -> Vec<String> {
        self.assets_mut()
            .filter_map(|x| (!x.resolve(assets)).then(|| x.id.clone()))
            .collect()
    }

    pub(crate) fn read(node: &Element, policy: ParsePolicy) -> Result<Self> {
        let mut reel = Self {
            id: utils::remove_urn_uuid(&node.string_child("Id")?),
            annotation_text: node.optional_string_child("AnnotationText"),
            ..Default::default()
        };

        for child in node.elements() {
            if !["Id", "AnnotationText", "AssetList"].contains(&child.local_name()) {
                unexpected(policy, "Reel", child.local_name())?;
            }
        }

        for child in node.required_child("AssetList")?.elements() {
            let slot = match child.local_name() {
                "MainPicture" | "MainStereoscopicPicture" => &mut reel.main_picture,
                "MainSound" => &mut reel.main_sound,
                "MainSubtitle" => &mut reel.main_subtitle,
                x => {
                    unexpected(policy, "AssetList", x)?;
                    continue;
                }
            };

            *slot = Some(ReelAsset::read(child, policy)?);
        }

        Ok(reel)
    }

    pub(crate) fn write_to_cpl(&self, reel_list: &mut Element, standard: Standard) -> Result<()> {
        let reel = reel_list.add_child("Reel");
        reel.add_text_child("Id", format!("urn:uuid:{}", self.id));
        if let Some(annotation_text) = &self.annotation_text {
            reel.add_text_child("AnnotationText", annotation_text);
        }

        let asset_list = reel.add_child("AssetList");
        for asset in self.assets() {
            asset.write_to_cpl(asset_list, standard)?;
        }

        Ok(())
    }

    pub fn equals(
        &self,
        other: &Reel,
        options: &EqualityOptions,
        comparator: &dyn EssenceComparator,
        note: &mut dyn FnMut(NoteType, String),
    ) -> Result<bool> {
        let pairs = [
            ("picture", &self.main_picture, &other.main_picture),
            ("sound", &self.main_sound, &other.main_sound),
            ("subtitle", &self.main_subtitle, &other.main_subtitle),
        ];

        let mut same = true;
        for (name, a, b) in pairs {
            let equal = match (a, b) {
                (Some(a), Some(b)) => a.equals(b, options, comparator, note)?,
                (None, None) => true,
                _ => {
                    note(NoteType::Error, format!("Reel: {name} assets differ"));
                    false
                }
            };

            if !equal {
                same = false;
                if !options.keep_going {
                    return Ok(false);
                }
            }
        }

        Ok(same)
    }
}

/// Nearest allowed Interop aspect ratio, as written in `<ScreenAspectRatio>`.
///
/// When two allowed ratios are equally close the smaller one is used.
pub fn interop_aspect_ratio(ratio: Fraction) -> String {
    let actual = ratio.numerator as f32 / ratio.denominator as f32;

    let mut closest = INTEROP_ASPECT_RATIOS[0];
    let mut error = (closest - actual).abs();
    for allowed in &INTEROP_ASPECT_RATIOS[1..] {
        let e = (allowed - actual).abs();
        if e < error {
            closest = *allowed;
            error = e;
        }
    }

    format!("{closest:.2}")
}

// SMPTE writes a fraction, Interop a decimal.
fn read_aspect_ratio(node: &Element) -> Result<Fraction> {
    let value = node.string_child("ScreenAspectRatio")?;
    if let Ok(fraction) = value.parse::<Fraction>() {
        return Ok(fraction);
    }

    let ratio = value.trim().parse::<f32>().map_err(|_| Error::BadValue {
        element: "ScreenAspectRatio".to_owned(),
        value: value.clone(),
    })?;
    Ok(Fraction::new((ratio * 1000.0).round() as i64, 1000))
}

pub(crate) fn unexpected(policy: ParsePolicy, parent: &str, element: &str) -> Result<()> {
    match policy {
        ParsePolicy::Strict => Err(Error::UnexpectedElement {
            parent: parent.to_owned(),
            element: element.to_owned(),
        }),
        ParsePolicy::Lenient => {
            log::warn!("ignoring unexpected <{element}> in <{parent}>");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(numerator: i64, denominator: i64, expected: &str) {
        assert_eq!(interop_aspect_ratio(Fraction::new(numerator, denominator)), expected);
    }

    #[test]
    fn aspect_ratio_snapping() {
        check(1998, 1080, "1.85");
        check(2048, 858, "2.39");

        check(1200, 1000, "1.33");
        check(1330, 1000, "1.33");
        check(1430, 1000, "1.33");

        check(1600, 1000, "1.66");
        check(1660, 1000, "1.66");
        check(1670, 1000, "1.66");

        check(1750, 1000, "1.77");
        check(1770, 1000, "1.77");
        check(1800, 1000, "1.77");

        check(1820, 1000, "1.85");
        check(1850, 1000, "1.85");
        check(1910, 1000, "1.85");

        check(1999, 1000, "2.00");
        check(2000, 1000, "2.00");
        check(2001, 1000, "2.00");

        check(2350, 1000, "2.39");
        check(2390, 1000, "2.39");
        check(2500, 1000, "2.39");
    }

    const PICTURE: &str = r#"<MainPicture>
  <Id>urn:uuid:46c3eb45-15e5-47d6-8684-d8641e4dc516</Id>
  <EditRate>24 1</EditRate>
  <IntrinsicDuration>24</IntrinsicDuration>
  <EntryPoint>0</EntryPoint>
  <Duration>24</Duration>
  <Hash>o0ZoqFvS5MRw6zWfKAXnfBi8Rgo=</Hash>
  <FrameRate>24 1</FrameRate>
  <ScreenAspectRatio>1.85</ScreenAspectRatio>
  <Extra/>
</MainPicture>"#;

    #[test]
    fn read_picture() {
        let node = Element::parse(PICTURE).unwrap();
        let asset = ReelAsset::read(&node, ParsePolicy::Lenient).unwrap();
        assert_eq!(asset.id, "46c3eb45-15e5-47d6-8684-d8641e4dc516");
        assert_eq!(asset.duration, Some(24));
        assert!(!asset.encrypted());
        assert!(asset.frame_rate_allowed());
        assert_eq!(
            asset.kind,
            ReelAssetKind::Picture {
                stereo: false,
                frame_rate: Fraction::new(24, 1),
                screen_aspect_ratio: Fraction::new(1850, 1000),
            }
        );

        assert!(matches!(
            ReelAsset::read(&node, ParsePolicy::Strict),
            Err(Error::UnexpectedElement { .. })
        ));
    }

    #[test]
    fn key_id_comes_before_hash() {
        let node = Element::parse(PICTURE).unwrap();
        let mut asset = ReelAsset::read(&node, ParsePolicy::Lenient).unwrap();
        asset.key_id = Some("1".to_owned());

        let mut list = Element::new("AssetList");
        asset.write_to_cpl(&mut list, Standard::Smpte).unwrap();
        let names = list
            .child("MainPicture")
            .unwrap()
            .elements()
            .map(|x| x.local_name().to_owned())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            [
                "Id",
                "EditRate",
                "IntrinsicDuration",
                "EntryPoint",
                "Duration",
                "KeyId",
                "Hash",
                "FrameRate",
                "ScreenAspectRatio"
            ]
        );
        assert_eq!(
            list.child("MainPicture").unwrap().string_child("ScreenAspectRatio").unwrap(),
            "1850 1000"
        );
    }

    #[test]
    fn frame_rates() {
        let node = Element::parse(&PICTURE.replace("<FrameRate>24 1", "<FrameRate>99 1")).unwrap();
        assert!(!ReelAsset::read(&node, ParsePolicy::Lenient).unwrap().frame_rate_allowed());
        let node = Element::parse(&PICTURE.replace("<FrameRate>24 1", "<FrameRate>48 1")).unwrap();
        assert!(ReelAsset::read(&node, ParsePolicy::Lenient).unwrap().frame_rate_allowed());
    }

    #[test]
    fn entry_point_past_the_end() {
        let asset = Arc::new(
            Asset::new(utils::make_uuid(), "video.mxf", AssetKind::MonoPicture).with_timing(Fraction::new(24, 1), 24),
        );
        assert_eq!(ReelAsset::picture(asset.clone(), 30).duration, Some(0));
        assert_eq!(ReelAsset::picture(asset, 6).duration, Some(18));
    }

    fn differences(keep_going: bool) -> (bool, Vec<String>) {
        let node = Element::parse(PICTURE).unwrap();
        let a = ReelAsset::read(&node, ParsePolicy::Lenient).unwrap();
        let mut b = a.clone();
        b.entry_point = Some(1);
        b.duration = Some(23);

        let options = EqualityOptions {
            keep_going,
            ..Default::default()
        };
        let mut notes = vec![];
        let same = a
            .equals(&b, &options, &crate::compare::DigestComparator, &mut |kind, message| {
                if kind == NoteType::Error {
                    notes.push(message);
                }
            })
            .unwrap();
        (same, notes)
    }

    #[test]
    fn keep_going_reports_every_difference() {
        let (same, notes) = differences(true);
        assert!(!same);
        assert_eq!(
            notes,
            ["Reel MainPicture: entry points differ", "Reel MainPicture: durations differ"]
        );

        let (same, notes) = differences(false);
        assert!(!same);
        assert_eq!(notes, ["Reel MainPicture: entry points differ"]);
    }
}
