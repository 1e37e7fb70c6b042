use crate::{
    ContentKind, Error, NoteType, ParsePolicy, Result, Standard, XmlMetadata,
    asset::{Asset, AssetKind},
    certificate_chain::CertificateChain,
    compare::EssenceComparator,
    kdm::DecryptedKdm,
    reel::{Reel, ReelAsset, ReelAssetKind, unexpected},
    types::EqualityOptions,
    utils,
    xml::Element,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

pub const CPL_NS_INTEROP: &str = "http://www.digicine.com/PROTO-ASDCP-CPL-20040511#";
pub const CPL_NS_SMPTE: &str = "http://www.smpte-ra.org/schemas/429-7/2006/CPL";

const KNOWN_ELEMENTS: [&str; 13] = [
    "Id",
    "AnnotationText",
    "IconId",
    "IssueDate",
    "Issuer",
    "Creator",
    "ContentTitleText",
    "ContentKind",
    "ContentVersion",
    "RatingList",
    "ReelList",
    "Signer",
    "Signature",
];

/// A composition playlist: one version of a title as an ordered list of reels.
#[derive(Debug, Clone)]
pub struct Cpl {
    pub id: String,
    pub annotation_text: String,
    pub metadata: XmlMetadata,
    pub content_title_text: String,
    pub content_kind: ContentKind,
    pub content_version_id: String,
    pub content_version_label_text: String,
    pub reels: Vec<Reel>,
    standard: Option<Standard>,
    file: Option<PathBuf>,
}

impl Cpl {
    pub fn new<T: Into<String>>(annotation_text: T, content_kind: ContentKind, metadata: XmlMetadata) -> Self {
        let annotation_text = annotation_text.into();
        let content_version_id = format!("urn:uuid:{}", utils::make_uuid());

        Self {
            id: utils::make_uuid(),
            content_title_text: annotation_text.clone(),
            annotation_text,
            metadata,
            content_kind,
            content_version_label_text: content_version_id.clone(),
            content_version_id,
            reels: vec![],
            standard: None,
            file: None,
        }
    }

    pub fn add(&mut self, reel: Reel) {
        self.reels.push(reel);
    }

    /// Standard of the file this CPL was read from.
    pub fn standard(&self) -> Option<Standard> {
        self.standard
    }

    /// File this CPL was read from or last written to.
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// This CPL as an asset of its package, once it has a file.
    pub fn as_asset(&self) -> Option<Arc<Asset>> {
        self.file
            .as_ref()
            .map(|x| Arc::new(Asset::new(self.id.as_str(), x, AssetKind::Cpl)))
    }

    /// Every asset reference in every reel, reel by reel.
    pub fn reel_assets(&self) -> impl Iterator<Item = &ReelAsset> {
        self.reels.iter().flat_map(|x| x.assets())
    }

    pub fn reel_assets_mut(&mut self) -> impl Iterator<Item = &mut ReelAsset> {
        self.reels.iter_mut().flat_map(|x| x.assets_mut())
    }

    /// Whether the picture and sound in this CPL are encrypted.
    ///
    /// Either all of them carry a key id or none do; anything else is
    /// [`Error::MixedEncryption`]. Subtitles may be encrypted or not.
    pub fn encrypted(&self) -> Result<bool> {
        let essence = self
            .reel_assets()
            .filter(|x| !matches!(x.kind, ReelAssetKind::Subtitle { .. }))
            .map(|x| x.encrypted())
            .collect::<Vec<_>>();

        if essence.iter().all(|x| *x) && !essence.is_empty() {
            Ok(true)
        } else if essence.iter().any(|x| *x) {
            Err(Error::MixedEncryption(self.id.clone()))
        } else {
            Ok(self.reel_assets().any(|x| x.encrypted()))
        }
    }

    /// Resolve reel references against `assets`, returning the ids not found.
    pub fn resolve_refs(&mut self, assets: &[Arc<Asset>]) -> Vec<String> {
        self.reels
            .iter_mut()
            .flat_map(|x| x.resolve_refs(assets))
            .collect()
    }

    /// Attach the content keys in `kdm` which are meant for this CPL.
    ///
    /// Keys for other CPLs, or for key ids this CPL does not use, are ignored.
    /// Returns the number of reel assets given a key.
    pub fn add_kdm(&mut self, kdm: &DecryptedKdm) -> usize {
        let mut added = 0;

        let id = self.id.clone();
        for key in kdm.keys().iter().filter(|x| x.cpl_id == id) {
            for asset in self.reel_assets_mut() {
                if asset.key_id.as_deref() == Some(key.key_id.as_str()) {
                    asset.key = Some(key.key);
                    added += 1;
                }
            }
        }

        added
    }

    pub fn read(path: &Path, policy: ParsePolicy) -> Result<Self> {
        let root = Element::read_file(path)?;
        let mut cpl = Self::from_xml(&root, policy)?;
        cpl.file = Some(path.to_owned());
        Ok(cpl)
    }

    pub fn from_xml(root: &Element, policy: ParsePolicy) -> Result<Self> {
        let namespace = root.namespace().unwrap_or_default();
        let standard = match namespace {
            CPL_NS_INTEROP => Standard::Interop,
            CPL_NS_SMPTE => Standard::Smpte,
            x => {
                return Err(Error::UnknownNamespace {
                    document: "CPL".to_owned(),
                    namespace: x.to_owned(),
                });
            }
        };

        for child in root.elements() {
            if !KNOWN_ELEMENTS.contains(&child.local_name()) {
                unexpected(policy, "CompositionPlaylist", child.local_name())?;
            }
        }

        let (content_version_id, content_version_label_text) = match root.child("ContentVersion") {
            Some(x) => (
                x.optional_string_child("Id").unwrap_or_default(),
                x.optional_string_child("LabelText").unwrap_or_default(),
            ),
            None => Default::default(),
        };

        let reels = root
            .required_child("ReelList")?
            .children_named("Reel")
            .map(|x| Reel::read(x, policy))
            .collect::<Result<Vec<_>>>()?;

        let cpl = Self {
            id: utils::remove_urn_uuid(&root.string_child("Id")?),
            annotation_text: root.optional_string_child("AnnotationText").unwrap_or_default(),
            metadata: XmlMetadata::new(
                root.optional_string_child("Issuer").unwrap_or_default(),
                root.optional_string_child("Creator").unwrap_or_default(),
                root.string_child("IssueDate")?,
            ),
            content_title_text: root.string_child("ContentTitleText")?,
            content_kind: root.string_child("ContentKind")?.trim().parse()?,
            content_version_id,
            content_version_label_text,
            reels,
            standard: Some(standard),
            file: None,
        };

        log::debug!("read {} CPL {} with {} reels", standard, cpl.id, cpl.reels.len());
        Ok(cpl)
    }

    /// Build the XML form of this CPL, signed by `signer` if one is given.
    ///
    /// Without a signer the output only depends on the fields of this CPL.
    pub fn to_xml(&self, standard: Standard, signer: Option<&CertificateChain>) -> Result<Element> {
        self.encrypted()?;

        let namespace = match standard {
            Standard::Interop => CPL_NS_INTEROP,
            Standard::Smpte => CPL_NS_SMPTE,
        };

        let mut root = Element::with_namespace("CompositionPlaylist", namespace);
        if signer.is_some() {
            root.set_attribute("xmlns:dsig", crate::dsig::DSIG_NS);
        }

        root.add_text_child("Id", format!("urn:uuid:{}", self.id));
        root.add_text_child("AnnotationText", &self.annotation_text);
        root.add_text_child("IssueDate", &self.metadata.issue_date);
        root.add_text_child("Issuer", &self.metadata.issuer);
        root.add_text_child("Creator", &self.metadata.creator);
        root.add_text_child("ContentTitleText", &self.content_title_text);
        root.add_text_child("ContentKind", self.content_kind.as_str());

        let version = root.add_child("ContentVersion");
        version.add_text_child("Id", &self.content_version_id);
        version.add_text_child("LabelText", &self.content_version_label_text);

        root.add_child("RatingList");

        let reel_list = root.add_child("ReelList");
        for reel in &self.reels {
            reel.write_to_cpl(reel_list, standard)?;
        }

        if let Some(signer) = signer {
            signer.sign(&mut root, standard)?;
        }

        Ok(root)
    }

    pub fn write_xml(&mut self, path: &Path, standard: Standard, signer: Option<&CertificateChain>) -> Result<()> {
        self.to_xml(standard, signer)?.write_file(path)?;
        self.file = Some(path.to_owned());
        self.standard = Some(standard);
        Ok(())
    }

    pub fn equals(&self, other: &Cpl, options: &EqualityOptions, note: &mut dyn FnMut(NoteType, String)) -> Result<bool> {
        self.equals_with(other, options, &crate::compare::DigestComparator, note)
    }

    /// Compare with another CPL, comparing essence with `comparator`.
    pub fn equals_with(
        &self,
        other: &Cpl,
        options: &EqualityOptions,
        comparator: &dyn EssenceComparator,
        note: &mut dyn FnMut(NoteType, String),
    ) -> Result<bool> {
        if self.annotation_text != other.annotation_text {
            let message = format!(
                "CPL: annotation texts differ: {} vs {}",
                self.annotation_text, other.annotation_text
            );
            if !options.cpl_annotation_texts_can_differ {
                note(NoteType::Error, message);
                return Ok(false);
            }
            note(NoteType::Note, message);
        }

        if self.content_kind != other.content_kind {
            note(NoteType::Error, "CPL: content kinds differ".to_owned());
            return Ok(false);
        }

        if self.reels.len() != other.reels.len() {
            note(
                NoteType::Error,
                format!("CPL: reel counts differ ({} vs {})", self.reels.len(), other.reels.len()),
            );
            return Ok(false);
        }

        let mut same = true;
        for (a, b) in self.reels.iter().zip(&other.reels) {
            if !a.equals(b, options, comparator, note)? {
                same = false;
                if !options.keep_going {
                    return Ok(false);
                }
            }
        }

        Ok(same)
    }
}
