use crate::{
    Error, Result, Standard, XmlMetadata,
    asset::Asset,
    certificate_chain::CertificateChain,
    dsig::DSIG_NS,
    utils,
    xml::Element,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

pub const PKL_NS_INTEROP: &str = "http://www.digicine.com/PROTO-ASDCP-PKL-20040311#";
pub const PKL_NS_SMPTE: &str = "http://www.smpte-ra.org/schemas/429-8/2007/PKL";

/// One `<Asset>` of a packing list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PklAsset {
    pub id: String,
    pub annotation_text: Option<String>,
    pub hash: String,
    pub size: u64,
    pub type_: String,
}

/// A packing list: every file of a package with its digest, size and type.
#[derive(Debug, Clone)]
pub struct Pkl {
    pub id: String,
    pub annotation_text: Option<String>,
    pub metadata: XmlMetadata,
    pub assets: Vec<PklAsset>,
    standard: Standard,
    file: Option<PathBuf>,
}

impl Pkl {
    pub fn read(path: &Path) -> Result<Self> {
        let root = Element::read_file(path)?;

        let standard = match root.namespace() {
            Some(PKL_NS_INTEROP) => Standard::Interop,
            Some(PKL_NS_SMPTE) => Standard::Smpte,
            x => {
                return Err(Error::UnknownNamespace {
                    document: "PKL".to_owned(),
                    namespace: x.unwrap_or_default().to_owned(),
                });
            }
        };

        let assets = root
            .required_child("AssetList")?
            .children_named("Asset")
            .map(|x| {
                Ok(PklAsset {
                    id: utils::remove_urn_uuid(&x.string_child("Id")?),
                    annotation_text: x.optional_string_child("AnnotationText"),
                    hash: x.string_child("Hash")?.trim().to_owned(),
                    size: x.number_child("Size")?,
                    type_: x.string_child("Type")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id: utils::remove_urn_uuid(&root.string_child("Id")?),
            annotation_text: root.optional_string_child("AnnotationText"),
            metadata: XmlMetadata::new(
                root.optional_string_child("Issuer").unwrap_or_default(),
                root.optional_string_child("Creator").unwrap_or_default(),
                root.string_child("IssueDate")?,
            ),
            assets,
            standard,
            file: Some(path.to_owned()),
        })
    }

    /// Standard given by the root namespace.
    pub fn standard(&self) -> Standard {
        self.standard
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Recorded digest of the asset with id `id`.
    pub fn hash(&self, id: &str) -> Option<&str> {
        self.assets
            .iter()
            .find(|x| x.id == id)
            .map(|x| x.hash.as_str())
    }

    /// Write a packing list for `assets` to `path`, signing it if a signer is given.
    pub(crate) fn write(
        path: &Path,
        id: &str,
        annotation_text: &str,
        assets: &[Arc<Asset>],
        standard: Standard,
        metadata: &XmlMetadata,
        signer: Option<&CertificateChain>,
    ) -> Result<()> {
        let ns = match standard {
            Standard::Interop => PKL_NS_INTEROP,
            Standard::Smpte => PKL_NS_SMPTE,
        };

        let mut root = Element::with_namespace("PackingList", ns);
        if signer.is_some() {
            root.set_attribute("xmlns:dsig", DSIG_NS);
        }

        root.add_text_child("Id", format!("urn:uuid:{id}"));
        root.add_text_child("AnnotationText", annotation_text);
        root.add_text_child("IssueDate", &metadata.issue_date);
        root.add_text_child("Issuer", &metadata.issuer);
        root.add_text_child("Creator", &metadata.creator);

        let asset_list = root.add_child("AssetList");
        for asset in assets {
            asset.write_to_pkl(asset_list, standard)?;
        }

        if let Some(signer) = signer {
            signer.sign(&mut root, standard)?;
        }

        root.write_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetKind;
    use std::fs;

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let font = dir.path().join("font.ttf");
        fs::write(&font, b"not really a font").unwrap();

        let asset = Arc::new(Asset::new(utils::make_uuid(), &font, AssetKind::Font));
        let metadata = XmlMetadata::new("issuer", "creator", "2016-04-11T12:00:00+00:00");
        let path = dir.path().join("pkl.xml");
        let id = utils::make_uuid();

        Pkl::write(&path, &id, "A Test DCP", &[asset.clone()], Standard::Interop, &metadata, None).unwrap();

        let pkl = Pkl::read(&path).unwrap();
        assert_eq!(pkl.id, id);
        assert_eq!(pkl.standard(), Standard::Interop);
        assert_eq!(pkl.metadata, metadata);
        assert_eq!(pkl.assets.len(), 1);
        assert_eq!(pkl.assets[0].type_, "application/ttf");
        assert_eq!(pkl.assets[0].size, 17);
        assert_eq!(pkl.hash(asset.id()), Some(asset.digest().unwrap().as_str()));
        assert_eq!(pkl.hash("nothing"), None);
    }

    #[test]
    fn unknown_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkl.xml");
        fs::write(&path, r#"<PackingList xmlns="urn:nope"><Id>x</Id></PackingList>"#).unwrap();

        assert!(matches!(Pkl::read(&path), Err(Error::UnknownNamespace { .. })));
    }
}
