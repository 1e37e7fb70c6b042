use crate::{
    Error, Result, Standard, XmlMetadata,
    asset::Asset,
    utils,
    xml::Element,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

pub const ASSETMAP_NS_INTEROP: &str = "http://www.digicine.com/PROTO-ASDCP-AM-20040311#";
pub const ASSETMAP_NS_SMPTE: &str = "http://www.smpte-ra.org/schemas/429-9/2007/AM";
pub const VOLINDEX_NS_INTEROP: &str = "http://www.digicine.com/PROTO-ASDCP-AM-20040311#";
pub const VOLINDEX_NS_SMPTE: &str = "http://www.smpte-ra.org/schemas/429-9/2007/AM";

/// Where one asset of a package lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMapEntry {
    pub id: String,
    /// Path relative to the package directory, possibly empty.
    pub path: String,
    pub packing_list: bool,
}

/// The index of a package, mapping asset ids to files.
#[derive(Debug, Clone)]
pub struct AssetMap {
    pub id: String,
    pub standard: Standard,
    pub entries: Vec<AssetMapEntry>,
    file: PathBuf,
}

impl AssetMap {
    /// Find the AssetMap file in a package directory.
    pub fn find(directory: &Path) -> Result<PathBuf> {
        ["ASSETMAP", "ASSETMAP.xml"]
            .into_iter()
            .map(|x| directory.join(x))
            .find(|x| x.exists())
            .ok_or_else(|| Error::MissingAssetMap(directory.to_owned()))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let root = Element::read_file(path)?;

        let standard = match root.namespace() {
            Some(ASSETMAP_NS_INTEROP) => Standard::Interop,
            Some(ASSETMAP_NS_SMPTE) => Standard::Smpte,
            x => {
                return Err(Error::UnknownNamespace {
                    document: "AssetMap".to_owned(),
                    namespace: x.unwrap_or_default().to_owned(),
                });
            }
        };

        let mut entries = vec![];
        for asset in root.required_child("AssetList")?.children_named("Asset") {
            let id = utils::remove_urn_uuid(&asset.string_child("Id")?);
            let chunks = asset
                .required_child("ChunkList")?
                .children_named("Chunk")
                .collect::<Vec<_>>();

            let [chunk] = chunks[..] else {
                return Err(Error::UnsupportedChunkCount {
                    id,
                    count: chunks.len(),
                });
            };

            let chunk_path = chunk.string_child("Path")?;
            let chunk_path = chunk_path.trim();

            entries.push(AssetMapEntry {
                id,
                path: chunk_path.strip_prefix("file://").unwrap_or(chunk_path).to_owned(),
                packing_list: asset
                    .optional_string_child("PackingList")
                    .is_some_and(|x| x.trim() == "true"),
            });
        }

        log::debug!("read {} AssetMap entries from {}", entries.len(), path.display());

        Ok(Self {
            id: utils::remove_urn_uuid(&root.string_child("Id")?),
            standard,
            entries,
            file: path.to_owned(),
        })
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn packing_lists(&self) -> impl Iterator<Item = &AssetMapEntry> {
        self.entries.iter().filter(|x| x.packing_list)
    }

    /// Write `ASSETMAP` (Interop) or `ASSETMAP.xml` (SMPTE) into `directory`.
    ///
    /// The packing list comes first, named by `pkl_id`, `pkl_file` and its length.
    pub(crate) fn write(
        directory: &Path,
        standard: Standard,
        metadata: &XmlMetadata,
        pkl: (&str, &str, u64),
        assets: &[Arc<Asset>],
    ) -> Result<PathBuf> {
        let (file, ns) = match standard {
            Standard::Interop => ("ASSETMAP", ASSETMAP_NS_INTEROP),
            Standard::Smpte => ("ASSETMAP.xml", ASSETMAP_NS_SMPTE),
        };

        let mut root = Element::with_namespace("AssetMap", ns);
        root.add_text_child("Id", format!("urn:uuid:{}", utils::make_uuid()));
        root.add_text_child("AnnotationText", format!("Created by {}", metadata.creator));

        match standard {
            Standard::Interop => {
                root.add_text_child("VolumeCount", "1");
                root.add_text_child("IssueDate", &metadata.issue_date);
                root.add_text_child("Issuer", &metadata.issuer);
                root.add_text_child("Creator", &metadata.creator);
            }
            Standard::Smpte => {
                root.add_text_child("Creator", &metadata.creator);
                root.add_text_child("VolumeCount", "1");
                root.add_text_child("IssueDate", &metadata.issue_date);
                root.add_text_child("Issuer", &metadata.issuer);
            }
        }

        let asset_list = root.add_child("AssetList");

        let (pkl_id, pkl_file, pkl_length) = pkl;
        let entry = asset_list.add_child("Asset");
        entry.add_text_child("Id", format!("urn:uuid:{pkl_id}"));
        entry.add_text_child("PackingList", "true");
        let chunk = entry.add_child("ChunkList").add_child("Chunk");
        chunk.add_text_child("Path", pkl_file);
        chunk.add_text_child("VolumeIndex", "1");
        chunk.add_text_child("Offset", "0");
        chunk.add_text_child("Length", pkl_length.to_string());

        for asset in assets {
            asset.write_to_assetmap(asset_list, directory)?;
        }

        let path = directory.join(file);
        root.write_file(&path)?;
        Ok(path)
    }
}

/// Write `VOLINDEX` (Interop) or `VOLINDEX.xml` (SMPTE) into `directory`.
pub(crate) fn write_volindex(directory: &Path, standard: Standard) -> Result<()> {
    let (file, ns) = match standard {
        Standard::Interop => ("VOLINDEX", VOLINDEX_NS_INTEROP),
        Standard::Smpte => ("VOLINDEX.xml", VOLINDEX_NS_SMPTE),
    };

    let mut root = Element::with_namespace("VolumeIndex", ns);
    root.add_text_child("Index", "1");
    root.write_file(&directory.join(file))
}
