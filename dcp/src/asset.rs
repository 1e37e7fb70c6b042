use crate::{
    Error, Fraction, Result, Standard,
    essence::EssenceType,
    subtitle::FontReference,
    utils,
    xml::Element,
};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

/// What an [`Asset`] holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetKind {
    MonoPicture,
    StereoPicture,
    Sound,
    /// Interop subtitles are XML files which may load fonts,
    /// SMPTE subtitles are timed text MXFs.
    Subtitle {
        standard: Standard,
        fonts: Vec<FontReference>,
    },
    Font,
    /// A composition playlist, listed in the PKL like any other asset.
    Cpl,
}

impl AssetKind {
    pub fn from_essence(essence: EssenceType) -> Self {
        match essence {
            EssenceType::MonoPicture => Self::MonoPicture,
            EssenceType::StereoPicture => Self::StereoPicture,
            EssenceType::Sound => Self::Sound,
            EssenceType::TimedText => Self::Subtitle {
                standard: Standard::Smpte,
                fonts: vec![],
            },
        }
    }

    pub fn is_picture(&self) -> bool {
        matches!(self, Self::MonoPicture | Self::StereoPicture)
    }

    /// Value of the PKL `<Type>` element for this kind of asset.
    pub fn pkl_type(&self, standard: Standard) -> &'static str {
        match (self, standard) {
            (Self::MonoPicture | Self::StereoPicture, Standard::Interop) => {
                "application/x-smpte-mxf;asdcpKind=Picture"
            }
            (Self::Sound, Standard::Interop) => "application/x-smpte-mxf;asdcpKind=Sound",
            (Self::Subtitle { standard: Standard::Interop, .. }, _) => "text/xml;asdcpKind=Subtitle",
            (Self::Subtitle { .. }, Standard::Interop) => "application/x-smpte-mxf;asdcpKind=Subtitle",
            (Self::MonoPicture | Self::StereoPicture | Self::Sound | Self::Subtitle { .. }, Standard::Smpte) => {
                "application/mxf"
            }
            (Self::Font, Standard::Interop) => "application/ttf",
            (Self::Font, Standard::Smpte) => "application/x-font-ttf",
            (Self::Cpl, Standard::Interop) => "text/xml;asdcpKind=CPL",
            (Self::Cpl, Standard::Smpte) => "text/xml",
        }
    }
}

/// A file in a package: essence, subtitles, a font or a CPL.
///
/// Assets are shared between reels and packages behind an `Arc` and are not
/// changed once created. The digest of the file is computed on first use and
/// then remembered; concurrent callers wait for a single computation.
#[derive(Debug)]
pub struct Asset {
    id: String,
    path: PathBuf,
    kind: AssetKind,
    edit_rate: Fraction,
    intrinsic_duration: i64,
    digest: Mutex<Option<String>>,
}

impl Asset {
    pub fn new<T: Into<String>>(id: T, path: impl Into<PathBuf>, kind: AssetKind) -> Self {
        Self {
            id: utils::remove_urn_uuid(&id.into()),
            path: path.into(),
            kind,
            edit_rate: Fraction::default(),
            intrinsic_duration: 0,
            digest: Mutex::new(None),
        }
    }

    /// Set edit rate and length, which are only known for essence we wrote ourselves.
    pub fn with_timing(mut self, edit_rate: Fraction, intrinsic_duration: i64) -> Self {
        self.edit_rate = edit_rate;
        self.intrinsic_duration = intrinsic_duration;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> &AssetKind {
        &self.kind
    }

    pub fn edit_rate(&self) -> Fraction {
        self.edit_rate
    }

    pub fn intrinsic_duration(&self) -> i64 {
        self.intrinsic_duration
    }

    /// Base64 SHA-1 digest of the file, computed at most once.
    pub fn digest(&self) -> Result<String> {
        self.digest_with_progress(None)
    }

    pub fn digest_with_progress(&self, progress: Option<&(dyn Fn(f32) + Sync)>) -> Result<String> {
        let mut digest = self.digest.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(digest) = digest.as_ref() {
            return Ok(digest.clone());
        }

        let value = utils::make_digest(&self.path, progress)?;
        *digest = Some(value.clone());
        Ok(value)
    }

    /// Whether the digest has already been computed.
    pub fn has_digest(&self) -> bool {
        self.digest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn size(&self) -> Result<u64> {
        fs::metadata(&self.path)
            .map(|x| x.len())
            .map_err(|e| Error::file("could not find size of asset", &self.path, &e))
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|x| x.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Add an `<Asset>` entry describing this file to a PKL `<AssetList>`.
    pub fn write_to_pkl(&self, asset_list: &mut Element, standard: Standard) -> Result<()> {
        let digest = self.digest()?;
        let size = self.size()?;

        let asset = asset_list.add_child("Asset");
        asset.add_text_child("Id", format!("urn:uuid:{}", self.id));
        asset.add_text_child("AnnotationText", self.file_name());
        asset.add_text_child("Hash", digest);
        asset.add_text_child("Size", size.to_string());
        asset.add_text_child("Type", self.kind.pkl_type(standard));
        Ok(())
    }

    /// Add an `<Asset>` entry locating this file to an AssetMap `<AssetList>`.
    ///
    /// The path is written relative to `root`, the package directory.
    pub fn write_to_assetmap(&self, asset_list: &mut Element, root: &Path) -> Result<()> {
        let size = self.size()?;
        let relative = self.path.strip_prefix(root).unwrap_or(&self.path);
        let relative = relative
            .components()
            .map(|x| x.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let asset = asset_list.add_child("Asset");
        asset.add_text_child("Id", format!("urn:uuid:{}", self.id));
        let chunk = asset.add_child("ChunkList").add_child("Chunk");
        chunk.add_text_child("Path", relative);
        chunk.add_text_child("VolumeIndex", "1");
        chunk.add_text_child("Offset", "0");
        chunk.add_text_child("Length", size.to_string());
        Ok(())
    }
}
