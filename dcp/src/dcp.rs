use crate::{
    Error, NoteType, ParsePolicy, Result, Standard, XmlMetadata,
    asset::{Asset, AssetKind},
    asset_map::{self, AssetMap},
    certificate_chain::CertificateChain,
    compare::{DigestComparator, EssenceComparator},
    cpl::Cpl,
    essence::EssenceProbe,
    kdm::DecryptedKdm,
    name_format::NameFormat,
    pkl::Pkl,
    subtitle::InteropSubtitle,
    types::EqualityOptions,
    utils,
    xml::Element,
};
use rayon::prelude::*;
use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

/// How to react to problems while reading a package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Collect survivable problems (see [`Error::is_survivable`]) instead of failing on them.
    pub keep_going: bool,
    pub parse_policy: ParsePolicy,
}

/// A Digital Cinema Package in a directory.
#[derive(Debug)]
pub struct Dcp {
    directory: PathBuf,
    standard: Option<Standard>,
    cpls: Vec<Cpl>,
    pkls: Vec<Pkl>,
    assets: Vec<Arc<Asset>>,
}

impl Dcp {
    /// A package in `directory`, which is created if it does not exist.
    pub fn new(directory: &Path) -> Result<Self> {
        fs::create_dir_all(directory).map_err(|e| Error::file("could not create directory", directory, &e))?;
        let directory = directory
            .canonicalize()
            .map_err(|e| Error::file("could not find directory", directory, &e))?;

        Ok(Self {
            directory,
            standard: None,
            cpls: vec![],
            pkls: vec![],
            assets: vec![],
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Standard of the AssetMap, once the package has been read.
    pub fn standard(&self) -> Option<Standard> {
        self.standard
    }

    pub fn cpls(&self) -> &[Cpl] {
        &self.cpls
    }

    pub fn cpls_mut(&mut self) -> &mut [Cpl] {
        &mut self.cpls
    }

    pub fn pkls(&self) -> &[Pkl] {
        &self.pkls
    }

    /// Add a CPL; fonts its Interop subtitles load are registered as assets.
    pub fn add(&mut self, cpl: Cpl) {
        self.register_fonts(&cpl);
        self.cpls.push(cpl);
    }

    /// Add an asset which no reel refers to directly, such as a font.
    pub fn add_asset(&mut self, asset: Arc<Asset>) {
        self.assets.push(asset);
    }

    /// Read the package from its directory.
    ///
    /// Every file in the AssetMap is classified and each CPL is then resolved
    /// against the other assets. Survivable problems are returned when
    /// `options.keep_going` is set; anything else fails the read.
    pub fn read(&mut self, options: &ReadOptions, probe: &dyn EssenceProbe) -> Result<Vec<Error>> {
        let mut errors = vec![];
        let mut survivable = |error: Error| -> Result<()> {
            if options.keep_going {
                log::warn!("{error}");
                errors.push(error);
                Ok(())
            } else {
                Err(error)
            }
        };

        let asset_map = AssetMap::read(&AssetMap::find(&self.directory)?)?;
        let standard = asset_map.standard;
        self.standard = Some(standard);

        let mut cpls = vec![];
        let mut pkls = vec![];
        let mut assets = vec![];

        for entry in &asset_map.entries {
            if entry.path.is_empty() {
                survivable(Error::EmptyAssetPath(entry.id.clone()))?;
                continue;
            }

            let path = self.directory.join(&entry.path);
            if !path.exists() {
                survivable(Error::MissingAsset(path))?;
                continue;
            }

            if entry.packing_list {
                let pkl = Pkl::read(&path)?;
                if pkl.standard() != standard {
                    survivable(Error::MismatchedStandard {
                        expected: standard,
                        found: pkl.standard(),
                        path: path.clone(),
                    })?;
                }
                pkls.push(pkl);
                continue;
            }

            let extension = path
                .extension()
                .map(|x| x.to_string_lossy().to_lowercase())
                .unwrap_or_default();

            match extension.as_str() {
                "xml" => {
                    let root = match Element::read_file(&path) {
                        Ok(x) => x,
                        Err(e) => {
                            log::warn!("skipping {}: {e}", path.display());
                            continue;
                        }
                    };

                    match root.local_name() {
                        "CompositionPlaylist" => {
                            let cpl = Cpl::read(&path, options.parse_policy)?;
                            if let Some(found) = cpl.standard()
                                && found != standard
                            {
                                survivable(Error::MismatchedStandard {
                                    expected: standard,
                                    found,
                                    path: path.clone(),
                                })?;
                            }
                            cpls.push(cpl);
                        }
                        "DCSubtitle" => {
                            if standard == Standard::Smpte {
                                survivable(Error::MismatchedStandard {
                                    expected: standard,
                                    found: Standard::Interop,
                                    path: path.clone(),
                                })?;
                            }

                            let subtitle = InteropSubtitle::read(&path)?;
                            if subtitle.id != entry.id {
                                log::warn!(
                                    "subtitle {} has SubtitleID {} but AssetMap id {}",
                                    path.display(),
                                    subtitle.id,
                                    entry.id
                                );
                            }

                            let kind = AssetKind::Subtitle {
                                standard: Standard::Interop,
                                fonts: subtitle.fonts,
                            };
                            assets.push(Arc::new(Asset::new(entry.id.as_str(), path, kind)));
                        }
                        x => log::debug!("ignoring {} with root <{x}>", path.display()),
                    }
                }
                "mxf" => {
                    let essence = probe.probe(&path)?;
                    log::debug!("{} holds {:?}", path.display(), essence);
                    assets.push(Arc::new(Asset::new(
                        entry.id.as_str(),
                        path,
                        AssetKind::from_essence(essence),
                    )));
                }
                "ttf" => assets.push(Arc::new(Asset::new(entry.id.as_str(), path, AssetKind::Font))),
                _ => log::debug!("ignoring {}", path.display()),
            }
        }

        let known = asset_map
            .entries
            .iter()
            .map(|x| x.id.as_str())
            .collect::<HashSet<_>>();

        for cpl in &mut cpls {
            for id in cpl.resolve_refs(&assets) {
                // Ids in the AssetMap whose file is missing have been reported already.
                if !known.contains(id.as_str()) {
                    survivable(Error::UnresolvedReference {
                        cpl_id: cpl.id.clone(),
                        asset_id: id,
                    })?;
                }
            }
        }

        self.assets.extend(assets);
        for cpl in &cpls {
            self.register_fonts(cpl);
        }
        self.cpls.extend(cpls);
        self.pkls.extend(pkls);
        Ok(errors)
    }

    /// Resolve every CPL's references against `assets`, returning the ids not found.
    pub fn resolve_refs(&mut self, assets: &[Arc<Asset>]) -> Vec<String> {
        let missing = self
            .cpls
            .iter_mut()
            .flat_map(|x| x.resolve_refs(assets))
            .collect();

        let mut cpls = std::mem::take(&mut self.cpls);
        for cpl in &cpls {
            self.register_fonts(cpl);
        }
        self.cpls.append(&mut cpls);
        missing
    }

    /// Give every font loaded by an Interop subtitle of `cpl` an asset, unless
    /// one is already known at that path.
    fn register_fonts(&mut self, cpl: &Cpl) {
        for reel_asset in cpl.reel_assets() {
            let Some(asset) = reel_asset.asset() else {
                continue;
            };

            for path in self.font_paths(asset) {
                if self.font(&path).is_none() {
                    log::debug!("registering font {}", path.display());
                    self.assets
                        .push(Arc::new(Asset::new(utils::make_uuid(), path, AssetKind::Font)));
                }
            }
        }
    }

    /// Paths of the fonts an Interop subtitle loads.
    fn font_paths(&self, asset: &Asset) -> Vec<PathBuf> {
        let AssetKind::Subtitle {
            standard: Standard::Interop,
            fonts,
        } = asset.kind()
        else {
            return vec![];
        };

        let directory = asset.path().parent().unwrap_or(self.directory.as_path());
        fonts.iter().map(|x| directory.join(&x.uri)).collect()
    }

    fn font(&self, path: &Path) -> Option<&Arc<Asset>> {
        self.assets
            .iter()
            .find(|x| matches!(x.kind(), AssetKind::Font) && x.path() == path)
    }

    pub fn encrypted(&self) -> Result<bool> {
        for cpl in &self.cpls {
            if cpl.encrypted()? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Give the keys in `kdm` to the CPLs they are for, returning the number of assets keyed.
    pub fn add_kdm(&mut self, kdm: &DecryptedKdm) -> usize {
        self.cpls.iter_mut().map(|x| x.add_kdm(kdm)).sum()
    }

    /// Every asset of the package: the CPLs with a file, the assets their
    /// reels use and the fonts of any Interop subtitles. Each is listed once.
    pub fn assets(&self) -> Vec<Arc<Asset>> {
        let mut assets = vec![];

        for cpl in &self.cpls {
            assets.extend(cpl.as_asset());

            for reel_asset in cpl.reel_assets() {
                let Some(asset) = reel_asset.asset() else {
                    continue;
                };
                assets.push(asset.clone());

                for path in self.font_paths(asset) {
                    match self.font(&path) {
                        Some(x) => assets.push(x.clone()),
                        None => log::warn!("font {} was never registered with the package", path.display()),
                    }
                }
            }
        }

        assets.extend(
            self.assets
                .iter()
                .filter(|x| matches!(x.kind(), AssetKind::Font))
                .cloned(),
        );

        let mut seen = HashSet::new();
        assets.retain(|x| seen.insert(x.id().to_owned()));
        assets
    }

    /// Compare with another package.
    ///
    /// Both must have as many CPLs, and each of ours must equal one of theirs.
    pub fn equals(&self, other: &Dcp, options: &EqualityOptions, note: &mut dyn FnMut(NoteType, String)) -> Result<bool> {
        self.equals_with(other, options, &DigestComparator, note)
    }

    pub fn equals_with(
        &self,
        other: &Dcp,
        options: &EqualityOptions,
        comparator: &dyn EssenceComparator,
        note: &mut dyn FnMut(NoteType, String),
    ) -> Result<bool> {
        if self.cpls.len() != other.cpls.len() {
            note(
                NoteType::Error,
                format!("CPL counts differ: {} vs {}", self.cpls.len(), other.cpls.len()),
            );
            return Ok(false);
        }

        let mut same = true;
        for a in &self.cpls {
            let mut found = false;
            for b in &other.cpls {
                if b.equals_with(a, options, comparator, note)? {
                    found = true;
                    break;
                }
            }

            if !found {
                same = false;
            }
        }

        Ok(same)
    }

    /// Write the XML files of the package: every CPL, then a PKL, VOLINDEX and AssetMap.
    ///
    /// Digests of the assets are computed in parallel before the PKL is written.
    pub fn write_xml(
        &mut self,
        standard: Standard,
        metadata: &XmlMetadata,
        signer: Option<&CertificateChain>,
        name_format: &NameFormat,
    ) -> Result<()> {
        for cpl in &mut self.cpls {
            let values = HashMap::from([('t', "cpl".to_owned()), ('i', cpl.id.clone())]);
            let path = self.directory.join(name_format.get(&values, ".xml"));
            cpl.write_xml(&path, standard, signer)?;
        }

        let assets = self.assets();
        assets
            .par_iter()
            .map(|x| x.digest().map(|_| ()))
            .collect::<Result<()>>()?;

        let pkl_id = utils::make_uuid();
        let values = HashMap::from([('t', "pkl".to_owned()), ('i', pkl_id.clone())]);
        let pkl_file = name_format.get(&values, ".xml");
        let pkl_path = self.directory.join(&pkl_file);
        let annotation_text = self
            .cpls
            .first()
            .map(|x| x.annotation_text.as_str())
            .unwrap_or_default();

        Pkl::write(&pkl_path, &pkl_id, annotation_text, &assets, standard, metadata, signer)?;

        asset_map::write_volindex(&self.directory, standard)?;

        let pkl_length = fs::metadata(&pkl_path)
            .map_err(|e| Error::file("could not find size of PKL", &pkl_path, &e))?
            .len();
        AssetMap::write(
            &self.directory,
            standard,
            metadata,
            (&pkl_id, &pkl_file, pkl_length),
            &assets,
        )?;

        self.standard = Some(standard);
        log::debug!("wrote {} package with {} assets to {}", standard, assets.len(), self.directory.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::essence::MxfProbe;

    #[test]
    fn missing_asset_map() {
        let dir = tempfile::tempdir().unwrap();
        let mut dcp = Dcp::new(dir.path()).unwrap();
        let err = dcp.read(&ReadOptions::default(), &MxfProbe).unwrap_err();
        assert!(matches!(err, Error::MissingAssetMap(_)));
    }

    #[test]
    fn new_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let dcp = Dcp::new(&dir.path().join("a").join("b")).unwrap();
        assert!(dcp.directory().is_dir());
        assert!(dcp.directory().is_absolute());
        assert!(dcp.cpls().is_empty());
    }
}
