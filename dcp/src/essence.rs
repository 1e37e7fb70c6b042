//! Classification of MXF essence containers.
//!
//! Decoding essence is left to a real MXF reader. The core only needs to know
//! which kind of asset a file holds, which [`MxfProbe`] finds by looking for
//! SMPTE universal labels in the file header.

use crate::{Error, Result};
use std::{fs::File, io::Read, path::Path};

/// The kinds of essence a package may carry in MXF files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EssenceType {
    MonoPicture,
    StereoPicture,
    Sound,
    TimedText,
}

/// Something which can tell what kind of essence an MXF file holds.
pub trait EssenceProbe: Send + Sync {
    /// Recognised but unsupported essence is an [`Error::UnsupportedEssence`].
    fn probe(&self, path: &Path) -> Result<EssenceType>;
}

/// Universal labels looked for by [`MxfProbe`].
pub mod labels {
    /// Prefix of every partition pack key.
    pub const PARTITION_PACK: [u8; 13] = [
        0x06, 0x0e, 0x2b, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0d, 0x01, 0x02, 0x01, 0x01,
    ];
    /// JPEG 2000 picture essence container.
    pub const JPEG_2000: [u8; 16] = [
        0x06, 0x0e, 0x2b, 0x34, 0x04, 0x01, 0x01, 0x07, 0x0d, 0x01, 0x03, 0x01, 0x02, 0x0c, 0x01, 0x00,
    ];
    /// Stereoscopic picture sub-descriptor.
    pub const STEREOSCOPIC: [u8; 16] = [
        0x06, 0x0e, 0x2b, 0x34, 0x02, 0x53, 0x01, 0x01, 0x0d, 0x01, 0x01, 0x01, 0x01, 0x01, 0x63, 0x00,
    ];
    /// Wave (PCM) audio essence container.
    pub const PCM: [u8; 16] = [
        0x06, 0x0e, 0x2b, 0x34, 0x04, 0x01, 0x01, 0x01, 0x0d, 0x01, 0x03, 0x01, 0x02, 0x06, 0x01, 0x00,
    ];
    /// Timed text essence container.
    pub const TIMED_TEXT: [u8; 16] = [
        0x06, 0x0e, 0x2b, 0x34, 0x04, 0x01, 0x01, 0x0a, 0x0d, 0x01, 0x03, 0x01, 0x02, 0x13, 0x01, 0x01,
    ];
    /// MPEG-2 video elementary stream container.
    pub const MPEG2: [u8; 16] = [
        0x06, 0x0e, 0x2b, 0x34, 0x04, 0x01, 0x01, 0x02, 0x0d, 0x01, 0x03, 0x01, 0x02, 0x04, 0x60, 0x01,
    ];
}

/// Probes the header partition of an MXF file for essence container labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct MxfProbe;

impl MxfProbe {
    const HEADER_LENGTH: u64 = 64 * 1024;
}

impl EssenceProbe for MxfProbe {
    fn probe(&self, path: &Path) -> Result<EssenceType> {
        let file = File::open(path).map_err(|e| Error::file("could not open MXF file", path, &e))?;
        let mut header = vec![];
        file.take(Self::HEADER_LENGTH)
            .read_to_end(&mut header)
            .map_err(|e| Error::file("could not read MXF file", path, &e))?;

        let unsupported = |reason: &str| Error::UnsupportedEssence {
            path: path.to_owned(),
            reason: reason.to_owned(),
        };

        if !header.starts_with(&labels::PARTITION_PACK) {
            return Err(unsupported("could not find essence type"));
        }

        let contains = |label: &[u8]| header.windows(label.len()).any(|x| x == label);

        let essence = if contains(&labels::MPEG2) {
            return Err(unsupported("MPEG2 video essences are not supported"));
        } else if contains(&labels::JPEG_2000) {
            if contains(&labels::STEREOSCOPIC) {
                EssenceType::StereoPicture
            } else {
                EssenceType::MonoPicture
            }
        } else if contains(&labels::PCM) {
            EssenceType::Sound
        } else if contains(&labels::TIMED_TEXT) {
            EssenceType::TimedText
        } else {
            return Err(unsupported("unknown MXF essence type"));
        };

        log::debug!("{} holds {:?} essence", path.display(), essence);
        Ok(essence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn mxf(labels: &[&[u8]]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&labels::PARTITION_PACK).unwrap();
        file.write_all(&[0; 64]).unwrap();
        for label in labels {
            file.write_all(label).unwrap();
        }
        file.write_all(&[0; 1024]).unwrap();
        file
    }

    #[test]
    fn classify_essence() {
        let probe = MxfProbe;
        let file = mxf(&[&labels::JPEG_2000]);
        assert_eq!(probe.probe(file.path()).unwrap(), EssenceType::MonoPicture);
        let file = mxf(&[&labels::JPEG_2000, &labels::STEREOSCOPIC]);
        assert_eq!(probe.probe(file.path()).unwrap(), EssenceType::StereoPicture);
        let file = mxf(&[&labels::PCM]);
        assert_eq!(probe.probe(file.path()).unwrap(), EssenceType::Sound);
        let file = mxf(&[&labels::TIMED_TEXT]);
        assert_eq!(probe.probe(file.path()).unwrap(), EssenceType::TimedText);
    }

    #[test]
    fn mpeg2_and_unknown_are_fatal() {
        let probe = MxfProbe;
        let file = mxf(&[&labels::MPEG2]);
        assert!(matches!(probe.probe(file.path()), Err(Error::UnsupportedEssence { .. })));
        let file = mxf(&[]);
        assert!(matches!(probe.probe(file.path()), Err(Error::UnsupportedEssence { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not an mxf").unwrap();
        assert!(matches!(probe.probe(file.path()), Err(Error::UnsupportedEssence { .. })));
    }
}
