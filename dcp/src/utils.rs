use crate::{Error, Result};
use base64::Engine;
use chrono::{DateTime, FixedOffset};
use openssl::sha::Sha1;
use std::{
    fs::File,
    io::Read,
    path::Path,
};

const DIGEST_CHUNK: usize = 64 * 1024;

/// Make a new random UUID in lower-case hyphenated form.
pub fn make_uuid() -> String {
    uuid::Uuid::new_v4().hyphenated().to_string()
}

/// Strip a leading `urn:uuid:` from an id.
pub fn remove_urn_uuid(id: &str) -> String {
    id.trim()
        .strip_prefix("urn:uuid:")
        .unwrap_or(id.trim())
        .to_lowercase()
}

pub(crate) fn encode_base64<T: AsRef<[u8]>>(input: T) -> String {
    base64::engine::general_purpose::STANDARD.encode(input)
}

pub(crate) fn decode_base64<T: AsRef<[u8]>>(input: T) -> Result<Vec<u8>> {
    // Certificates and cipher values are often wrapped over several lines.
    let compact = input
        .as_ref()
        .iter()
        .copied()
        .filter(|x| !x.is_ascii_whitespace())
        .collect::<Vec<_>>();

    Ok(base64::engine::general_purpose::STANDARD.decode(compact)?)
}

/// Base64 of the SHA-1 digest of a file, the form used in PKL and CPL `<Hash>` elements.
///
/// `progress` is called with the fraction of the file digested so far.
pub fn make_digest(path: &Path, progress: Option<&(dyn Fn(f32) + Sync)>) -> Result<String> {
    let mut file = File::open(path).map_err(|e| Error::file("could not open file to compute digest", path, &e))?;
    let total = file.metadata().map(|x| x.len()).unwrap_or(0);

    let mut sha = Sha1::new();
    let mut buffer = vec![0; DIGEST_CHUNK];
    let mut done = 0_u64;

    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|e| Error::file("could not read file to compute digest", path, &e))?;

        if read == 0 {
            break;
        }

        sha.update(&buffer[..read]);
        done += read as u64;

        if let Some(progress) = progress
            && total > 0
        {
            progress(done as f32 / total as f32);
        }
    }

    Ok(encode_base64(sha.finish()))
}

/// Base64 of the SHA-1 digest of some bytes.
pub fn make_data_digest(data: &[u8]) -> String {
    let mut sha = Sha1::new();
    sha.update(data);
    encode_base64(sha.finish())
}

/// Format a timestamp as `YYYY-MM-DDTHH:MM:SS+HH:MM`, always 25 characters.
pub fn format_timestamp(time: &DateTime<FixedOffset>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<FixedOffset>> {
    Ok(DateTime::parse_from_rfc3339(value.trim())?)
}
