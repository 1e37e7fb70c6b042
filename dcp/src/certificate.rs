use crate::{Error, Result, utils};
use openssl::{
    nid::Nid,
    pkey::{PKey, Public},
    sha::Sha1,
    x509::{X509, X509NameRef},
};
use std::{fmt, fs, path::Path};

/// An X.509 certificate.
#[derive(Clone)]
pub struct Certificate {
    x509: X509,
}

impl Certificate {
    pub fn new(x509: X509) -> Self {
        Self { x509 }
    }

    /// Parse a PEM certificate. The `BEGIN`/`END` lines may be left off.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let pem = pem.trim();
        let x509 = if pem.starts_with("-----BEGIN") {
            X509::from_pem(pem.as_bytes())
        } else {
            X509::from_der(&utils::decode_base64(pem)?)
        };

        x509.map(Self::new).map_err(|e| Error::CertificateParse {
            path: None,
            reason: e.to_string(),
        })
    }

    pub fn from_pem_file(path: &Path) -> Result<Self> {
        let pem = fs::read_to_string(path).map_err(|e| Error::file("could not read certificate", path, &e))?;
        Self::from_pem(&pem).map_err(|e| Error::CertificateParse {
            path: Some(path.to_owned()),
            reason: e.to_string(),
        })
    }

    /// Every certificate in a PEM bundle, in file order.
    pub fn from_pem_bundle(pem: &str) -> Result<Vec<Self>> {
        X509::stack_from_pem(pem.as_bytes())
            .map(|x| x.into_iter().map(Self::new).collect())
            .map_err(|e| Error::CertificateParse {
                path: None,
                reason: e.to_string(),
            })
    }

    pub fn x509(&self) -> &X509 {
        &self.x509
    }

    /// The certificate as PEM, or as just the base64 body when `with_begin_end` is false.
    pub fn certificate(&self, with_begin_end: bool) -> Result<String> {
        let pem = String::from_utf8_lossy(&self.x509.to_pem()?).into_owned();
        if with_begin_end {
            return Ok(pem);
        }

        Ok(pem
            .lines()
            .filter(|x| !x.starts_with("-----"))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Issuer name in the form used by XML signatures and KDMs.
    pub fn issuer(&self) -> String {
        name_for_xml(self.x509.issuer_name())
    }

    pub fn subject(&self) -> String {
        name_for_xml(self.x509.subject_name())
    }

    pub fn subject_common_name(&self) -> Option<String> {
        entry(self.x509.subject_name(), Nid::COMMONNAME)
    }

    pub fn subject_organization_name(&self) -> Option<String> {
        entry(self.x509.subject_name(), Nid::ORGANIZATIONNAME)
    }

    pub fn subject_organizational_unit_name(&self) -> Option<String> {
        entry(self.x509.subject_name(), Nid::ORGANIZATIONALUNITNAME)
    }

    /// Serial number in decimal.
    pub fn serial(&self) -> Result<String> {
        Ok(self.x509.serial_number().to_bn()?.to_dec_str()?.to_string())
    }

    /// SHA-1 digest of the DER-encoded `TBSCertificate`.
    pub fn thumbprint_bytes(&self) -> Result<[u8; 20]> {
        let der = self.x509.to_der()?;
        let tbs = tbs_certificate(&der).ok_or_else(|| Error::CertificateParse {
            path: None,
            reason: "could not find TBSCertificate".to_owned(),
        })?;

        let mut sha = Sha1::new();
        sha.update(tbs);
        Ok(sha.finish())
    }

    /// Base64 of [`thumbprint_bytes`](Self::thumbprint_bytes).
    pub fn thumbprint(&self) -> Result<String> {
        Ok(utils::encode_base64(self.thumbprint_bytes()?))
    }

    pub fn public_key(&self) -> Result<PKey<Public>> {
        Ok(self.x509.public_key()?)
    }

    /// Whether `issuer` signed this certificate.
    pub fn issued_by(&self, issuer: &Certificate) -> bool {
        issuer
            .public_key()
            .and_then(|x| Ok(self.x509.verify(&x)?))
            .unwrap_or(false)
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        match (self.x509.to_der(), other.x509.to_der()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject())
            .field("issuer", &self.issuer())
            .finish()
    }
}

fn entry(name: &X509NameRef, nid: Nid) -> Option<String> {
    name.entries_by_nid(nid)
        .next()
        .and_then(|x| x.data().as_utf8().ok())
        .map(|x| x.to_string())
}

// Entries most specific first, joined with commas as RFC 2253 does.
fn name_for_xml(name: &X509NameRef) -> String {
    let mut parts = name
        .entries()
        .map(|x| {
            let key = x.object().nid().short_name().unwrap_or("UNKNOWN");
            let value = x
                .data()
                .as_utf8()
                .map(|x| x.to_string())
                .unwrap_or_default();
            format!("{key}={}", value.replace('+', "\\+"))
        })
        .collect::<Vec<_>>();

    parts.reverse();
    parts.join(",")
}

// Certificate ::= SEQUENCE { tbsCertificate, signatureAlgorithm, signatureValue }
fn tbs_certificate(der: &[u8]) -> Option<&[u8]> {
    let (header, _) = der_header(der)?;
    let inner = der.get(header..)?;
    let (tbs_header, tbs_length) = der_header(inner)?;
    inner.get(..tbs_header + tbs_length)
}

// Header length and content length of the DER element at the start of `data`.
fn der_header(data: &[u8]) -> Option<(usize, usize)> {
    let first = *data.get(1)?;
    if first < 0x80 {
        return Some((2, first as usize));
    }

    let count = (first & 0x7f) as usize;
    if count == 0 || count > 4 {
        return None;
    }

    let length = data
        .get(2..2 + count)?
        .iter()
        .fold(0_usize, |acc, x| (acc << 8) | *x as usize);
    Some((2 + count, length))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn der_lengths() {
        assert_eq!(der_header(&[0x30, 0x03, 1, 2, 3]), Some((2, 3)));
        assert_eq!(der_header(&[0x30, 0x82, 0x01, 0x00]), Some((4, 256)));
        assert_eq!(der_header(&[0x30]), None);

        let der = [0x30, 0x07, 0x30, 0x02, 0xaa, 0xbb, 0x05, 0x01, 0x00];
        assert_eq!(tbs_certificate(&der), Some(&der[2..6]));
    }

    #[test]
    fn bad_pem_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pem");
        fs::write(&path, "-----BEGIN CERTIFICATE-----\nnot base64\n-----END CERTIFICATE-----\n").unwrap();

        let err = Certificate::from_pem_file(&path).unwrap_err();
        assert!(matches!(err, Error::CertificateParse { path: Some(_), .. }));
        assert!(err.to_string().contains("broken.pem"));
    }
}
