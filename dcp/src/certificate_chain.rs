use crate::{
    Error, Result, Standard,
    certificate::Certificate,
    dsig::{self, DSIG_NS},
    utils,
    xml::Element,
};
use openssl::{
    asn1::Asn1Time,
    bn::BigNum,
    hash::MessageDigest,
    pkey::{PKey, PKeyRef, Private},
    rsa::Rsa,
    sha::Sha1,
    x509::{
        X509, X509Builder, X509Name, X509NameBuilder,
        extension::{BasicConstraints, KeyUsage, SubjectKeyIdentifier},
    },
};
use std::{fs, path::Path};

/// Reordering tries every permutation, so it is refused for longer chains.
const MAX_REORDER_LENGTH: usize = 5;

/// Names and sizes used by [`CertificateChain::generate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSubject {
    pub organisation: String,
    pub organisational_unit: String,
    pub root_common_name: String,
    pub intermediate_common_name: String,
    pub leaf_common_name: String,
    pub key_bits: u32,
    /// Validity of the root; the intermediate and leaf expire a day and two days earlier.
    pub validity_days: u32,
}

impl Default for ChainSubject {
    fn default() -> Self {
        Self {
            organisation: "example.org".to_owned(),
            organisational_unit: "example.org".to_owned(),
            root_common_name: ".smpte-430-2.ROOT.NOT_FOR_PRODUCTION".to_owned(),
            intermediate_common_name: ".smpte-430-2.INTERMEDIATE.NOT_FOR_PRODUCTION".to_owned(),
            leaf_common_name: "CS.smpte-430-2.LEAF.NOT_FOR_PRODUCTION".to_owned(),
            key_bits: 2048,
            validity_days: 3650,
        }
    }
}

/// Certificates from a self-signed root to a leaf, with the leaf's private key if known.
#[derive(Debug, Clone, Default)]
pub struct CertificateChain {
    certificates: Vec<Certificate>,
    key: Option<PKey<Private>>,
}

impl CertificateChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A chain of `certificates` given root first.
    pub fn from_certificates(certificates: Vec<Certificate>) -> Self {
        Self {
            certificates,
            key: None,
        }
    }

    /// Read a PEM bundle, reordering it if the certificates are not root first.
    pub fn from_pem_bundle(pem: &str) -> Result<Self> {
        let mut chain = Self::from_certificates(Certificate::from_pem_bundle(pem)?);
        if !chain.valid() && chain.certificates.len() <= MAX_REORDER_LENGTH {
            // A bundle which cannot be ordered is still returned; valid() will say so.
            let _ = chain.attempt_reorder();
        }
        Ok(chain)
    }

    pub fn from_pem_file(path: &Path) -> Result<Self> {
        let pem = fs::read_to_string(path).map_err(|e| Error::file("could not read certificate chain", path, &e))?;
        Self::from_pem_bundle(&pem).map_err(|e| match e {
            Error::CertificateParse { reason, .. } => Error::CertificateParse {
                path: Some(path.to_owned()),
                reason,
            },
            e => e,
        })
    }

    /// Add a certificate at the leaf end.
    pub fn add(&mut self, certificate: Certificate) {
        self.certificates.push(certificate);
    }

    /// Remove `certificate`, returning whether it was in the chain.
    pub fn remove(&mut self, certificate: &Certificate) -> bool {
        let before = self.certificates.len();
        self.certificates.retain(|x| x != certificate);
        self.certificates.len() != before
    }

    /// Remove the certificate at `index`, counting from the root.
    pub fn remove_at(&mut self, index: usize) -> Option<Certificate> {
        (index < self.certificates.len()).then(|| self.certificates.remove(index))
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    pub fn key(&self) -> Option<&PKeyRef<Private>> {
        self.key.as_deref()
    }

    pub fn set_key(&mut self, key: PKey<Private>) {
        self.key = Some(key);
    }

    /// Read the leaf's private key from a PEM file.
    pub fn set_key_from_pem_file(&mut self, path: &Path) -> Result<()> {
        let pem = fs::read(path).map_err(|e| Error::file("could not read private key", path, &e))?;
        self.key = Some(PKey::private_key_from_pem(&pem)?);
        Ok(())
    }

    /// The root certificate; a chain needs a root and a leaf for this to be meaningful.
    pub fn root(&self) -> Result<&Certificate> {
        if self.certificates.len() < 2 {
            return Err(Error::InvalidChain(format!(
                "chain has {} certificates, so no separate root",
                self.certificates.len()
            )));
        }

        Ok(&self.certificates[0])
    }

    pub fn leaf(&self) -> Result<&Certificate> {
        self.certificates
            .last()
            .ok_or_else(|| Error::InvalidChain("chain is empty".to_owned()))
    }

    pub fn root_to_leaf(&self) -> Vec<&Certificate> {
        self.certificates.iter().collect()
    }

    pub fn leaf_to_root(&self) -> Vec<&Certificate> {
        self.certificates.iter().rev().collect()
    }

    /// Whether this is a complete chain from a self-signed root to a leaf
    /// matching the private key (if there is one).
    pub fn valid(&self) -> bool {
        self.diagnostics().is_empty()
    }

    /// The reasons this chain is not [`valid`](Self::valid).
    pub fn diagnostics(&self) -> Vec<String> {
        let mut problems = vec![];

        let Some(root) = self.certificates.first() else {
            problems.push("chain is empty".to_owned());
            return problems;
        };

        if root.issuer() != root.subject() {
            problems.push(format!("root certificate {} is not self-signed", root.subject()));
        } else if !root.issued_by(root) {
            problems.push(format!("signature of root certificate {} does not verify", root.subject()));
        }

        for (index, pair) in self.certificates.windows(2).enumerate() {
            let (issuer, child) = (&pair[0], &pair[1]);
            if child.issuer() != issuer.subject() {
                problems.push(format!(
                    "certificate {} is issued by {}, not {}",
                    index + 1,
                    child.issuer(),
                    issuer.subject()
                ));
            } else if !child.issued_by(issuer) {
                problems.push(format!("signature of certificate {} does not verify", index + 1));
            }
        }

        if let (Some(key), Some(leaf)) = (&self.key, self.certificates.last()) {
            let matches = leaf.public_key().map(|x| key.public_eq(&x)).unwrap_or(false);
            if !matches {
                problems.push("private key does not match leaf certificate".to_owned());
            }
        }

        problems
    }

    /// Reorder the certificates so that the chain is valid.
    ///
    /// On failure the chain is left as it was.
    pub fn attempt_reorder(&mut self) -> Result<()> {
        if self.valid() {
            return Ok(());
        }

        let count = self.certificates.len();
        if count > MAX_REORDER_LENGTH {
            return Err(Error::InvalidChain(format!(
                "will not try to reorder a chain of {count} certificates"
            )));
        }

        let mut order = (0..count).collect::<Vec<_>>();
        let found = permute(&mut order, 0, &mut |order| {
            let candidate = Self {
                certificates: order.iter().map(|x| self.certificates[*x].clone()).collect(),
                key: self.key.clone(),
            };
            candidate.valid().then_some(candidate.certificates)
        });

        match found {
            Some(certificates) => {
                self.certificates = certificates;
                Ok(())
            }
            None => Err(Error::InvalidChain(
                "no ordering of the certificates makes a valid chain".to_owned(),
            )),
        }
    }

    /// All certificates as a PEM bundle, root first.
    pub fn chain_pem(&self) -> Result<String> {
        self.certificates
            .iter()
            .map(|x| x.certificate(true))
            .collect::<Result<Vec<_>>>()
            .map(|x| x.concat())
    }

    pub fn key_pem(&self) -> Result<Option<String>> {
        self.key
            .as_ref()
            .map(|x| Ok(String::from_utf8_lossy(&x.private_key_to_pem_pkcs8()?).into_owned()))
            .transpose()
    }

    /// Add an enveloped signature to the document whose root element is `root`.
    ///
    /// A `<Signer>` naming the leaf certificate and a `<dsig:Signature>` are
    /// appended to `root`; the signature covers the whole document except the
    /// signature itself. Interop documents are signed with RSA-SHA1, SMPTE
    /// with RSA-SHA256.
    pub fn sign(&self, root: &mut Element, standard: Standard) -> Result<()> {
        let problems = self.diagnostics();
        if !problems.is_empty() {
            return Err(Error::InvalidChain(problems.join("; ")));
        }

        let leaf = self.leaf()?;

        let mut signer = Element::new("Signer");
        signer.set_attribute("xmlns:dsig", DSIG_NS);
        let data = signer.add_child("dsig:X509Data");
        let serial = data.add_child("dsig:X509IssuerSerial");
        serial.add_text_child("dsig:X509IssuerName", leaf.issuer());
        serial.add_text_child("dsig:X509SerialNumber", leaf.serial()?);
        data.add_text_child("dsig:X509SubjectName", leaf.subject());
        root.push(signer);

        let mut signature = Element::new("dsig:Signature");
        signature.set_attribute("xmlns:dsig", DSIG_NS);

        let signed_info = signature.add_child("dsig:SignedInfo");
        signed_info
            .add_child("dsig:CanonicalizationMethod")
            .set_attribute("Algorithm", dsig::C14N);
        // The reference digest uses the same hash as the signature method.
        let (method, digest) = match standard {
            Standard::Interop => (dsig::RSA_SHA1, dsig::SHA1),
            Standard::Smpte => (dsig::RSA_SHA256, dsig::SHA256),
        };
        signed_info
            .add_child("dsig:SignatureMethod")
            .set_attribute("Algorithm", method);

        let reference = signed_info.add_child("dsig:Reference");
        reference.set_attribute("URI", "");
        reference
            .add_child("dsig:Transforms")
            .add_child("dsig:Transform")
            .set_attribute("Algorithm", dsig::ENVELOPED_SIGNATURE);
        reference
            .add_child("dsig:DigestMethod")
            .set_attribute("Algorithm", digest);
        reference.add_child("dsig:DigestValue");

        signature.add_child("dsig:SignatureValue");
        signature.add_child("dsig:KeyInfo");
        root.push(signature);

        self.add_signature_value(root, "dsig")
    }

    /// Complete the `Signature` element which is a child of `root`.
    ///
    /// Every `<Reference>` gets its digest, `<KeyInfo>` gets the chain's
    /// certificates (root first) and `<SignatureValue>` is computed with the
    /// leaf's private key. `prefix` is the namespace prefix used for the
    /// XML-DSig elements.
    pub fn add_signature_value(&self, root: &mut Element, prefix: &str) -> Result<()> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| Error::InvalidChain("chain has no private key to sign with".to_owned()))?;

        dsig::fill_references(root)?;

        let signature = root
            .child_mut("Signature")
            .ok_or_else(|| Error::MissingElement("Signature".to_owned()))?;
        let key_info = signature
            .child_mut("KeyInfo")
            .ok_or_else(|| Error::MissingElement("KeyInfo".to_owned()))?;

        let name = |local: &str| match prefix {
            "" => local.to_owned(),
            p => format!("{p}:{local}"),
        };

        key_info.children.clear();
        for certificate in self.root_to_leaf() {
            let data = key_info.add_child(name("X509Data"));
            let serial = data.add_child(name("X509IssuerSerial"));
            serial.add_text_child(name("X509IssuerName"), certificate.issuer());
            serial.add_text_child(name("X509SerialNumber"), certificate.serial()?);
            data.add_text_child(name("X509Certificate"), certificate.certificate(false)?);
        }

        dsig::fill_signature_value(root, key)
    }

    /// Make a new root, intermediate and leaf chain, each signed by the one before.
    pub fn generate(subject: &ChainSubject) -> Result<Self> {
        let root_key = PKey::from_rsa(Rsa::generate(subject.key_bits)?)?;
        let intermediate_key = PKey::from_rsa(Rsa::generate(subject.key_bits)?)?;
        let leaf_key = PKey::from_rsa(Rsa::generate(subject.key_bits)?)?;

        let root_name = name(subject, &subject.root_common_name, &root_key)?;
        let intermediate_name = name(subject, &subject.intermediate_common_name, &intermediate_key)?;
        let leaf_name = name(subject, &subject.leaf_common_name, &leaf_key)?;

        let days = subject.validity_days;
        let root = build(
            &root_name,
            &root_name,
            5,
            days,
            &root_key,
            &root_key,
            Some(3),
        )?;
        let intermediate = build(
            &intermediate_name,
            &root_name,
            6,
            days.saturating_sub(1),
            &intermediate_key,
            &root_key,
            Some(2),
        )?;
        let leaf = build(
            &leaf_name,
            &intermediate_name,
            7,
            days.saturating_sub(2),
            &leaf_key,
            &intermediate_key,
            None,
        )?;

        log::debug!("generated certificate chain for {}", subject.organisation);

        Ok(Self {
            certificates: vec![
                Certificate::new(root),
                Certificate::new(intermediate),
                Certificate::new(leaf),
            ],
            key: Some(leaf_key),
        })
    }
}

// Visits every ordering of `order[start..]` until `visit` returns Some.
fn permute<T>(
    order: &mut Vec<usize>,
    start: usize,
    visit: &mut dyn FnMut(&[usize]) -> Option<T>,
) -> Option<T> {
    if start == order.len() {
        return visit(order);
    }

    for i in start..order.len() {
        order.swap(start, i);
        if let Some(found) = permute(order, start + 1, visit) {
            return Some(found);
        }
        order.swap(start, i);
    }

    None
}

// dnQualifier is the base64 SHA-1 of the subject's public key.
fn name(subject: &ChainSubject, common_name: &str, key: &PKey<Private>) -> Result<X509Name> {
    let mut sha = Sha1::new();
    sha.update(&key.public_key_to_der()?);
    let qualifier = utils::encode_base64(sha.finish());

    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_text("O", &subject.organisation)?;
    name.append_entry_by_text("OU", &subject.organisational_unit)?;
    name.append_entry_by_text("CN", common_name)?;
    name.append_entry_by_text("dnQualifier", &qualifier)?;
    Ok(name.build())
}

fn build(
    subject: &X509Name,
    issuer: &X509Name,
    serial: u32,
    days: u32,
    key: &PKey<Private>,
    issuer_key: &PKey<Private>,
    ca_path_length: Option<u32>,
) -> Result<X509> {
    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    let serial_number = BigNum::from_u32(serial)?.to_asn1_integer()?;
    builder.set_serial_number(&serial_number)?;
    builder.set_subject_name(subject)?;
    builder.set_issuer_name(issuer)?;
    builder.set_pubkey(key)?;
    let not_before = Asn1Time::days_from_now(0)?;
    let not_after = Asn1Time::days_from_now(days)?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;

    let mut constraints = BasicConstraints::new();
    constraints.critical();
    let mut usage = KeyUsage::new();
    usage.critical();
    match ca_path_length {
        Some(length) => {
            constraints.ca().pathlen(length);
            usage.key_cert_sign().crl_sign();
        }
        None => {
            usage.digital_signature().key_encipherment();
        }
    }
    builder.append_extension(constraints.build()?)?;
    builder.append_extension(usage.build()?)?;

    let identifier = SubjectKeyIdentifier::new().build(&builder.x509v3_context(None, None))?;
    builder.append_extension(identifier)?;

    builder.sign(issuer_key, MessageDigest::sha256())?;
    Ok(builder.build())
}
