//! Enveloped XML signatures over [`Element`] trees.
//!
//! The canonical form used for digests is [`Element::canonicalize`], so
//! whitespace-only text between elements is not part of what is signed.

use crate::{
    Error, Result,
    certificate::Certificate,
    certificate_chain::CertificateChain,
    utils,
    xml::Element,
};
use openssl::{
    hash::{MessageDigest, hash},
    pkey::{PKeyRef, Private},
    sign::{Signer, Verifier},
};
use std::{collections::BTreeMap, path::Path};

pub const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const C14N: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
pub const C14N_WITH_COMMENTS: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments";
pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
pub const RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
pub const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
pub const SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

fn message_digest(algorithm: &str) -> Result<MessageDigest> {
    match algorithm {
        SHA1 | RSA_SHA1 => Ok(MessageDigest::sha1()),
        SHA256 | RSA_SHA256 => Ok(MessageDigest::sha256()),
        x => Err(Error::BadSignature(format!("unsupported algorithm {x}"))),
    }
}

fn signature(root: &Element) -> Result<&Element> {
    root.child("Signature")
        .ok_or_else(|| Error::BadSignature("document is not signed".to_owned()))
}

fn algorithm(parent: &Element, child: &str) -> Result<String> {
    parent
        .required_child(child)?
        .attribute("Algorithm")
        .map(|x| x.to_owned())
        .ok_or_else(|| Error::BadSignature(format!("<{child}> has no Algorithm")))
}

// Base64 digest of the part of `root` named by a `<Reference>`.
fn reference_digest(root: &Element, reference: &Element) -> Result<String> {
    let uri = reference.attribute("URI").unwrap_or_default();
    let enveloped = reference
        .child("Transforms")
        .is_some_and(|x| {
            x.children_named("Transform")
                .any(|t| t.attribute("Algorithm") == Some(ENVELOPED_SIGNATURE))
        });

    let is_signature = |e: &Element| e.local_name() == "Signature";
    let exclude: Option<&dyn Fn(&Element) -> bool> = if enveloped { Some(&is_signature) } else { None };

    let canonical = match uri.strip_prefix('#') {
        None if uri.is_empty() => root.canonicalize(&BTreeMap::new(), exclude),
        None => return Err(Error::BadSignature(format!("unsupported reference URI {uri}"))),
        Some(id) => {
            let matches = |e: &Element| e.attribute("Id") == Some(id);
            let target = root
                .find(&matches)
                .ok_or_else(|| Error::BadSignature(format!("no element with Id {id}")))?;
            let inherited = root.namespaces_above(&matches).unwrap_or_default();
            target.canonicalize(&inherited, exclude)
        }
    };

    let digest = hash(message_digest(&algorithm(reference, "DigestMethod")?)?, canonical.as_bytes())?;
    Ok(utils::encode_base64(&digest[..]))
}

fn canonical_signed_info(root: &Element) -> Result<String> {
    let signed_info = signature(root)?.required_child("SignedInfo")?;
    let inherited = root
        .namespaces_above(&|e| e.local_name() == "SignedInfo")
        .unwrap_or_default();
    Ok(signed_info.canonicalize(&inherited, None))
}

/// Compute the `<DigestValue>` of every `<Reference>` in the signature of `root`.
pub(crate) fn fill_references(root: &mut Element) -> Result<()> {
    let digests = signature(root)?
        .required_child("SignedInfo")?
        .children_named("Reference")
        .map(|x| reference_digest(root, x))
        .collect::<Result<Vec<_>>>()?;

    let signed_info = root
        .child_mut("Signature")
        .and_then(|x| x.child_mut("SignedInfo"))
        .ok_or_else(|| Error::MissingElement("SignedInfo".to_owned()))?;

    for (reference, digest) in signed_info
        .elements_mut()
        .filter(|x| x.local_name() == "Reference")
        .zip(digests)
    {
        reference
            .child_mut("DigestValue")
            .ok_or_else(|| Error::MissingElement("DigestValue".to_owned()))?
            .set_text(digest);
    }

    Ok(())
}

/// Sign the canonical `<SignedInfo>` and store the result in `<SignatureValue>`.
pub(crate) fn fill_signature_value(root: &mut Element, key: &PKeyRef<Private>) -> Result<()> {
    let method = algorithm(signature(root)?.required_child("SignedInfo")?, "SignatureMethod")?;
    let canonical = canonical_signed_info(root)?;

    let mut signer = Signer::new(message_digest(&method)?, key)?;
    signer.update(canonical.as_bytes())?;
    let value = utils::encode_base64(signer.sign_to_vec()?);

    root.child_mut("Signature")
        .and_then(|x| x.child_mut("SignatureValue"))
        .ok_or_else(|| Error::MissingElement("SignatureValue".to_owned()))?
        .set_text(value);
    Ok(())
}

/// Check the signature of a document, returning the chain which signed it.
///
/// Every reference digest must match, the certificates in `<KeyInfo>` must
/// form a valid chain and the signature value must verify with its leaf.
pub fn verify(root: &Element) -> Result<CertificateChain> {
    let signature = signature(root)?;

    let certificates = signature
        .required_child("KeyInfo")?
        .children_named("X509Data")
        .filter_map(|x| x.child("X509Certificate"))
        .map(|x| Certificate::from_pem(&x.text()))
        .collect::<Result<Vec<_>>>()?;

    let mut chain = CertificateChain::from_certificates(certificates);
    if chain.attempt_reorder().is_err() {
        return Err(Error::InvalidChain(chain.diagnostics().join("; ")));
    }

    let signed_info = signature.required_child("SignedInfo")?;
    for reference in signed_info.children_named("Reference") {
        let expected = reference.string_child("DigestValue")?;
        if reference_digest(root, reference)? != expected.trim() {
            return Err(Error::BadSignature(format!(
                "digest of reference '{}' does not match",
                reference.attribute("URI").unwrap_or_default()
            )));
        }
    }

    let method = algorithm(signed_info, "SignatureMethod")?;
    let value = utils::decode_base64(signature.string_child("SignatureValue")?)?;
    let public_key = chain.leaf()?.public_key()?;

    let mut verifier = Verifier::new(message_digest(&method)?, &public_key)?;
    verifier.update(canonical_signed_info(root)?.as_bytes())?;
    if !verifier.verify(&value)? {
        return Err(Error::BadSignature("signature value does not verify".to_owned()));
    }

    Ok(chain)
}

pub fn verify_file(path: &Path) -> Result<CertificateChain> {
    verify(&Element::read_file(path)?)
}
