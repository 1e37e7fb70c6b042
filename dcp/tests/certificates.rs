mod common;

use common::{RECIPIENT, SIGNER, TestResult, edit, find, metadata, reference_cpl};
use dcp::{CertificateChain, Dcp, Error, NameFormat, Standard, dsig};

#[test]
fn generated_chain_is_valid() {
    assert!(SIGNER.valid(), "{:?}", SIGNER.diagnostics());
    assert_eq!(SIGNER.len(), 3);
    assert!(SIGNER.key().is_some());

    let root = SIGNER.root().unwrap();
    assert_eq!(root.issuer(), root.subject());
    assert_eq!(
        SIGNER.leaf().unwrap().subject_common_name().as_deref(),
        Some("CS.smpte-430-2.LEAF.NOT_FOR_PRODUCTION")
    );
    assert_eq!(
        RECIPIENT.leaf().unwrap().subject_organization_name().as_deref(),
        Some("cinema.example.org")
    );

    let mut reversed = SIGNER.leaf_to_root();
    reversed.reverse();
    assert_eq!(reversed, SIGNER.root_to_leaf());
}

#[test]
fn every_order_can_be_repaired() -> TestResult {
    let certificates = SIGNER.root_to_leaf().into_iter().cloned().collect::<Vec<_>>();

    for order in [[0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]] {
        let mut chain = CertificateChain::from_certificates(order.iter().map(|x| certificates[*x].clone()).collect());
        assert!(!chain.valid());

        chain.attempt_reorder()?;
        assert!(chain.valid(), "{order:?}: {:?}", chain.diagnostics());
        assert_eq!(chain.root_to_leaf(), SIGNER.root_to_leaf());

        chain.attempt_reorder()?;
        assert_eq!(chain.root_to_leaf(), SIGNER.root_to_leaf());
    }

    Ok(())
}

#[test]
fn unrelated_certificates_are_diagnosed() -> TestResult {
    let mut chain = CertificateChain::from_certificates(vec![SIGNER.root()?.clone(), RECIPIENT.leaf()?.clone()]);
    assert!(!chain.valid());

    let diagnostics = chain.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].starts_with("certificate 1 is issued by"), "{diagnostics:?}");

    assert!(matches!(chain.attempt_reorder(), Err(Error::InvalidChain(_))));
    // Left as it was.
    assert_eq!(chain.leaf()?, RECIPIENT.leaf()?);

    assert_eq!(CertificateChain::new().diagnostics(), ["chain is empty"]);
    Ok(())
}

#[test]
fn wrong_key_is_diagnosed() -> TestResult {
    let mut chain = CertificateChain::from_pem_bundle(&SIGNER.chain_pem()?)?;
    assert!(chain.valid());

    chain.set_key(RECIPIENT.key().ok_or("no key")?.to_owned());
    assert_eq!(chain.diagnostics(), ["private key does not match leaf certificate"]);
    Ok(())
}

#[test]
fn pem_round_trip() -> TestResult {
    let dir = tempfile::tempdir()?;

    // Leaf first, as some tools write them.
    let pem = SIGNER
        .leaf_to_root()
        .iter()
        .map(|x| x.certificate(true))
        .collect::<Result<String, _>>()?;
    let chain = CertificateChain::from_pem_bundle(&pem)?;
    assert!(chain.valid());
    assert_eq!(chain.root_to_leaf(), SIGNER.root_to_leaf());

    let chain_path = dir.path().join("chain.pem");
    let key_path = dir.path().join("leaf.key");
    std::fs::write(&chain_path, SIGNER.chain_pem()?)?;
    std::fs::write(&key_path, SIGNER.key_pem()?.ok_or("no key")?)?;

    let mut chain = CertificateChain::from_pem_file(&chain_path)?;
    chain.set_key_from_pem_file(&key_path)?;
    assert!(chain.valid(), "{:?}", chain.diagnostics());
    assert_eq!(chain.leaf()?.thumbprint()?, SIGNER.leaf()?.thumbprint()?);
    Ok(())
}

#[test]
fn invalid_chain_refuses_to_sign() -> TestResult {
    let dir = tempfile::tempdir()?;
    let mut cpl = reference_cpl(dir.path(), None)?;

    let signer = CertificateChain::from_certificates(vec![SIGNER.leaf()?.clone()]);
    let err = cpl
        .write_xml(&dir.path().join("cpl.xml"), Standard::Smpte, Some(&signer))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidChain(_)));
    Ok(())
}

fn signed_package(standard: Standard, digest: &str) -> TestResult {
    let dir = tempfile::tempdir()?;
    let mut dcp = Dcp::new(dir.path())?;
    let cpl = reference_cpl(dcp.directory(), None)?;
    dcp.add(cpl);
    dcp.write_xml(standard, &metadata(), Some(&SIGNER), &NameFormat::default())?;

    let cpl = find(dir.path(), "cpl_")?;
    let pkl = find(dir.path(), "pkl_")?;
    for path in [&cpl, &pkl] {
        let chain = dsig::verify_file(path)?;
        assert_eq!(chain.root_to_leaf(), SIGNER.root_to_leaf());
        assert!(std::fs::read_to_string(path)?.contains(&format!("<dsig:DigestMethod Algorithm=\"{digest}\"")));
    }

    edit(&cpl, "A Test DCP", "A Different DCP")?;
    assert!(matches!(dsig::verify_file(&cpl), Err(Error::BadSignature(_))));
    Ok(())
}

#[test]
fn signed_smpte_package() -> TestResult {
    signed_package(Standard::Smpte, dsig::SHA256)
}

#[test]
fn signed_interop_package() -> TestResult {
    signed_package(Standard::Interop, dsig::SHA1)
}
