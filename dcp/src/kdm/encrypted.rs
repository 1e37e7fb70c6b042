use crate::{
    Error, Result,
    certificate_chain::CertificateChain,
    dsig,
    utils,
    xml::Element,
};
use std::path::Path;

pub const ETM_NS: &str = "http://www.smpte-ra.org/schemas/430-3/2006/ETM";
pub const KDM_NS: &str = "http://www.smpte-ra.org/schemas/430-1/2006/KDM";
pub const ENC_NS: &str = "http://www.w3.org/2001/04/xmlenc#";
pub const MESSAGE_TYPE: &str = "http://www.smpte-ra.org/430-1/2006/KDM#kdm-key-type";
pub const PICTURE_DISABLE: &str = "http://www.smpte-ra.org/430-1/2006/KDM#mrkflg-picture-disable";
pub const AUDIO_DISABLE: &str = "http://www.smpte-ra.org/430-1/2006/KDM#mrkflg-audio-disable";
const RSA_OAEP: &str = "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p";

/// X.509 issuer and serial number identifying a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IssuerSerial {
    pub issuer_name: String,
    pub serial_number: String,
}

/// Public part of a KDM, readable without the recipient's private key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthenticatedPublic {
    pub message_id: String,
    pub annotation_text: Option<String>,
    pub issue_date: String,
    pub signer: IssuerSerial,
    pub recipient: IssuerSerial,
    pub recipient_subject_name: String,
    pub cpl_id: String,
    pub content_title_text: String,
    pub not_valid_before: String,
    pub not_valid_after: String,
    pub device_list_identifier: String,
    pub device_list_description: Option<String>,
    pub device_thumbprints: Vec<String>,
    /// `(key type, key id)` for every key in the private part.
    pub key_ids: Vec<(String, String)>,
    pub forensic_mark_flags: Vec<String>,
}

/// A signed KDM whose content keys are still encrypted for their recipient.
#[derive(Debug, Clone)]
pub struct EncryptedKdm {
    public: AuthenticatedPublic,
    encrypted_keys: Vec<String>,
    root: Element,
}

impl EncryptedKdm {
    /// Build and sign a KDM.
    pub(crate) fn new(
        public: AuthenticatedPublic,
        encrypted_keys: Vec<String>,
        signer: &CertificateChain,
    ) -> Result<Self> {
        let mut root = build(&public, &encrypted_keys);
        signer.add_signature_value(&mut root, "ds")?;

        Ok(Self {
            public,
            encrypted_keys,
            root,
        })
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        let root = Element::parse(xml)?;
        if root.local_name() != "DCinemaSecurityMessage" {
            return Err(Error::Xml(format!(
                "expected DCinemaSecurityMessage, found {}",
                root.local_name()
            )));
        }

        let public = parse_public(root.required_child("AuthenticatedPublic")?)?;
        let encrypted_keys = root
            .required_child("AuthenticatedPrivate")?
            .children_named("EncryptedKey")
            .map(|x| {
                Ok(x.required_child("CipherData")?
                    .string_child("CipherValue")?
                    .trim()
                    .to_owned())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            public,
            encrypted_keys,
            root,
        })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let xml = std::fs::read_to_string(path).map_err(|e| Error::file("could not read KDM", path, &e))?;
        Self::from_xml(&xml)
    }

    pub fn public(&self) -> &AuthenticatedPublic {
        &self.public
    }

    pub fn cpl_id(&self) -> &str {
        &self.public.cpl_id
    }

    /// Base64 cipher values of the encrypted key blocks, in document order.
    pub fn keys(&self) -> &[String] {
        &self.encrypted_keys
    }

    pub fn as_xml(&self) -> Result<String> {
        self.root.to_xml()
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        self.root.write_file(path)
    }

    /// Check the KDM's signature, returning the chain which signed it.
    pub fn verify_signature(&self) -> Result<CertificateChain> {
        dsig::verify(&self.root)
    }
}

fn issuer_serial(parent: &mut Element, value: &IssuerSerial) {
    parent.add_text_child("ds:X509IssuerName", &value.issuer_name);
    parent.add_text_child("ds:X509SerialNumber", &value.serial_number);
}

fn build(public: &AuthenticatedPublic, encrypted_keys: &[String]) -> Element {
    let mut root = Element::with_namespace("DCinemaSecurityMessage", ETM_NS);
    root.set_attribute("xmlns:ds", dsig::DSIG_NS);
    root.set_attribute("xmlns:enc", ENC_NS);

    let apu = root.add_child("AuthenticatedPublic");
    apu.set_attribute("Id", "ID_AuthenticatedPublic");
    apu.add_text_child("MessageId", format!("urn:uuid:{}", public.message_id));
    apu.add_text_child("MessageType", MESSAGE_TYPE);
    if let Some(annotation_text) = &public.annotation_text {
        apu.add_text_child("AnnotationText", annotation_text);
    }
    apu.add_text_child("IssueDate", &public.issue_date);
    issuer_serial(apu.add_child("Signer"), &public.signer);

    let extensions = apu
        .add_child("RequiredExtensions")
        .push(Element::with_namespace("KDMRequiredExtensions", KDM_NS));

    let recipient = extensions.add_child("Recipient");
    issuer_serial(recipient.add_child("X509IssuerSerial"), &public.recipient);
    recipient.add_text_child("X509SubjectName", &public.recipient_subject_name);

    extensions.add_text_child("CompositionPlaylistId", format!("urn:uuid:{}", public.cpl_id));
    extensions.add_text_child("ContentTitleText", &public.content_title_text);
    extensions.add_text_child("ContentKeysNotValidBefore", &public.not_valid_before);
    extensions.add_text_child("ContentKeysNotValidAfter", &public.not_valid_after);

    let device_info = extensions.add_child("AuthorizedDeviceInfo");
    device_info.add_text_child(
        "DeviceListIdentifier",
        format!("urn:uuid:{}", public.device_list_identifier),
    );
    if let Some(description) = &public.device_list_description {
        device_info.add_text_child("DeviceListDescription", description);
    }
    let device_list = device_info.add_child("DeviceList");
    for thumbprint in &public.device_thumbprints {
        device_list.add_text_child("CertificateThumbprint", thumbprint);
    }

    let key_id_list = extensions.add_child("KeyIdList");
    for (key_type, key_id) in &public.key_ids {
        let typed = key_id_list.add_child("TypedKeyId");
        typed
            .add_text_child("KeyType", key_type)
            .set_attribute("scope", MESSAGE_TYPE);
        typed.add_text_child("KeyId", format!("urn:uuid:{key_id}"));
    }

    let flags = extensions.add_child("ForensicMarkFlagList");
    for flag in &public.forensic_mark_flags {
        flags.add_text_child("ForensicMarkFlag", flag);
    }

    apu.add_child("NonCriticalExtensions");

    let private = root.add_child("AuthenticatedPrivate");
    private.set_attribute("Id", "ID_AuthenticatedPrivate");
    for cipher_value in encrypted_keys {
        let key = private.add_child("enc:EncryptedKey");
        let method = key.add_child("enc:EncryptionMethod");
        method.set_attribute("Algorithm", RSA_OAEP);
        method
            .add_child("ds:DigestMethod")
            .set_attribute("Algorithm", dsig::SHA1);
        key.add_child("enc:CipherData")
            .add_text_child("enc:CipherValue", cipher_value);
    }

    let signature = root.add_child("ds:Signature");
    let signed_info = signature.add_child("ds:SignedInfo");
    signed_info
        .add_child("ds:CanonicalizationMethod")
        .set_attribute("Algorithm", dsig::C14N_WITH_COMMENTS);
    signed_info
        .add_child("ds:SignatureMethod")
        .set_attribute("Algorithm", dsig::RSA_SHA256);
    for uri in ["#ID_AuthenticatedPublic", "#ID_AuthenticatedPrivate"] {
        let reference = signed_info.add_child("ds:Reference");
        reference.set_attribute("URI", uri);
        reference
            .add_child("ds:DigestMethod")
            .set_attribute("Algorithm", dsig::SHA256);
        reference.add_child("ds:DigestValue");
    }
    signature.add_child("ds:SignatureValue");
    signature.add_child("ds:KeyInfo");

    root
}

fn parse_issuer_serial(node: &Element) -> Result<IssuerSerial> {
    Ok(IssuerSerial {
        issuer_name: node.string_child("X509IssuerName")?,
        serial_number: node.string_child("X509SerialNumber")?,
    })
}

fn parse_public(apu: &Element) -> Result<AuthenticatedPublic> {
    let extensions = apu
        .required_child("RequiredExtensions")?
        .required_child("KDMRequiredExtensions")?;
    let recipient = extensions.required_child("Recipient")?;
    let device_info = extensions.required_child("AuthorizedDeviceInfo")?;

    let key_ids = extensions
        .required_child("KeyIdList")?
        .children_named("TypedKeyId")
        .map(|x| {
            Ok((
                x.string_child("KeyType")?.trim().to_owned(),
                utils::remove_urn_uuid(&x.string_child("KeyId")?),
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    let forensic_mark_flags = extensions
        .child("ForensicMarkFlagList")
        .map(|x| x.children_named("ForensicMarkFlag").map(|f| f.text()).collect())
        .unwrap_or_default();

    let device_thumbprints = device_info
        .child("DeviceList")
        .map(|x| x.children_named("CertificateThumbprint").map(|t| t.text()).collect())
        .unwrap_or_default();

    Ok(AuthenticatedPublic {
        message_id: utils::remove_urn_uuid(&apu.string_child("MessageId")?),
        annotation_text: apu.optional_string_child("AnnotationText"),
        issue_date: apu.string_child("IssueDate")?,
        signer: parse_issuer_serial(apu.required_child("Signer")?)?,
        recipient: parse_issuer_serial(recipient.required_child("X509IssuerSerial")?)?,
        recipient_subject_name: recipient.string_child("X509SubjectName")?,
        cpl_id: utils::remove_urn_uuid(&extensions.string_child("CompositionPlaylistId")?),
        content_title_text: extensions.string_child("ContentTitleText")?,
        not_valid_before: extensions.string_child("ContentKeysNotValidBefore")?,
        not_valid_after: extensions.string_child("ContentKeysNotValidAfter")?,
        device_list_identifier: utils::remove_urn_uuid(&device_info.string_child("DeviceListIdentifier")?),
        device_list_description: device_info.optional_string_child("DeviceListDescription"),
        device_thumbprints,
        key_ids,
        forensic_mark_flags,
    })
}
