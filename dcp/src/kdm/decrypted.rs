use super::{
    AUDIO_DISABLE, PICTURE_DISABLE,
    encrypted::{AuthenticatedPublic, EncryptedKdm, IssuerSerial},
    key::KdmKey,
};
use crate::{
    Error, Result, Standard,
    certificate::Certificate,
    certificate_chain::CertificateChain,
    cpl::Cpl,
    utils,
};
use chrono::{DateTime, FixedOffset};
use openssl::pkey::{PKeyRef, Private};

/// A KDM whose content keys are in the clear.
///
/// Made either by an author from a CPL whose keys are known, ready to be
/// [`encrypt`](Self::encrypt)ed for a recipient, or by a recipient from an
/// [`EncryptedKdm`] and its private key.
#[derive(Debug, Clone)]
pub struct DecryptedKdm {
    pub id: String,
    pub annotation_text: Option<String>,
    pub content_title_text: String,
    pub issue_date: String,
    cpl_id: String,
    not_valid_before: String,
    not_valid_after: String,
    keys: Vec<KdmKey>,
}

impl DecryptedKdm {
    /// Collect the content key of every encrypted asset in `cpl`.
    ///
    /// Every asset with a key id must also have its key, and the validity
    /// window must not end before it starts.
    pub fn new<T: Into<String>>(
        cpl: &Cpl,
        not_valid_before: &DateTime<FixedOffset>,
        not_valid_after: &DateTime<FixedOffset>,
        annotation_text: Option<String>,
        issue_date: T,
        standard: Standard,
    ) -> Result<Self> {
        let not_valid_before = utils::format_timestamp(not_valid_before);
        let not_valid_after = utils::format_timestamp(not_valid_after);
        check_window(&not_valid_before, &not_valid_after)?;

        let mut keys = vec![];
        for asset in cpl.reel_assets() {
            let Some(key_id) = &asset.key_id else {
                continue;
            };
            let key = asset.key.ok_or_else(|| Error::MissingKey(key_id.clone()))?;

            keys.push(KdmKey {
                standard,
                signer_thumbprint: [0; 20],
                cpl_id: cpl.id.clone(),
                key_type: asset.kind.key_type().to_owned(),
                key_id: key_id.clone(),
                not_valid_before: not_valid_before.clone(),
                not_valid_after: not_valid_after.clone(),
                key,
            });
        }

        Ok(Self {
            id: utils::make_uuid(),
            annotation_text,
            content_title_text: cpl.content_title_text.clone(),
            issue_date: issue_date.into(),
            cpl_id: cpl.id.clone(),
            not_valid_before,
            not_valid_after,
            keys,
        })
    }

    /// Decrypt every key in `kdm` with the recipient's private key.
    pub fn decrypt(kdm: &EncryptedKdm, private_key: &PKeyRef<Private>) -> Result<Self> {
        let public = kdm.public();

        let keys = kdm
            .keys()
            .iter()
            .map(|x| {
                let mut key = KdmKey::decrypt(x, private_key)?;
                // Interop blocks have no key type; the public key id list does.
                if key.key_type.is_empty()
                    && let Some((key_type, _)) = public.key_ids.iter().find(|(_, id)| *id == key.key_id)
                {
                    key.key_type = key_type.clone();
                }
                Ok(key)
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!("decrypted {} keys for CPL {}", keys.len(), public.cpl_id);

        Ok(Self {
            id: public.message_id.clone(),
            annotation_text: public.annotation_text.clone(),
            content_title_text: public.content_title_text.clone(),
            issue_date: public.issue_date.clone(),
            cpl_id: public.cpl_id.clone(),
            not_valid_before: public.not_valid_before.clone(),
            not_valid_after: public.not_valid_after.clone(),
            keys,
        })
    }

    pub fn cpl_id(&self) -> &str {
        &self.cpl_id
    }

    pub fn not_valid_before(&self) -> &str {
        &self.not_valid_before
    }

    pub fn not_valid_after(&self) -> &str {
        &self.not_valid_after
    }

    pub fn keys(&self) -> &[KdmKey] {
        &self.keys
    }

    /// Encrypt the keys for `recipient` and sign the result with `signer`.
    pub fn encrypt(&self, signer: &CertificateChain, recipient: &Certificate) -> Result<EncryptedKdm> {
        let leaf = signer.leaf()?;
        let signer_thumbprint = leaf.thumbprint_bytes()?;

        let encrypted_keys = self
            .keys
            .iter()
            .map(|x| {
                KdmKey {
                    signer_thumbprint,
                    ..x.clone()
                }
                .encrypt(recipient)
            })
            .collect::<Result<Vec<_>>>()?;

        let public = AuthenticatedPublic {
            message_id: self.id.clone(),
            annotation_text: self.annotation_text.clone(),
            issue_date: self.issue_date.clone(),
            signer: IssuerSerial {
                issuer_name: leaf.issuer(),
                serial_number: leaf.serial()?,
            },
            recipient: IssuerSerial {
                issuer_name: recipient.issuer(),
                serial_number: recipient.serial()?,
            },
            recipient_subject_name: recipient.subject(),
            cpl_id: self.cpl_id.clone(),
            content_title_text: self.content_title_text.clone(),
            not_valid_before: self.not_valid_before.clone(),
            not_valid_after: self.not_valid_after.clone(),
            device_list_identifier: utils::make_uuid(),
            device_list_description: Some(recipient.subject()),
            device_thumbprints: vec![recipient.thumbprint()?],
            key_ids: self
                .keys
                .iter()
                .map(|x| (x.key_type.clone(), x.key_id.clone()))
                .collect(),
            forensic_mark_flags: vec![PICTURE_DISABLE.to_owned(), AUDIO_DISABLE.to_owned()],
        };

        EncryptedKdm::new(public, encrypted_keys, signer)
    }
}

fn check_window(not_valid_before: &str, not_valid_after: &str) -> Result<()> {
    if utils::parse_timestamp(not_valid_before)? > utils::parse_timestamp(not_valid_after)? {
        return Err(Error::InvalidValidity {
            not_valid_before: not_valid_before.to_owned(),
            not_valid_after: not_valid_after.to_owned(),
        });
    }
    Ok(())
}
