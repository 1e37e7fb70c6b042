use crate::{Error, Key, Result, Standard, certificate::Certificate, utils};
use openssl::{
    pkey::{PKeyRef, Private},
    rsa::Padding,
};
use uuid::Uuid;

/// Fixed first 16 bytes of every key block.
pub const STRUCTURE_ID: [u8; 16] = [
    0xf1, 0xdc, 0x12, 0x44, 0x60, 0x16, 0x9a, 0x0e, 0x85, 0xbc, 0x30, 0x06, 0x42, 0xf8, 0x66, 0xab,
];

const SMPTE_LENGTH: usize = 138;
const INTEROP_LENGTH: usize = 134;
const TIMESTAMP_LENGTH: usize = 25;

/// One content key as carried, RSA-encrypted, in a KDM.
///
/// The SMPTE block is laid out as
///
/// | bytes      | field                     |
/// |------------|---------------------------|
/// | 0..16      | structure id              |
/// | 16..36     | signer thumbprint         |
/// | 36..52     | CPL id                    |
/// | 52..56     | key type (e.g. `MDIK`)    |
/// | 56..72     | key id                    |
/// | 72..97     | not valid before          |
/// | 97..122    | not valid after           |
/// | 122..138   | content key               |
///
/// The Interop block is the same without the key type, so 134 bytes long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdmKey {
    pub standard: Standard,
    pub signer_thumbprint: [u8; 20],
    pub cpl_id: String,
    /// Empty for a key read from an Interop block until it is found in the KDM's key id list.
    pub key_type: String,
    pub key_id: String,
    pub not_valid_before: String,
    pub not_valid_after: String,
    pub key: Key,
}

impl KdmKey {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let bad = |reason: String| Error::InvalidKdmKey(reason);

        if self.not_valid_before.len() != TIMESTAMP_LENGTH || self.not_valid_after.len() != TIMESTAMP_LENGTH {
            return Err(bad(format!(
                "validity timestamps must be {TIMESTAMP_LENGTH} bytes: {} / {}",
                self.not_valid_before, self.not_valid_after
            )));
        }

        let mut block = Vec::with_capacity(SMPTE_LENGTH);
        block.extend_from_slice(&STRUCTURE_ID);
        block.extend_from_slice(&self.signer_thumbprint);
        block.extend_from_slice(Uuid::parse_str(&self.cpl_id)?.as_bytes());

        if self.standard == Standard::Smpte {
            if self.key_type.len() != 4 || !self.key_type.is_ascii() {
                return Err(bad(format!("key type '{}' is not 4 characters", self.key_type)));
            }
            block.extend_from_slice(self.key_type.as_bytes());
        }

        block.extend_from_slice(Uuid::parse_str(&self.key_id)?.as_bytes());
        block.extend_from_slice(self.not_valid_before.as_bytes());
        block.extend_from_slice(self.not_valid_after.as_bytes());
        block.extend_from_slice(self.key.as_bytes());
        Ok(block)
    }

    /// Unpack a decrypted block, choosing the layout from its length.
    pub fn from_bytes(block: &[u8]) -> Result<Self> {
        let standard = match block.len() {
            SMPTE_LENGTH => Standard::Smpte,
            INTEROP_LENGTH => Standard::Interop,
            x => {
                return Err(Error::InvalidKdmKey(format!(
                    "key block is {x} bytes, not {INTEROP_LENGTH} or {SMPTE_LENGTH}"
                )));
            }
        };

        if block[..16] != STRUCTURE_ID {
            return Err(Error::InvalidKdmKey(format!(
                "unexpected structure id {}",
                hex::encode(&block[..16])
            )));
        }

        let mut reader = Fields { block, offset: 16 };

        let mut signer_thumbprint = [0; 20];
        signer_thumbprint.copy_from_slice(reader.take(20));
        let cpl_id = reader.uuid()?;
        let key_type = match standard {
            Standard::Smpte => reader.text(4),
            Standard::Interop => String::new(),
        };
        let key_id = reader.uuid()?;
        let not_valid_before = reader.text(TIMESTAMP_LENGTH);
        let not_valid_after = reader.text(TIMESTAMP_LENGTH);
        let key = Key::from_slice(reader.take(Key::LENGTH))?;

        Ok(Self {
            standard,
            signer_thumbprint,
            cpl_id,
            key_type,
            key_id,
            not_valid_before,
            not_valid_after,
            key,
        })
    }

    /// RSA-OAEP encrypt this block for `recipient`, returning base64.
    pub fn encrypt(&self, recipient: &Certificate) -> Result<String> {
        let block = self.to_bytes()?;
        let rsa = recipient.public_key()?.rsa()?;

        let mut encrypted = vec![0; rsa.size() as usize];
        let length = rsa.public_encrypt(&block, &mut encrypted, Padding::PKCS1_OAEP)?;
        encrypted.truncate(length);

        Ok(utils::encode_base64(encrypted))
    }

    /// Decrypt a base64 `<CipherValue>` with the recipient's private key.
    pub fn decrypt(cipher_value: &str, key: &PKeyRef<Private>) -> Result<Self> {
        let encrypted = utils::decode_base64(cipher_value).map_err(|e| Error::KdmDecode(e.to_string()))?;
        let rsa = key.rsa()?;

        let mut decrypted = vec![0; rsa.size() as usize];
        let length = rsa
            .private_decrypt(&encrypted, &mut decrypted, Padding::PKCS1_OAEP)
            .map_err(|e| Error::KdmDecode(e.to_string()))?;

        Self::from_bytes(&decrypted[..length])
    }
}

struct Fields<'a> {
    block: &'a [u8],
    offset: usize,
}

impl<'a> Fields<'a> {
    fn take(&mut self, length: usize) -> &'a [u8] {
        let field = &self.block[self.offset..self.offset + length];
        self.offset += length;
        field
    }

    fn text(&mut self, length: usize) -> String {
        String::from_utf8_lossy(self.take(length)).into_owned()
    }

    fn uuid(&mut self) -> Result<String> {
        Ok(Uuid::from_slice(self.take(16))?.hyphenated().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(standard: Standard) -> KdmKey {
        KdmKey {
            standard,
            signer_thumbprint: [7; 20],
            cpl_id: "81fb54df-e1bf-4647-8788-ea7ba154375b".to_owned(),
            key_type: "MDIK".to_owned(),
            key_id: "4ac4f922-8239-4831-b23b-31426d0542c4".to_owned(),
            not_valid_before: "2013-01-01T00:00:00+00:00".to_owned(),
            not_valid_after: "2013-01-08T00:00:00+00:00".to_owned(),
            key: "8a2729c3e5b65c45d78305462104c3fb".parse().unwrap(),
        }
    }

    #[test]
    fn smpte_layout() {
        let block = key(Standard::Smpte).to_bytes().unwrap();
        assert_eq!(block.len(), 138);
        assert_eq!(&block[..16], &STRUCTURE_ID);
        assert_eq!(&block[16..36], &[7; 20]);
        assert_eq!(block[36], 0x81);
        assert_eq!(&block[52..56], b"MDIK");
        assert_eq!(block[56], 0x4a);
        assert_eq!(&block[72..97], b"2013-01-01T00:00:00+00:00");
        assert_eq!(&block[97..122], b"2013-01-08T00:00:00+00:00");
        assert_eq!(block[122], 0x8a);
        assert_eq!(KdmKey::from_bytes(&block).unwrap(), key(Standard::Smpte));
    }

    #[test]
    fn interop_layout() {
        let block = key(Standard::Interop).to_bytes().unwrap();
        assert_eq!(block.len(), 134);
        assert_eq!(block[52], 0x4a);

        let read = KdmKey::from_bytes(&block).unwrap();
        assert_eq!(read.standard, Standard::Interop);
        assert_eq!(read.key_type, "");
        assert_eq!(read.key_id, "4ac4f922-8239-4831-b23b-31426d0542c4");
        assert_eq!(read.key, key(Standard::Interop).key);
    }

    #[test]
    fn bad_blocks() {
        let mut block = key(Standard::Smpte).to_bytes().unwrap();
        assert!(matches!(KdmKey::from_bytes(&block[..137]), Err(Error::InvalidKdmKey(_))));

        block[0] = 0;
        assert!(matches!(KdmKey::from_bytes(&block), Err(Error::InvalidKdmKey(_))));

        let mut bad = key(Standard::Smpte);
        bad.key_type = "MDI".to_owned();
        assert!(bad.to_bytes().is_err());
    }
}
