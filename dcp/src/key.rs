use crate::{Error, Result};
use std::{fmt, str::FromStr};

/// A 128-bit AES content key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key([u8; Key::LENGTH]);

impl Key {
    pub const LENGTH: usize = 16;

    pub fn new(value: [u8; Self::LENGTH]) -> Self {
        Self(value)
    }

    /// A new key from the system's secure random source.
    pub fn random() -> Result<Self> {
        let mut value = [0; Self::LENGTH];
        openssl::rand::rand_bytes(&mut value)?;
        Ok(Self(value))
    }

    pub fn from_slice(value: &[u8]) -> Result<Self> {
        let value = <[u8; Self::LENGTH]>::try_from(value).map_err(|_| {
            Error::InvalidKdmKey(format!("content key is {} bytes, not {}", value.len(), Self::LENGTH))
        })?;
        Ok(Self(value))
    }

    pub fn as_bytes(&self) -> &[u8; Self::LENGTH] {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

// Keep key material out of logs.
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(..)")
    }
}

impl FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_slice(&hex::decode(s.trim())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_form() {
        let key = "00112233445566778899aabbccddeeff".parse::<Key>().unwrap();
        assert_eq!(key.as_bytes()[15], 0xff);
        assert_eq!(key.to_string(), "00112233445566778899aabbccddeeff");
        assert!("0011".parse::<Key>().is_err());
        assert!("zz112233445566778899aabbccddeeff".parse::<Key>().is_err());
    }

    #[test]
    fn random_keys_differ() {
        assert_ne!(Key::random().unwrap(), Key::random().unwrap());
    }
}
