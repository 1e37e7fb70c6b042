//! Key Delivery Messages.
//!
//! A KDM carries the content keys of one CPL to one recipient. Each key is
//! packed into a fixed-length [`KdmKey`] block, RSA-OAEP encrypted with the
//! recipient's certificate and stored in a signed XML envelope
//! ([`EncryptedKdm`]). [`DecryptedKdm`] is the same message with its keys in
//! the clear.

mod decrypted;
mod encrypted;
mod key;

pub use decrypted::DecryptedKdm;
pub use encrypted::{
    AUDIO_DISABLE, AuthenticatedPublic, EncryptedKdm, IssuerSerial, MESSAGE_TYPE, PICTURE_DISABLE,
};
pub use key::{KdmKey, STRUCTURE_ID};
