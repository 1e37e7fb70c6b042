#![cfg_attr(docsrs, feature(doc_cfg))]

//! Read, write, sign and verify Digital Cinema Packages.
//!
//! A package ([`Dcp`]) is a directory holding an AssetMap, a packing list
//! ([`Pkl`]), one or more composition playlists ([`Cpl`]) and the essence
//! files their [`Reel`]s play. Content keys for encrypted essence travel in
//! Key Delivery Messages ([`kdm`]), signed with a [`CertificateChain`] and
//! encrypted for one recipient [`Certificate`].
//!
//! Both the Interop and SMPTE flavours of the format are supported.
//!
//! # Example
//!
//! ```no_run
//! use dcp::{Dcp, ReadOptions, essence::MxfProbe};
//!
//! let mut dcp = Dcp::new("/path/to/dcp".as_ref())?;
//! dcp.read(&ReadOptions::default(), &MxfProbe)?;
//!
//! for cpl in dcp.cpls() {
//!     println!("{} ({} reels)", cpl.content_title_text, cpl.reels.len());
//! }
//! # Ok::<(), dcp::Error>(())
//! ```

pub mod asset;
pub mod asset_map;
pub mod certificate;
pub mod certificate_chain;
pub mod compare;
pub mod cpl;
pub mod dcp;
pub mod dsig;
pub mod essence;
pub mod kdm;
pub mod pkl;
pub mod reel;
pub mod subtitle;
pub mod utils;
pub mod verify;
pub mod xml;

mod cancel;
mod error;
mod key;
mod metadata;
mod name_format;
mod types;

pub use asset::{Asset, AssetKind};
pub use cancel::CancellationToken;
pub use certificate::Certificate;
pub use certificate_chain::{CertificateChain, ChainSubject};
pub use cpl::Cpl;
pub use dcp::{Dcp, ReadOptions};
pub use error::{Error, Result};
pub use key::Key;
pub use metadata::XmlMetadata;
pub use name_format::NameFormat;
pub use pkl::Pkl;
pub use reel::{Reel, ReelAsset, ReelAssetKind};
pub use types::{ContentKind, EqualityOptions, Fraction, NoteType, ParsePolicy, Standard};
pub use verify::{VerificationNote, VerificationNoteCode, VerificationNoteType, VerifyOptions, verify, verify_with};
