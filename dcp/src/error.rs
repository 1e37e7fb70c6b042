//! Error types for reading, writing, signing and verifying packages.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while working with a Digital Cinema Package.
#[derive(Debug, Error)]
pub enum Error {
    /// A file could not be opened, read or written.
    #[error("{message}: {}", .path.display())]
    File {
        message: String,
        path: PathBuf,
        /// Native OS error code, if one was reported.
        code: Option<i32>,
    },

    /// A document is well-formed XML but does not have the expected shape.
    #[error("XML error: {0}")]
    Xml(String),

    /// The XML itself could not be tokenized.
    #[error("XML syntax error: {0}")]
    XmlSyntax(#[from] quick_xml::Error),

    /// A subtitle document could not be deserialized.
    #[error("could not read subtitle document: {0}")]
    Subtitle(#[from] quick_xml::de::DeError),

    /// `<ContentKind>` holds a value outside the closed set.
    #[error("Bad content kind '{0}'")]
    BadContentKind(String),

    /// A required element is missing from a document.
    #[error("missing required element <{0}>")]
    MissingElement(String),

    /// An element holds text which cannot be parsed as the expected type.
    #[error("could not parse <{element}> value '{value}'")]
    BadValue { element: String, value: String },

    /// An element the strict parse policy does not know about.
    #[error("unexpected element <{element}> in <{parent}>")]
    UnexpectedElement { parent: String, element: String },

    /// The AssetMap could not be found in a package directory.
    #[error("could not find AssetMap file in `{}`", .0.display())]
    MissingAssetMap(PathBuf),

    /// The root namespace of a document is not one we recognise.
    #[error("unrecognised {document} namespace {namespace}")]
    UnknownNamespace { document: String, namespace: String },

    /// An asset with more than one chunk in the AssetMap.
    #[error("unsupported asset chunk count {count} for asset {id}")]
    UnsupportedChunkCount { id: String, count: usize },

    /// Essence which is recognised but cannot be handled (e.g. MPEG-2).
    #[error("unsupported essence in {}: {reason}", .path.display())]
    UnsupportedEssence { path: PathBuf, reason: String },

    /// An asset named in the AssetMap is not on disk.
    #[error("missing asset {}", .0.display())]
    MissingAsset(PathBuf),

    /// An AssetMap entry with an empty `<Path>`.
    #[error("empty path for asset {0} in AssetMap")]
    EmptyAssetPath(String),

    /// A reel refers to an asset id which is not in the package.
    #[error("CPL {cpl_id} refers to asset {asset_id} which is not in the package")]
    UnresolvedReference { cpl_id: String, asset_id: String },

    /// Interop and SMPTE documents mixed in one package.
    #[error("mismatched standards: AssetMap is {expected} but {} is {found}", .path.display())]
    MismatchedStandard {
        expected: crate::Standard,
        found: crate::Standard,
        path: PathBuf,
    },

    /// Failure reported by the cryptographic library.
    #[error("cryptographic error: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),

    /// PEM or DER certificate data which cannot be parsed.
    #[error("could not parse certificate{}: {reason}", .path.as_ref().map(|x| format!(" in {}", x.display())).unwrap_or_default())]
    CertificateParse {
        path: Option<PathBuf>,
        reason: String,
    },

    /// A certificate chain which is empty, misordered or otherwise unusable.
    #[error("invalid certificate chain: {0}")]
    InvalidChain(String),

    /// An XML signature which does not verify.
    #[error("signature verification failed: {0}")]
    BadSignature(String),

    /// RSA decryption of a KDM key block failed.
    #[error("could not decrypt KDM ({0})")]
    KdmDecode(String),

    /// A decrypted KDM key block with a bad length or structure id.
    #[error("invalid KDM key block: {0}")]
    InvalidKdmKey(String),

    /// A KDM validity window whose start is after its end.
    #[error("invalid validity window: {not_valid_before} is after {not_valid_after}")]
    InvalidValidity {
        not_valid_before: String,
        not_valid_after: String,
    },

    /// A CPL where some essence is encrypted and some is not.
    #[error("CPL {0} mixes encrypted and unencrypted essence")]
    MixedEncryption(String),

    /// An encrypted asset whose content key is not known.
    #[error("no content key known for key id {0}")]
    MissingKey(String),

    /// The operation was cancelled through a `CancellationToken`.
    #[error("operation cancelled")]
    Cancelled,

    /// The digest worker pool could not be created.
    #[error("could not create worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid hex string: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("invalid UUID: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("invalid timestamp: {0}")]
    Time(#[from] chrono::ParseError),
}

/// Result type for package operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Construct a [`Error::File`] from an I/O failure on `path`.
    pub fn file<T: Into<String>>(message: T, path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::File {
            message: message.into(),
            path: path.into(),
            code: err.raw_os_error(),
        }
    }

    /// Returns true for conditions which `keep_going` may collect instead of raising.
    pub fn is_survivable(&self) -> bool {
        matches!(
            self,
            Self::MissingAsset(_)
                | Self::EmptyAssetPath(_)
                | Self::MismatchedStandard { .. }
                | Self::UnresolvedReference { .. }
        )
    }
}
