use crate::{Error, Result};
use serde::Serialize;
use std::{fmt, str::FromStr};

/// The two packaging standards a DCP may follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Standard {
    Interop,
    Smpte,
}

impl fmt::Display for Standard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interop => write!(f, "Interop"),
            Self::Smpte => write!(f, "SMPTE"),
        }
    }
}

/// A rational number, written in XML as `"numerator denominator"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Fraction {
    pub numerator: i64,
    pub denominator: i64,
}

impl Fraction {
    pub const fn new(numerator: i64, denominator: i64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

impl Default for Fraction {
    fn default() -> Self {
        Self::new(24, 1)
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.numerator, self.denominator)
    }
}

impl FromStr for Fraction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || Error::BadValue {
            element: "Fraction".to_owned(),
            value: s.to_owned(),
        };

        let mut parts = s.split_whitespace();
        let (Some(numerator), Some(denominator), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(bad());
        };

        let numerator = numerator.parse::<i64>().map_err(|_| bad())?;
        let denominator = denominator.parse::<i64>().map_err(|_| bad())?;

        if denominator == 0 {
            return Err(bad());
        }

        Ok(Self::new(numerator, denominator))
    }
}

/// What a composition is, as used by servers to categorise content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ContentKind {
    Feature,
    Short,
    Trailer,
    Test,
    Transitional,
    Rating,
    Teaser,
    Policy,
    PublicServiceAnnouncement,
    Advertisement,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Short => "short",
            Self::Trailer => "trailer",
            Self::Test => "test",
            Self::Transitional => "transitional",
            Self::Rating => "rating",
            Self::Teaser => "teaser",
            Self::Policy => "policy",
            Self::PublicServiceAnnouncement => "psa",
            Self::Advertisement => "advertisement",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_lowercase().as_str() {
            "feature" => Self::Feature,
            "short" => Self::Short,
            "trailer" => Self::Trailer,
            "test" => Self::Test,
            "transitional" => Self::Transitional,
            "rating" => Self::Rating,
            "teaser" => Self::Teaser,
            "policy" => Self::Policy,
            "psa" => Self::PublicServiceAnnouncement,
            "advertisement" => Self::Advertisement,
            _ => return Err(Error::BadContentKind(s.to_owned())),
        })
    }
}

/// Severity of a note raised while comparing packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteType {
    Progress,
    Error,
    Note,
}

/// How to treat elements we do not know about when reading XML.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParsePolicy {
    /// Unknown elements are an error.
    Strict,
    /// Unknown elements are logged and skipped.
    #[default]
    Lenient,
}

/// Tolerances used when comparing two compositions.
#[derive(Debug, Clone, PartialEq)]
pub struct EqualityOptions {
    /// Maximum mean pixel error allowed between two picture frames.
    pub max_mean_pixel_error: f64,
    /// Maximum standard deviation of pixel error allowed between two frames.
    pub max_std_dev_pixel_error: f64,
    /// Maximum difference allowed between two audio samples.
    pub max_audio_sample_error: i32,
    pub cpl_annotation_texts_can_differ: bool,
    pub reel_annotation_texts_can_differ: bool,
    pub reel_hashes_can_differ: bool,
    /// Carry on comparing after the first difference.
    pub keep_going: bool,
}

impl Default for EqualityOptions {
    fn default() -> Self {
        Self {
            max_mean_pixel_error: 5.0,
            max_std_dev_pixel_error: 5.0,
            max_audio_sample_error: 0,
            cpl_annotation_texts_can_differ: false,
            reel_annotation_texts_can_differ: false,
            reel_hashes_can_differ: true,
            keep_going: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_parse() {
        assert_eq!("24 1".parse::<Fraction>().unwrap(), Fraction::new(24, 1));
        assert_eq!(" 1998  1080 ".parse::<Fraction>().unwrap(), Fraction::new(1998, 1080));
        assert!("24".parse::<Fraction>().is_err());
        assert!("24 0".parse::<Fraction>().is_err());
        assert!("24 1 1".parse::<Fraction>().is_err());
    }

    #[test]
    fn content_kind_rejects_unknown() {
        assert_eq!("Feature".parse::<ContentKind>().unwrap(), ContentKind::Feature);
        let err = "xfeature".parse::<ContentKind>().unwrap_err();
        assert_eq!(err.to_string(), "Bad content kind 'xfeature'");
    }
}
