//! Interop `DCSubtitle` documents.
//!
//! Only the identity and font references are read here. Layout and rendering
//! of the subtitle text itself is not handled.

use crate::{Error, Result, utils};
use serde::Deserialize;
use std::{fs, path::Path};

/// The parts of an Interop subtitle document needed to place it in a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteropSubtitle {
    pub id: String,
    pub movie_title: Option<String>,
    pub language: Option<String>,
    pub fonts: Vec<FontReference>,
}

/// A `<LoadFont>` element: a font id and the file it is loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FontReference {
    #[serde(rename = "@Id")]
    pub id: String,
    #[serde(rename = "@URI")]
    pub uri: String,
}

#[derive(Deserialize)]
struct DcSubtitle {
    #[serde(rename = "SubtitleID")]
    subtitle_id: String,
    #[serde(rename = "MovieTitle")]
    movie_title: Option<String>,
    #[serde(rename = "Language")]
    language: Option<String>,
    #[serde(rename = "LoadFont", default)]
    load_font: Vec<FontReference>,
}

impl InteropSubtitle {
    pub fn parse(xml: &str) -> Result<Self> {
        let document = quick_xml::de::from_str::<DcSubtitle>(xml)?;

        Ok(Self {
            id: utils::remove_urn_uuid(&document.subtitle_id),
            movie_title: document.movie_title,
            language: document.language,
            fonts: document.load_font,
        })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let xml = fs::read_to_string(path)
            .map_err(|e| Error::file("could not read subtitle file", path, &e))?;
        Self::parse(&xml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_dcsubtitle() {
        let subtitle = InteropSubtitle::parse(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<DCSubtitle Version="1.0">
  <SubtitleID>CAB5C268-222B-41D2-88AE-6D6999441B17</SubtitleID>
  <MovieTitle>Movie Title</MovieTitle>
  <ReelNumber>1</ReelNumber>
  <Language>French</Language>
  <LoadFont Id="theFontId" URI="arial.ttf"/>
  <Font Id="theFontId" Size="39">
    <Subtitle SpotNumber="1" TimeIn="00:00:05:198" TimeOut="00:00:07:115" FadeUpTime="1" FadeDownTime="1">
      <Text VAlign="bottom" VPosition="10.0">My jacket was Idi Amin's</Text>
    </Subtitle>
  </Font>
</DCSubtitle>
"#,
        )
        .unwrap();

        assert_eq!(subtitle.id, "cab5c268-222b-41d2-88ae-6d6999441b17");
        assert_eq!(subtitle.movie_title.as_deref(), Some("Movie Title"));
        assert_eq!(subtitle.language.as_deref(), Some("French"));
        assert_eq!(
            subtitle.fonts,
            vec![FontReference {
                id: "theFontId".to_owned(),
                uri: "arial.ttf".to_owned(),
            }]
        );
    }
}
