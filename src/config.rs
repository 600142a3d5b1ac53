//! Build configuration.
//!
//! Everything that used to be a process-wide constant (cache location, paper, margins, page
//! chrome, styles) lives in one immutable [`BuildConfig`] value handed to the
//! [`DeckBuilder`](crate::builder::DeckBuilder).  The defaults reproduce the Collective Oasis theme;
//! a TOML file may override any section:
//!
//! ```toml
//! [cache]
//! dir = "public/assets"
//! extension = "jpg"
//! timeout_secs = 30
//!
//! [page]
//! margin_mm = 25.4
//!
//! [chrome.later]
//! background = "#F5E6D3"
//! accent = "#C5A065"
//! accent_height_pt = 15.0
//! page_number = true
//!
//! [styles.text.title]
//! color = "#1A2B4C"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use genpdf::{Margins, Size};
use serde::Deserialize;
use thiserror::Error;

use crate::assets::DEFAULT_EXTENSION;
use crate::elements::mm;
use crate::style::{StyleOverrides, StyleSheet, GOLD, SAND};

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{}`", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("config file parsing error")]
    Toml(#[from] toml::de::Error),
}

/// Root configuration for a deck build.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub cache: CacheConfig,
    pub page: PageConfig,
    pub chrome: ChromeConfig,
    /// Partial style changes layered over the default style sheet.
    #[serde(rename = "styles")]
    pub style_overrides: StyleOverrides,
}

impl BuildConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_owned(), err))?;
        Self::from_toml_str(&text)
    }

    /// Returns the effective style sheet.
    pub fn styles(&self) -> StyleSheet {
        StyleSheet::default().with_overrides(&self.style_overrides)
    }

    /// Replaces the cache directory and returns the updated configuration.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache.dir = dir.into();
        self
    }
}

/// `[cache]` section: where downloaded images are kept.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
    /// Extension given to every cached file, whatever the served content type.
    pub extension: String,
    /// Upper bound for a single image request.
    pub timeout_secs: u64,
}

impl CacheConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("public/assets"),
            extension: DEFAULT_EXTENSION.to_owned(),
            timeout_secs: 30,
        }
    }
}

/// `[page]` section: paper and margins.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    pub width_mm: f64,
    pub height_mm: f64,
    /// Applied on all four sides.
    pub margin_mm: f64,
}

impl PageConfig {
    pub fn size(&self) -> Size {
        Size::new(mm(self.width_mm), mm(self.height_mm))
    }

    pub fn margins(&self) -> Margins {
        let margin = mm(self.margin_mm);
        Margins::trbl(margin, margin, margin, margin)
    }
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            width_mm: 210.0,
            height_mm: 297.0,
            margin_mm: 25.4,
        }
    }
}

/// `[chrome]` section: what is painted behind and around the content of each page.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChromeConfig {
    /// Applied to the first page only.
    pub first: PageChrome,
    /// Applied to every page after the first.
    pub later: PageChrome,
}

impl ChromeConfig {
    /// Chrome for the 1-based page `number`.
    pub fn for_page(&self, number: usize) -> &PageChrome {
        if number <= 1 {
            &self.first
        } else {
            &self.later
        }
    }
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            first: PageChrome {
                page_number: false,
                ..PageChrome::default()
            },
            later: PageChrome::default(),
        }
    }
}

/// Decoration of a single page.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PageChrome {
    /// Full-page fill; `None` leaves the page white.
    pub background: Option<crate::style::Rgb>,
    /// Colour of the bar along the bottom edge; `None` disables it.
    pub accent: Option<crate::style::Rgb>,
    pub accent_height_pt: f64,
    /// Print the page number, right aligned, in the bottom margin.
    pub page_number: bool,
}

impl Default for PageChrome {
    fn default() -> Self {
        Self {
            background: Some(SAND),
            accent: Some(GOLD),
            accent_height_pt: 15.0,
            page_number: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{FontChoice, Rgb, TextAlign};

    #[test]
    fn defaults_match_the_oasis_theme() {
        let config = BuildConfig::default();
        assert_eq!(config.cache.dir, PathBuf::from("public/assets"));
        assert_eq!(config.cache.extension, "jpg");
        assert_eq!(config.page.margin_mm, 25.4);
        assert!(!config.chrome.for_page(1).page_number);
        assert!(config.chrome.for_page(2).page_number);
        assert_eq!(config.chrome.for_page(7).accent, Some(GOLD));
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let config = BuildConfig::from_toml_str(
            r##"
            [cache]
            timeout_secs = 5

            [chrome.later]
            background = "#FFFFFF"

            [styles.text.body]
            size = 11
            "##,
        )
        .unwrap();

        assert_eq!(config.cache.timeout(), Duration::from_secs(5));
        assert_eq!(config.cache.dir, PathBuf::from("public/assets"));
        assert_eq!(config.chrome.later.background, Some(Rgb(255, 255, 255)));
        assert!(config.chrome.later.page_number);

        let styles = config.styles();
        assert_eq!(styles.text_style("body").unwrap().size, 11);
        assert_eq!(styles.text_style("title").unwrap().size, 36);
    }

    #[test]
    fn title_colour_override_keeps_the_display_style() {
        let config = BuildConfig::from_toml_str(
            r##"
            [styles.text.title]
            color = "#000000"

            [styles.table]
            border = "#1A2B4C"
            "##,
        )
        .unwrap();

        let styles = config.styles();
        let title = styles.text_style("title").unwrap();
        assert_eq!(title.color, Rgb(0, 0, 0));
        assert_eq!(title.size, 36);
        assert_eq!(title.font, FontChoice::Serif);
        assert!(title.bold);
        assert!(title.italic);
        assert_eq!(title.alignment, TextAlign::Center);

        assert_eq!(styles.table.border, Rgb(0x1A, 0x2B, 0x4C));
        assert_eq!(styles.table.font_size, 10);
        assert_eq!(styles.accent, GOLD);
    }

    #[test]
    fn misspelt_style_field_is_rejected() {
        let err = BuildConfig::from_toml_str("[styles.text.body]
sise = 11
");
        assert!(matches!(err, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn invalid_colour_is_a_parse_error() {
        let err = BuildConfig::from_toml_str("[chrome.first]\nbackground = \"sand\"\n");
        assert!(matches!(err, Err(ConfigError::Toml(_))));
    }
}
