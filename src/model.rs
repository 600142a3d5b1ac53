//! Declarative description of a deck: an ordered list of content blocks plus the remote assets
//! the image blocks refer to.
//!
//! Decks are authored as TOML data.  The three decks shipped with the crate live under `decks/`
//! and are embedded at compile time; all of them are rendered by the same engine in
//! [`crate::builder`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Names of the decks bundled with the crate, in the order `all` builds them.
pub const BUILTIN_DECKS: &[&str] = &["proposal", "showcase", "catalog"];

const PROPOSAL_DECK: &str = include_str!("../decks/proposal.toml");
const SHOWCASE_DECK: &str = include_str!("../decks/showcase.toml");
const CATALOG_DECK: &str = include_str!("../decks/catalog.toml");

/// Errors raised while loading a deck definition.
#[derive(Debug, Error)]
pub enum DeckError {
    #[error("unknown built-in deck `{0}`")]
    UnknownDeck(String),

    #[error("IO error when reading `{}`", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("deck definition parsing error")]
    Toml(#[from] toml::de::Error),
}

/// One discrete unit of the deck, consumed strictly in order.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Display line, `title` style unless overridden.
    Title {
        text: String,
        #[serde(default)]
        style: Option<String>,
    },
    /// Section heading, `header` style unless overridden. Headers feed the outline.
    Header {
        text: String,
        #[serde(default)]
        style: Option<String>,
    },
    /// Body text, `body` style unless overridden.
    Paragraph {
        text: String,
        #[serde(default)]
        style: Option<String>,
    },
    /// Picture drawn from the asset cache, stretched to the given box.
    Image {
        asset: String,
        width_mm: f64,
        height_mm: f64,
    },
    /// Grid whose first row is the header.
    Table {
        rows: Vec<Vec<String>>,
        column_widths_mm: Vec<f64>,
    },
    /// Fixed vertical gap.
    Spacer { height_mm: f64 },
    /// Forces the following blocks onto a new page.
    PageBreak,
}

impl ContentBlock {
    pub fn title(text: impl Into<String>) -> Self {
        Self::Title {
            text: text.into(),
            style: None,
        }
    }

    pub fn header(text: impl Into<String>) -> Self {
        Self::Header {
            text: text.into(),
            style: None,
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::Paragraph {
            text: text.into(),
            style: None,
        }
    }

    /// Paragraph rendered with the named style instead of `body`.
    pub fn styled_paragraph(text: impl Into<String>, style: impl Into<String>) -> Self {
        Self::Paragraph {
            text: text.into(),
            style: Some(style.into()),
        }
    }

    pub fn image(asset: impl Into<String>, width_mm: f64, height_mm: f64) -> Self {
        Self::Image {
            asset: asset.into(),
            width_mm,
            height_mm,
        }
    }

    pub fn table<R, C>(rows: R, column_widths_mm: Vec<f64>) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self::Table {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
            column_widths_mm,
        }
    }

    pub fn spacer(height_mm: f64) -> Self {
        Self::Spacer { height_mm }
    }

    pub fn page_break() -> Self {
        Self::PageBreak
    }
}

/// A complete deck: metadata, asset sources and the block sequence.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct DeckDefinition {
    /// Document title stored in the PDF metadata.
    pub title: String,
    /// Relative path the deck is written to when no output is given.
    pub output: PathBuf,
    /// Add a bookmark for every header block.
    #[serde(default = "default_outline")]
    pub outline: bool,
    /// Asset key to source URL.
    #[serde(default)]
    pub assets: BTreeMap<String, String>,
    pub blocks: Vec<ContentBlock>,
}

fn default_outline() -> bool {
    true
}

impl DeckDefinition {
    /// Creates an empty deck.
    pub fn new(title: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            title: title.into(),
            output: output.into(),
            outline: true,
            assets: BTreeMap::new(),
            blocks: Vec::new(),
        }
    }

    /// Registers the source URL of an asset and returns the updated deck.
    pub fn with_asset(mut self, key: impl Into<String>, url: impl Into<String>) -> Self {
        self.assets.insert(key.into(), url.into());
        self
    }

    /// Appends a block and returns the updated deck.
    pub fn with_block(mut self, block: ContentBlock) -> Self {
        self.blocks.push(block);
        self
    }

    /// Extends the deck with multiple blocks and returns the updated instance.
    pub fn with_blocks<I>(mut self, blocks: I) -> Self
    where
        I: IntoIterator<Item = ContentBlock>,
    {
        self.blocks.extend(blocks);
        self
    }

    /// Enables or disables the header outline and returns the updated deck.
    pub fn with_outline(mut self, outline: bool) -> Self {
        self.outline = outline;
        self
    }

    /// Parses a deck from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, DeckError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses the deck file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DeckError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| DeckError::Io(path.to_owned(), err))?;
        Self::from_toml_str(&text)
    }

    /// Returns one of the bundled decks by name.
    pub fn builtin(name: &str) -> Result<Self, DeckError> {
        let text = match name {
            "proposal" => PROPOSAL_DECK,
            "showcase" => SHOWCASE_DECK,
            "catalog" => CATALOG_DECK,
            other => return Err(DeckError::UnknownDeck(other.to_owned())),
        };
        Self::from_toml_str(text)
    }

    /// Loads `name_or_path` as a bundled deck name, falling back to a file path.
    pub fn locate(name_or_path: &str) -> Result<Self, DeckError> {
        if BUILTIN_DECKS.contains(&name_or_path) {
            Self::builtin(name_or_path)
        } else {
            Self::load(name_or_path)
        }
    }

    /// Number of explicit page-break blocks.
    pub fn page_break_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|block| matches!(block, ContentBlock::PageBreak))
            .count()
    }

    /// Asset keys referenced by image blocks, in block order.
    pub fn asset_keys(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().filter_map(|block| match block {
            ContentBlock::Image { asset, .. } => Some(asset.as_str()),
            _ => None,
        })
    }
}
