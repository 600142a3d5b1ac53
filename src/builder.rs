//! Deck assembly.
//!
//! A build runs in two phases:
//!
//! 1. [`DeckBuilder::resolve`] walks the blocks in order and resolves every image through the
//!    asset cache. Images whose asset cannot be obtained are dropped and reported, never
//!    replaced with a placeholder.
//! 2. [`DeckBuilder::render`] lays the surviving blocks out with `genpdf`, then reopens the
//!    result with `lopdf` to paint the page backgrounds and attach the header outline.
//!
//! [`DeckBuilder::build`] writes the rendered bytes through a temporary file in the destination
//! directory, so the output path holds either the previous file or a complete new one.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use genpdf::elements::{PageBreak, PaddedElement, Paragraph, StyledElement};
use genpdf::error::Error as LayoutError;
use genpdf::fonts::{Font, FontFamily};
use genpdf::style::{Color, Style};
use genpdf::{Document, Element, Margins};
use log::{debug, info, warn};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::assets::{AssetCache, AssetError, AssetOrigin, Fetcher, HttpFetcher};
use crate::chrome::{paint_backgrounds, PageChromeDecorator};
use crate::config::BuildConfig;
use crate::elements::{mm, sized_image, PageCounter, PageLog, PageMarker, StripedTable, VerticalSpace};
use crate::fonts;
use crate::model::{ContentBlock, DeckDefinition};
use crate::outline::{attach_outline, Heading, OutlineError};
use crate::richtext::{parse_markup, ParseError};
use crate::style::{FontChoice, StyleSheet, TextStyle};

/// Errors that abort a build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("layout failed")]
    Layout(#[from] LayoutError),

    #[error("invalid markup in `{text}`")]
    Markup {
        text: String,
        #[source]
        source: ParseError,
    },

    #[error("unknown text style `{0}`")]
    UnknownStyle(String),

    #[error("failed to post-process the rendered PDF")]
    Pdf(#[from] lopdf::Error),

    #[error("failed to attach the outline")]
    Outline(#[from] OutlineError),

    #[error("IO error when writing `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("asset setup failed")]
    Asset(#[from] AssetError),
}

/// An image block that was left out of the document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedAsset {
    pub key: String,
    pub reason: String,
}

/// A block ready for layout: images point at local files.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedBlock {
    Image {
        path: PathBuf,
        width_mm: f64,
        height_mm: f64,
    },
    Other(ContentBlock),
}

/// Output of the resolution phase.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedDeck {
    pub blocks: Vec<ResolvedBlock>,
    pub skipped: Vec<SkippedAsset>,
    pub downloaded: usize,
    pub cached: usize,
}

/// Summary of a finished build.
#[derive(Clone, Debug, PartialEq)]
pub struct BuildReport {
    pub output: PathBuf,
    pub pages: usize,
    pub downloaded: usize,
    pub cached: usize,
    pub skipped: Vec<SkippedAsset>,
}

/// A rendered document that has not been written anywhere yet.
#[derive(Clone, Debug)]
pub struct RenderedDeck {
    pub bytes: Vec<u8>,
    pub report: BuildReport,
}

/// Renders decks with one fixed configuration.
pub struct DeckBuilder<F> {
    config: BuildConfig,
    styles: StyleSheet,
    cache: AssetCache<F>,
}

impl DeckBuilder<HttpFetcher> {
    /// Creates a builder that downloads missing assets over HTTP.
    pub fn new(config: BuildConfig) -> Result<Self, BuildError> {
        let fetcher = HttpFetcher::new(config.cache.timeout())?;
        Ok(Self::with_fetcher(config, fetcher))
    }
}

impl<F: Fetcher> DeckBuilder<F> {
    /// Creates a builder that fetches cache misses through `fetcher`.
    pub fn with_fetcher(config: BuildConfig, fetcher: F) -> Self {
        let cache = AssetCache::new(config.cache.dir.clone(), fetcher)
            .with_extension(config.cache.extension.clone());
        Self {
            styles: config.styles(),
            config,
            cache,
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Resolves every image block of `deck`, in block order.
    ///
    /// A key referenced by several blocks is resolved once.
    pub fn resolve(&self, deck: &DeckDefinition) -> ResolvedDeck {
        let mut resolved = ResolvedDeck::default();
        let mut seen: BTreeMap<&str, Result<PathBuf, String>> = BTreeMap::new();

        for block in &deck.blocks {
            let ContentBlock::Image {
                asset,
                width_mm,
                height_mm,
            } = block
            else {
                resolved.blocks.push(ResolvedBlock::Other(block.clone()));
                continue;
            };

            let outcome = seen
                .entry(asset.as_str())
                .or_insert_with(|| match self.resolve_asset(deck, asset) {
                    Ok((path, origin)) => {
                        match origin {
                            AssetOrigin::Cached => resolved.cached += 1,
                            AssetOrigin::Downloaded { .. } => resolved.downloaded += 1,
                        }
                        Ok(path)
                    }
                    Err(err) => {
                        let reason = describe(&err);
                        warn!("Skipping image '{}': {}", asset, reason);
                        Err(reason)
                    }
                });

            match outcome {
                Ok(path) => resolved.blocks.push(ResolvedBlock::Image {
                    path: path.clone(),
                    width_mm: *width_mm,
                    height_mm: *height_mm,
                }),
                Err(reason) => resolved.skipped.push(SkippedAsset {
                    key: asset.clone(),
                    reason: reason.clone(),
                }),
            }
        }

        resolved
    }

    fn resolve_asset(
        &self,
        deck: &DeckDefinition,
        key: &str,
    ) -> Result<(PathBuf, AssetOrigin), AssetError> {
        let url = deck
            .assets
            .get(key)
            .ok_or_else(|| AssetError::UnknownAsset(key.to_owned()))?;
        let record = self.cache.resolve(key, url)?;
        Ok((record.local_path, record.origin))
    }

    /// Checks style names and markup before any work is done.
    fn check_blocks(&self, deck: &DeckDefinition) -> Result<(), BuildError> {
        for block in &deck.blocks {
            if let Some((text, style)) = text_block(block) {
                self.text_style(style)?;
                parse_markup(text).map_err(|source| BuildError::Markup {
                    text: text.to_owned(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    fn text_style(&self, name: &str) -> Result<&TextStyle, BuildError> {
        self.styles
            .text_style(name)
            .ok_or_else(|| BuildError::UnknownStyle(name.to_owned()))
    }

    /// Renders `deck` into PDF bytes without touching its output path.
    pub fn render(&self, deck: &DeckDefinition) -> Result<RenderedDeck, BuildError> {
        self.check_blocks(deck)?;
        let resolved = self.resolve(deck);

        let deck_fonts = fonts::load_deck_fonts()?;
        let mut document = Document::new(deck_fonts.sans);
        let serif = deck_fonts
            .serif
            .map(|family| document.add_font_family(family));

        document.set_title(deck.title.clone());
        document.set_paper_size(self.config.page.size());

        let counter = PageCounter::new();
        let label_color: Color = self.text_style(StyleSheet::BODY)?.color.into();
        document.set_page_decorator(PageChromeDecorator::new(
            counter.clone(),
            self.config.page.clone(),
            self.config.chrome.clone(),
            label_color,
        ));

        let accent: Color = self.styles.accent.into();
        let log = PageLog::new();
        let mut headings = Vec::new();

        for block in resolved.blocks {
            match block {
                ResolvedBlock::Image {
                    path,
                    width_mm,
                    height_mm,
                } => document.push(sized_image(&path, width_mm, height_mm)?),
                ResolvedBlock::Other(ContentBlock::Table {
                    rows,
                    column_widths_mm,
                }) => document.push(StripedTable::new(
                    rows,
                    column_widths_mm,
                    self.styles.table.clone(),
                )),
                ResolvedBlock::Other(ContentBlock::Spacer { height_mm }) => {
                    document.push(VerticalSpace::new(height_mm))
                }
                ResolvedBlock::Other(ContentBlock::PageBreak) => document.push(PageBreak::new()),
                ResolvedBlock::Other(ContentBlock::Header { text, style }) if deck.outline => {
                    let name = style.as_deref().unwrap_or(StyleSheet::HEADER);
                    let element = self.text_element(&text, name, accent, serif)?;
                    document.push(PageMarker::new(element, &counter, &log));
                    headings.push(text);
                }
                ResolvedBlock::Other(block) => {
                    if let Some((text, name)) = text_block(&block) {
                        document.push(self.text_element(text, name, accent, serif)?);
                    }
                }
            }
        }

        let mut laid_out = Vec::new();
        document.render(&mut laid_out)?;

        let mut pdf = lopdf::Document::load_mem(&laid_out)?;
        let painted = paint_backgrounds(&mut pdf, &self.config.chrome)?;
        debug!("Painted backgrounds on {} pages", painted);

        if deck.outline {
            let headings: Vec<Heading> = headings
                .into_iter()
                .zip(log.pages())
                .map(|(title, page)| Heading { title, page })
                .collect();
            let linked = attach_outline(&mut pdf, &headings)?;
            debug!("Linked {} outline entries", linked);
        }

        let pages = pdf.get_pages().len();
        let mut bytes = Vec::new();
        pdf.save_to(&mut bytes).map_err(lopdf::Error::from)?;

        Ok(RenderedDeck {
            bytes,
            report: BuildReport {
                output: deck.output.clone(),
                pages,
                downloaded: resolved.downloaded,
                cached: resolved.cached,
                skipped: resolved.skipped,
            },
        })
    }

    /// Renders `deck` and writes it to `output`, replacing any existing file.
    pub fn build(
        &self,
        deck: &DeckDefinition,
        output: impl AsRef<Path>,
    ) -> Result<BuildReport, BuildError> {
        let output = output.as_ref();
        let rendered = self.render(deck)?;

        let directory = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let io_error = |source| BuildError::Io {
            path: output.to_owned(),
            source,
        };

        fs::create_dir_all(directory).map_err(io_error)?;
        let mut staging = NamedTempFile::new_in(directory).map_err(io_error)?;
        staging.write_all(&rendered.bytes).map_err(io_error)?;
        staging.as_file_mut().sync_all().map_err(io_error)?;
        staging.persist(output).map_err(|err| io_error(err.error))?;

        info!(
            "Wrote {} ({} pages, {} bytes)",
            output.display(),
            rendered.report.pages,
            rendered.bytes.len()
        );

        Ok(BuildReport {
            output: output.to_owned(),
            ..rendered.report
        })
    }

    fn text_element(
        &self,
        text: &str,
        style_name: &str,
        accent: Color,
        serif: Option<FontFamily<Font>>,
    ) -> Result<StyledElement<PaddedElement<Paragraph>>, BuildError> {
        let text_style = self.text_style(style_name)?;
        let spans = parse_markup(text).map_err(|source| BuildError::Markup {
            text: text.to_owned(),
            source,
        })?;

        let mut paragraph = Paragraph::default();
        for span in &spans {
            paragraph.push(span.to_styled_string(accent));
        }
        paragraph.set_alignment(text_style.alignment.into());

        let margins = Margins::trbl(
            mm(text_style.space_before_mm),
            mm(0.0),
            mm(text_style.space_after_mm),
            mm(0.0),
        );
        Ok(paragraph
            .padded(margins)
            .styled(block_style(text_style, serif)))
    }
}

fn block_style(text_style: &TextStyle, serif: Option<FontFamily<Font>>) -> Style {
    let mut style = Style::new()
        .with_font_size(text_style.size)
        .with_line_spacing(text_style.line_spacing())
        .with_color(text_style.color.into());
    if text_style.bold {
        style.set_bold();
    }
    if text_style.italic {
        style.set_italic();
    }
    if let (FontChoice::Serif, Some(family)) = (text_style.font, serif) {
        style.set_font_family(family);
    }
    style
}

/// Text and style name of a text block, with the per-kind default style applied.
fn text_block(block: &ContentBlock) -> Option<(&str, &str)> {
    let (text, style, default) = match block {
        ContentBlock::Title { text, style } => (text, style, StyleSheet::TITLE),
        ContentBlock::Header { text, style } => (text, style, StyleSheet::HEADER),
        ContentBlock::Paragraph { text, style } => (text, style, StyleSheet::BODY),
        _ => return None,
    };
    Some((text.as_str(), style.as_deref().unwrap_or(default)))
}

/// Error message followed by its sources, joined with `: `.
fn describe(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{BLUE, GOLD};
    use std::cell::RefCell;

    /// Serves a tiny body for every URL except those listed in `failing`.
    struct FakeFetcher {
        failing: Vec<&'static str>,
        requests: RefCell<Vec<String>>,
    }

    impl FakeFetcher {
        fn new(failing: &[&'static str]) -> Self {
            Self {
                failing: failing.to_vec(),
                requests: RefCell::new(Vec::new()),
            }
        }
    }

    impl Fetcher for FakeFetcher {
        fn fetch_into(&self, url: &str, sink: &mut dyn Write) -> Result<u64, AssetError> {
            self.requests.borrow_mut().push(url.to_owned());
            if self.failing.contains(&url) {
                return Err(AssetError::Status {
                    url: url.to_owned(),
                    status: 404,
                });
            }
            sink.write_all(b"jpeg")
                .map_err(|source| AssetError::Io {
                    path: PathBuf::from(url),
                    source,
                })?;
            Ok(4)
        }
    }

    fn deck() -> DeckDefinition {
        DeckDefinition::new("Test deck", "out.pdf")
            .with_asset("hero", "https://img.test/hero")
            .with_asset("broken", "https://img.test/broken")
            .with_blocks([
                ContentBlock::title("Collective Oasis"),
                ContentBlock::image("hero", 150.0, 100.0),
                ContentBlock::page_break(),
                ContentBlock::image("broken", 150.0, 100.0),
                ContentBlock::paragraph("After the broken image"),
                ContentBlock::image("hero", 50.0, 30.0),
            ])
    }

    fn builder<'a>(cache: &Path, fetcher: &'a FakeFetcher) -> DeckBuilder<&'a FakeFetcher> {
        DeckBuilder::with_fetcher(BuildConfig::default().with_cache_dir(cache), fetcher)
    }

    fn image_width(block: &ResolvedBlock) -> Option<f64> {
        match *block {
            ResolvedBlock::Image { width_mm, .. } => Some(width_mm),
            ResolvedBlock::Other(_) => None,
        }
    }

    #[test]
    fn failed_image_is_omitted_and_order_kept() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::new(&["https://img.test/broken"]);
        let builder = builder(dir.path(), &fetcher);

        let resolved = builder.resolve(&deck());

        assert_eq!(resolved.blocks.len(), 5);
        assert!(matches!(
            &resolved.blocks[0],
            ResolvedBlock::Other(ContentBlock::Title { .. })
        ));
        assert_eq!(image_width(&resolved.blocks[1]), Some(150.0));
        assert!(matches!(
            &resolved.blocks[2],
            ResolvedBlock::Other(ContentBlock::PageBreak)
        ));
        assert!(matches!(
            &resolved.blocks[3],
            ResolvedBlock::Other(ContentBlock::Paragraph { .. })
        ));
        assert_eq!(image_width(&resolved.blocks[4]), Some(50.0));

        assert_eq!(resolved.skipped.len(), 1);
        assert_eq!(resolved.skipped[0].key, "broken");
        assert!(resolved.skipped[0].reason.contains("404"));
    }

    #[test]
    fn shared_key_is_fetched_once() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::new(&[]);
        let builder = builder(dir.path(), &fetcher);

        let resolved = builder.resolve(&deck());

        assert_eq!(resolved.downloaded, 2);
        assert_eq!(resolved.cached, 0);
        assert_eq!(
            *fetcher.requests.borrow(),
            ["https://img.test/hero", "https://img.test/broken"]
        );

        let again = builder.resolve(&deck());
        assert_eq!(again.downloaded, 0);
        assert_eq!(again.cached, 2);
        assert_eq!(fetcher.requests.borrow().len(), 2);
    }

    #[test]
    fn undefined_asset_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::new(&[]);
        let builder = builder(dir.path(), &fetcher);
        let deck = DeckDefinition::new("Test", "out.pdf")
            .with_block(ContentBlock::image("ghost", 10.0, 10.0));

        let resolved = builder.resolve(&deck);

        assert!(resolved.blocks.is_empty());
        assert_eq!(resolved.skipped[0].key, "ghost");
        assert!(resolved.skipped[0].reason.contains("no source URL"));
    }

    #[test]
    fn unknown_style_fails_before_any_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::new(&[]);
        let builder = builder(dir.path(), &fetcher);
        let deck = deck().with_block(ContentBlock::styled_paragraph("Fine print", "footnote"));

        let err = builder.render(&deck).unwrap_err();

        assert!(matches!(err, BuildError::UnknownStyle(name) if name == "footnote"));
        assert!(!builder.cache.cache_path("hero").unwrap().exists());
    }

    #[test]
    fn malformed_markup_fails_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::new(&[]);
        let builder = builder(dir.path(), &fetcher);
        let deck = DeckDefinition::new("Test", "out.pdf")
            .with_block(ContentBlock::paragraph("**unterminated"));

        let err = builder.render(&deck).unwrap_err();
        assert!(matches!(err, BuildError::Markup { .. }));
    }

    #[test]
    fn accent_text_colour_comes_from_the_style_sheet() {
        let fetcher = FakeFetcher::new(&[]);
        let mut config = BuildConfig::default();
        config.chrome.first.accent = None;
        config.chrome.later.accent = None;
        let builder = DeckBuilder::with_fetcher(config.clone(), &fetcher);
        assert_eq!(builder.styles.accent, GOLD);

        config.style_overrides.accent = Some(BLUE);
        let builder = DeckBuilder::with_fetcher(config, &fetcher);
        assert_eq!(builder.styles.accent, BLUE);
    }

    #[test]
    fn describe_joins_the_source_chain() {
        let err = AssetError::Io {
            path: PathBuf::from("public/assets"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        };
        assert_eq!(describe(&err), "I/O error at `public/assets`: disk full");
    }
}
