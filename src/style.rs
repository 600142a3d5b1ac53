//! Named text and table styles shared by every block of a deck.
//!
//! The style sheet is plain data so it can be overridden from the build configuration.  Conversion
//! into `genpdf` styles happens at layout time in [`crate::builder`].

use std::collections::BTreeMap;
use std::fmt;

use genpdf::style::Color;
use genpdf::Alignment;
use serde::Deserialize;

/// Deep blue used for all text.
pub const BLUE: Rgb = Rgb(0x1A, 0x2B, 0x4C);
/// Warm sand used for page backgrounds.
pub const SAND: Rgb = Rgb(0xF5, 0xE6, 0xD3);
/// Gold used for the bottom bar, the table grid and accented text.
pub const GOLD: Rgb = Rgb(0xC5, 0xA0, 0x65);
/// Light sand used for every other table row.
pub const LIGHT_SAND: Rgb = Rgb(0xFA, 0xF3, 0xEB);
/// Plain white.
pub const WHITE: Rgb = Rgb(0xFF, 0xFF, 0xFF);

/// An sRGB colour written as `#RRGGBB` in configuration files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Parses `#RRGGBB` (the leading `#` is optional).
    pub fn parse(value: &str) -> Result<Self, InvalidColor> {
        let hex = value.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(InvalidColor(value.to_owned()));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| InvalidColor(value.to_owned()))
        };
        Ok(Self(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    /// Returns the channels scaled to `0.0..=1.0`, as PDF colour operators expect.
    pub fn unit_channels(self) -> [f32; 3] {
        [self.0, self.1, self.2].map(|c| f32::from(c) / 255.0)
    }
}

impl From<Rgb> for Color {
    fn from(rgb: Rgb) -> Self {
        Color::Rgb(rgb.0, rgb.1, rgb.2)
    }
}

impl TryFrom<String> for Rgb {
    type Error = InvalidColor;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

/// Error for colour strings that are not `#RRGGBB`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid colour `{0}`, expected #RRGGBB")]
pub struct InvalidColor(String);

/// Font family a text style draws from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontChoice {
    /// Helvetica-metric sans serif, the document default.
    #[default]
    Sans,
    /// Times-metric serif used for display text.
    Serif,
}

/// Horizontal alignment of a text block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

impl From<TextAlign> for Alignment {
    fn from(align: TextAlign) -> Self {
        match align {
            TextAlign::Left => Alignment::Left,
            TextAlign::Center => Alignment::Center,
            TextAlign::Right => Alignment::Right,
        }
    }
}

/// Appearance of one kind of text block.
#[derive(Clone, Debug, PartialEq)]
pub struct TextStyle {
    pub font: FontChoice,
    /// Font size in points.
    pub size: u8,
    /// Distance between baselines in points.
    pub leading: f64,
    pub color: Rgb,
    pub alignment: TextAlign,
    pub bold: bool,
    pub italic: bool,
    pub space_before_mm: f64,
    pub space_after_mm: f64,
}

impl TextStyle {
    /// Line spacing factor relative to the font size, as `genpdf` expresses leading.
    pub fn line_spacing(&self) -> f64 {
        if self.size == 0 {
            1.0
        } else {
            (self.leading / f64::from(self.size)).max(1.0)
        }
    }

    fn body() -> Self {
        Self {
            font: FontChoice::Sans,
            size: 12,
            leading: 18.0,
            color: BLUE,
            alignment: TextAlign::Left,
            bold: false,
            italic: false,
            space_before_mm: 0.0,
            space_after_mm: pt_to_mm(12.0),
        }
    }
}

impl Default for TextStyle {
    fn default() -> Self {
        Self::body()
    }
}

/// Appearance of tabular blocks.
#[derive(Clone, Debug, PartialEq)]
pub struct TableStyle {
    pub header_background: Rgb,
    pub header_foreground: Rgb,
    pub body_foreground: Rgb,
    /// Data rows cycle through these two fills, starting with the first.
    pub row_backgrounds: [Rgb; 2],
    pub border: Rgb,
    pub font_size: u8,
    pub padding_mm: f64,
    pub header_bottom_padding_mm: f64,
}

impl TableStyle {
    /// Fill colour of data row `index` (zero-based, header excluded).
    pub fn row_background(&self, index: usize) -> Rgb {
        self.row_backgrounds[index % self.row_backgrounds.len()]
    }
}

impl Default for TableStyle {
    fn default() -> Self {
        Self {
            header_background: BLUE,
            header_foreground: SAND,
            body_foreground: BLUE,
            row_backgrounds: [WHITE, LIGHT_SAND],
            border: GOLD,
            font_size: 10,
            padding_mm: 1.1,
            header_bottom_padding_mm: pt_to_mm(12.0),
        }
    }
}

/// Named text styles, the table style and the inline accent colour.
#[derive(Clone, Debug, PartialEq)]
pub struct StyleSheet {
    pub text: BTreeMap<String, TextStyle>,
    pub table: TableStyle,
    /// Colour of `[accent]{...}` runs.
    pub accent: Rgb,
}

impl StyleSheet {
    pub const TITLE: &'static str = "title";
    pub const HEADER: &'static str = "header";
    pub const BODY: &'static str = "body";
    pub const BODY_CENTER: &'static str = "body_center";

    /// Looks up a named text style.
    pub fn text_style(&self, name: &str) -> Option<&TextStyle> {
        self.text.get(name)
    }

    /// Applies `overrides` field by field. Unknown names start from the body style.
    pub fn with_overrides(mut self, overrides: &StyleOverrides) -> Self {
        for (name, text) in &overrides.text {
            let style = self
                .text
                .entry(name.clone())
                .or_insert_with(TextStyle::body);
            text.apply(style);
        }
        overrides.table.apply(&mut self.table);
        if let Some(accent) = overrides.accent {
            self.accent = accent;
        }
        self
    }
}

impl Default for StyleSheet {
    fn default() -> Self {
        let title = TextStyle {
            font: FontChoice::Serif,
            size: 36,
            leading: 42.0,
            alignment: TextAlign::Center,
            bold: true,
            italic: true,
            space_after_mm: pt_to_mm(30.0),
            ..TextStyle::body()
        };
        let header = TextStyle {
            font: FontChoice::Serif,
            size: 24,
            leading: 28.8,
            bold: true,
            space_after_mm: pt_to_mm(20.0),
            ..TextStyle::body()
        };
        let body_center = TextStyle {
            alignment: TextAlign::Center,
            ..TextStyle::body()
        };

        let text = [
            (Self::TITLE, title),
            (Self::HEADER, header),
            (Self::BODY, TextStyle::body()),
            (Self::BODY_CENTER, body_center),
        ]
        .into_iter()
        .map(|(name, style)| (name.to_owned(), style))
        .collect();

        Self {
            text,
            table: TableStyle::default(),
            accent: GOLD,
        }
    }
}

macro_rules! overlay {
    ($source:expr, $target:expr, $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $source.$field {
                $target.$field = value;
            }
        )+
    };
}

/// The `[styles.text.<name>]` table of a configuration file. Absent fields keep their value.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TextStyleOverride {
    pub font: Option<FontChoice>,
    pub size: Option<u8>,
    pub leading: Option<f64>,
    pub color: Option<Rgb>,
    pub alignment: Option<TextAlign>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub space_before_mm: Option<f64>,
    pub space_after_mm: Option<f64>,
}

impl TextStyleOverride {
    pub fn apply(&self, style: &mut TextStyle) {
        overlay!(
            self,
            style,
            font,
            size,
            leading,
            color,
            alignment,
            bold,
            italic,
            space_before_mm,
            space_after_mm,
        );
    }
}

/// The `[styles.table]` table of a configuration file.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TableStyleOverride {
    pub header_background: Option<Rgb>,
    pub header_foreground: Option<Rgb>,
    pub body_foreground: Option<Rgb>,
    pub row_backgrounds: Option<[Rgb; 2]>,
    pub border: Option<Rgb>,
    pub font_size: Option<u8>,
    pub padding_mm: Option<f64>,
    pub header_bottom_padding_mm: Option<f64>,
}

impl TableStyleOverride {
    pub fn apply(&self, style: &mut TableStyle) {
        overlay!(
            self,
            style,
            header_background,
            header_foreground,
            body_foreground,
            row_backgrounds,
            border,
            font_size,
            padding_mm,
            header_bottom_padding_mm,
        );
    }
}

/// The `[styles]` section: partial changes layered over [`StyleSheet::default`].
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StyleOverrides {
    pub text: BTreeMap<String, TextStyleOverride>,
    pub table: TableStyleOverride,
    pub accent: Option<Rgb>,
}

/// Converts typographic points to millimetres.
pub fn pt_to_mm(points: f64) -> f64 {
    points * 25.4 / 72.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_theme_colours() {
        assert_eq!(Rgb::parse("#F5E6D3").unwrap(), SAND);
        assert_eq!(Rgb::parse("1a2b4c").unwrap(), BLUE);
        assert_eq!(GOLD.to_string(), "#C5A065");
    }

    #[test]
    fn rejects_malformed_colours() {
        for value in ["", "#FFF", "#GGGGGG", "#1234567"] {
            assert!(Rgb::parse(value).is_err(), "{:?} should fail", value);
        }
    }

    #[test]
    fn data_rows_alternate_between_two_fills() {
        let table = TableStyle::default();
        assert_eq!(table.row_background(0), WHITE);
        assert_eq!(table.row_background(1), LIGHT_SAND);
        assert_eq!(table.row_background(2), WHITE);
    }

    #[test]
    fn default_sheet_defines_every_block_style() {
        let sheet = StyleSheet::default();
        for name in [
            StyleSheet::TITLE,
            StyleSheet::HEADER,
            StyleSheet::BODY,
            StyleSheet::BODY_CENTER,
        ] {
            assert!(sheet.text_style(name).is_some(), "missing style {}", name);
        }
        let title = sheet.text_style(StyleSheet::TITLE).unwrap();
        assert!((title.line_spacing() - 42.0 / 36.0).abs() < 1e-9);
    }

    #[test]
    fn partial_override_keeps_the_rest_of_the_style() {
        let overrides = StyleOverrides {
            text: [(
                StyleSheet::TITLE.to_owned(),
                TextStyleOverride {
                    color: Some(Rgb(0, 0, 0)),
                    ..TextStyleOverride::default()
                },
            )]
            .into_iter()
            .collect(),
            ..StyleOverrides::default()
        };

        let sheet = StyleSheet::default().with_overrides(&overrides);
        let title = sheet.text_style(StyleSheet::TITLE).unwrap();
        assert_eq!(title.color, Rgb(0, 0, 0));
        assert_eq!(title.size, 36);
        assert_eq!(title.font, FontChoice::Serif);
        assert!(title.bold && title.italic);
        assert_eq!(title.alignment, TextAlign::Center);
        assert_eq!(sheet.text_style(StyleSheet::BODY).unwrap().size, 12);
    }

    #[test]
    fn new_style_names_start_from_body() {
        let overrides = StyleOverrides {
            text: [(
                "footnote".to_owned(),
                TextStyleOverride {
                    size: Some(8),
                    ..TextStyleOverride::default()
                },
            )]
            .into_iter()
            .collect(),
            ..StyleOverrides::default()
        };

        let sheet = StyleSheet::default().with_overrides(&overrides);
        let footnote = sheet.text_style("footnote").unwrap();
        assert_eq!(footnote.size, 8);
        assert_eq!(footnote.color, BLUE);
        assert_eq!(footnote.font, FontChoice::Sans);
    }

    #[test]
    fn table_and_accent_overrides_are_field_by_field() {
        let overrides = StyleOverrides {
            table: TableStyleOverride {
                border: Some(BLUE),
                ..TableStyleOverride::default()
            },
            accent: Some(LIGHT_SAND),
            ..StyleOverrides::default()
        };

        let sheet = StyleSheet::default().with_overrides(&overrides);
        assert_eq!(sheet.table.border, BLUE);
        assert_eq!(sheet.table.header_background, BLUE);
        assert_eq!(sheet.table.row_backgrounds, [WHITE, LIGHT_SAND]);
        assert_eq!(sheet.accent, LIGHT_SAND);
    }
}
