//! Layout elements the decks need beyond what `genpdf` ships with.
//!
//! - [`sized_image`] turns a cached asset into an image stretched to a fixed box.
//! - [`VerticalSpace`] inserts a fixed gap.
//! - [`StripedTable`] renders a grid with a header row and alternating row fills.
//! - [`PageMarker`] remembers the page on which an element first appeared.

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;

use image::GenericImageView;

use genpdf::elements::Image;
use genpdf::error::{Context as _, Error, ErrorKind};
use genpdf::style::{Color, Style, StyledString};
use genpdf::{render, Alignment, Element, Mm, Position, RenderResult, Scale, Size};

use crate::style::{Rgb, TableStyle};

const DEFAULT_IMAGE_DPI: f64 = 300.0;
const MM_PER_INCH: f64 = 25.4;
/// Distance between the strokes used to paint a filled area. Strokes are 1pt (~0.35mm) wide.
const FILL_STROKE_STEP_MM: f64 = 0.3;

pub(crate) fn mm(value: f64) -> Mm {
    Mm::from(printpdf::Mm(value))
}

pub(crate) fn mm_to_f64(value: Mm) -> f64 {
    let mm: printpdf::Mm = value.into();
    mm.0
}

fn estimated_image_size(image: &image::DynamicImage, dpi: f64) -> (f64, f64) {
    let (px_width, px_height) = image.dimensions();
    (
        MM_PER_INCH * f64::from(px_width) / dpi,
        MM_PER_INCH * f64::from(px_height) / dpi,
    )
}

/// Loads an image from `path`, sniffing the format from its content rather than its extension.
pub fn decode_image_from_path(path: impl AsRef<Path>) -> Result<image::DynamicImage, Error> {
    let path = path.as_ref();
    let reader = image::io::Reader::open(path)
        .with_context(|| format!("Failed to open image file {}", path.display()))?;
    reader
        .with_guessed_format()
        .context("Unable to determine image format")?
        .decode()
        .with_context(|| format!("Failed to decode image file {}", path.display()))
}

/// Builds a centred image from the file at `path`, stretched to exactly `width` x `height` mm.
pub fn sized_image(path: impl AsRef<Path>, width_mm: f64, height_mm: f64) -> Result<Image, Error> {
    let path = path.as_ref();
    let decoded = decode_image_from_path(path)?;
    // The PDF backend rejects images with an alpha channel.
    let decoded = image::DynamicImage::ImageRgb8(decoded.to_rgb8());

    let (natural_width, natural_height) = estimated_image_size(&decoded, DEFAULT_IMAGE_DPI);
    if natural_width <= f64::EPSILON || natural_height <= f64::EPSILON {
        return Err(Error::new(
            format!("Image file {} has no pixels", path.display()),
            ErrorKind::InvalidData,
        ));
    }

    let mut image = Image::from_dynamic_image(decoded)?;
    image.set_scale(Scale::new(
        width_mm / natural_width,
        height_mm / natural_height,
    ));
    image.set_alignment(Alignment::Center);
    Ok(image)
}

/// Paints a solid rectangle whose top-left corner is `origin` (relative to `area`).
///
/// `genpdf` areas can only stroke paths, so the fill is laid down as overlapping horizontal
/// strokes.
fn fill_rect(area: &render::Area<'_>, origin: (f64, f64), size: (f64, f64), color: Color) {
    let (x, y) = origin;
    let (width, height) = size;
    let style = Style::new().with_color(color);

    let mut offset = FILL_STROKE_STEP_MM / 2.0;
    while offset < height {
        area.draw_line(
            vec![
                Position::new(mm(x), mm(y + offset)),
                Position::new(mm(x + width), mm(y + offset)),
            ],
            style,
        );
        offset += FILL_STROKE_STEP_MM;
    }
}

/// A fixed vertical gap. At the bottom of a page the gap is clipped instead of carried over.
pub struct VerticalSpace {
    height: Mm,
}

impl VerticalSpace {
    pub fn new(height_mm: f64) -> Self {
        Self {
            height: mm(height_mm.max(0.0)),
        }
    }
}

impl Element for VerticalSpace {
    fn render(
        &mut self,
        _context: &genpdf::Context,
        area: render::Area<'_>,
        _style: Style,
    ) -> Result<RenderResult, Error> {
        let available = area.size().height;
        let height = if self.height > available {
            available
        } else {
            self.height
        };

        let mut result = RenderResult::default();
        result.size = Size::new(0, height);
        Ok(result)
    }
}

/// Grid of text cells with a distinct header row, alternating row fills and a uniform border.
///
/// Cells are single-line and centred.  When the remaining page height cannot hold the next row
/// the table reports `has_more` and continues with that row on the following page.
pub struct StripedTable {
    rows: Vec<Vec<String>>,
    column_widths_mm: Vec<f64>,
    style: TableStyle,
    next_row: usize,
}

impl StripedTable {
    /// Creates a table whose first row is the header.
    pub fn new(rows: Vec<Vec<String>>, column_widths_mm: Vec<f64>, style: TableStyle) -> Self {
        Self {
            rows,
            column_widths_mm,
            style,
            next_row: 0,
        }
    }

    /// Returns the cell text, row by row.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of columns, taken from the widest row.
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Background of `row`; row 0 is the header.
    pub fn row_fill(&self, row: usize) -> Rgb {
        if row == 0 {
            self.style.header_background
        } else {
            self.style.row_background(row - 1)
        }
    }

    /// Text style of `row`: the header is bold and inverted.
    pub fn row_text_style(&self, row: usize) -> Style {
        let style = Style::new().with_font_size(self.style.font_size);
        if row == 0 {
            style
                .bold()
                .with_color(self.style.header_foreground.into())
        } else {
            style.with_color(self.style.body_foreground.into())
        }
    }

    /// Column widths in mm, shrunk proportionally when they exceed `available_mm`.
    ///
    /// Missing or mismatched widths split the available width evenly.
    pub fn fitted_widths(&self, available_mm: f64) -> Vec<f64> {
        let columns = self.column_count();
        if columns == 0 {
            return Vec::new();
        }

        let widths = if self.column_widths_mm.len() == columns
            && self.column_widths_mm.iter().all(|width| *width > 0.0)
        {
            self.column_widths_mm.clone()
        } else {
            vec![available_mm / columns as f64; columns]
        };

        let total: f64 = widths.iter().sum();
        if total > available_mm {
            let factor = available_mm / total;
            widths.into_iter().map(|width| width * factor).collect()
        } else {
            widths
        }
    }

    fn row_padding(&self, row: usize) -> (f64, f64) {
        let bottom = if row == 0 {
            self.style.header_bottom_padding_mm
        } else {
            self.style.padding_mm
        };
        (self.style.padding_mm, bottom)
    }

    fn draw_grid(&self, area: &render::Area<'_>, left: f64, top: f64, widths: &[f64], height: f64) {
        let style = Style::new().with_color(self.style.border.into());
        let right = left + widths.iter().sum::<f64>();
        let bottom = top + height;

        for y in [top, bottom] {
            area.draw_line(
                vec![Position::new(mm(left), mm(y)), Position::new(mm(right), mm(y))],
                style,
            );
        }

        let mut x = left;
        for boundary in std::iter::once(0.0).chain(widths.iter().copied()) {
            x += boundary;
            area.draw_line(
                vec![Position::new(mm(x), mm(top)), Position::new(mm(x), mm(bottom))],
                style,
            );
        }
    }
}

impl Element for StripedTable {
    fn render(
        &mut self,
        context: &genpdf::Context,
        area: render::Area<'_>,
        style: Style,
    ) -> Result<RenderResult, Error> {
        let mut result = RenderResult::default();
        let available_width = mm_to_f64(area.size().width);
        let available_height = mm_to_f64(area.size().height);

        let widths = self.fitted_widths(available_width);
        let table_width: f64 = widths.iter().sum();
        let left = ((available_width - table_width) / 2.0).max(0.0);
        let mut y = 0.0;

        while self.next_row < self.rows.len() {
            let row = self.next_row;
            let text_style = style.and(self.row_text_style(row));
            let line_height = mm_to_f64(text_style.line_height(&context.font_cache));
            let (top_padding, bottom_padding) = self.row_padding(row);
            let row_height = top_padding + line_height + bottom_padding;

            if y + row_height > available_height {
                result.has_more = true;
                break;
            }

            fill_rect(
                &area,
                (left, y),
                (table_width, row_height),
                self.row_fill(row).into(),
            );

            let mut x = left;
            for (column, width) in widths.iter().enumerate() {
                let text = self.rows[row].get(column).map(String::as_str).unwrap_or("");
                let text_width =
                    mm_to_f64(StyledString::new(text.to_owned(), text_style).width(&context.font_cache));
                let offset = ((width - text_width) / 2.0).max(0.0);
                let position = Position::new(mm(x + offset), mm(y + top_padding));
                if let Some(mut section) =
                    area.text_section(&context.font_cache, position, text_style)
                {
                    section.print_str(text, text_style)?;
                }
                x += width;
            }

            self.draw_grid(&area, left, y, &widths, row_height);
            y += row_height;
            self.next_row += 1;
        }

        result.size = Size::new(mm(table_width), mm(y));
        Ok(result)
    }
}

/// Shared page number, advanced by the page decorator and read by [`PageMarker`]s.
#[derive(Clone, Debug, Default)]
pub struct PageCounter(Rc<Cell<usize>>);

impl PageCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The 1-based number of the page being laid out, 0 before the first page.
    pub fn current(&self) -> usize {
        self.0.get()
    }

    pub(crate) fn advance(&self) -> usize {
        let next = self.0.get() + 1;
        self.0.set(next);
        next
    }
}

/// First-appearance page of every registered marker, in registration order.
#[derive(Clone, Debug, Default)]
pub struct PageLog(Rc<RefCell<Vec<Option<usize>>>>);

impl PageLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self) -> usize {
        let mut slots = self.0.borrow_mut();
        slots.push(None);
        slots.len() - 1
    }

    fn record(&self, slot: usize, page: usize) {
        if let Some(entry) = self.0.borrow_mut().get_mut(slot) {
            entry.get_or_insert(page);
        }
    }

    /// Snapshot of the recorded pages; `None` for markers that never rendered.
    pub fn pages(&self) -> Vec<Option<usize>> {
        self.0.borrow().clone()
    }
}

/// Wraps an element and records the page on which it first produced visible output.
pub struct PageMarker<E> {
    inner: E,
    counter: PageCounter,
    log: PageLog,
    slot: usize,
}

impl<E: Element> PageMarker<E> {
    pub fn new(inner: E, counter: &PageCounter, log: &PageLog) -> Self {
        Self {
            inner,
            counter: counter.clone(),
            slot: log.register(),
            log: log.clone(),
        }
    }
}

impl<E: Element> Element for PageMarker<E> {
    fn render(
        &mut self,
        context: &genpdf::Context,
        area: render::Area<'_>,
        style: Style,
    ) -> Result<RenderResult, Error> {
        let result = self.inner.render(context, area, style)?;
        if result.size.height > Mm::default() {
            self.log.record(self.slot, self.counter.current());
        }
        Ok(result)
    }
}
