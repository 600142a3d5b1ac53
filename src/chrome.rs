//! Per-page decoration.
//!
//! Decoration happens in two places because the layout engine can stroke but not fill:
//!
//! - [`PageChromeDecorator`] is the `genpdf` page hook. It numbers pages, applies the margins and
//!   prints the right-aligned page label in the bottom margin.
//! - [`paint_backgrounds`] runs on the finished PDF and slips an underlay content stream beneath
//!   every page with the full-page fill and the accent bar along the bottom edge.
//!
//! Both consult [`ChromeConfig::for_page`], so the first page can be styled apart from the rest.

use genpdf::error::Error;
use genpdf::style::{Color, Style, StyledString};
use genpdf::{render, PageDecorator, Position};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, ObjectId, Stream};

use crate::config::{ChromeConfig, PageChrome, PageConfig};
use crate::elements::{mm, mm_to_f64, PageCounter};

/// A4 in points, used when a page carries no media box of its own.
const FALLBACK_MEDIA_BOX: [f32; 2] = [595.276, 841.89];

const PAGE_LABEL_FONT_SIZE: u8 = 9;

/// `genpdf` page hook: margins plus the page number label.
pub struct PageChromeDecorator {
    counter: PageCounter,
    page: PageConfig,
    chrome: ChromeConfig,
    label_color: Color,
}

impl PageChromeDecorator {
    pub fn new(
        counter: PageCounter,
        page: PageConfig,
        chrome: ChromeConfig,
        label_color: Color,
    ) -> Self {
        Self {
            counter,
            page,
            chrome,
            label_color,
        }
    }

    fn print_page_number(
        &self,
        context: &genpdf::Context,
        page_area: &render::Area<'_>,
        style: Style,
        number: usize,
    ) -> Result<(), Error> {
        let label = number.to_string();
        let label_style = style.and(
            Style::new()
                .with_font_size(PAGE_LABEL_FONT_SIZE)
                .with_color(self.label_color),
        );

        let label_width =
            mm_to_f64(StyledString::new(label.clone(), label_style).width(&context.font_cache));
        let line_height = mm_to_f64(label_style.line_height(&context.font_cache));
        let page_size = page_area.size();
        let margin = self.page.margin_mm;

        let x = mm_to_f64(page_size.width) - margin - label_width;
        let y = mm_to_f64(page_size.height) - (margin + line_height) / 2.0;

        if let Some(mut section) = page_area.text_section(
            &context.font_cache,
            Position::new(mm(x), mm(y)),
            label_style,
        ) {
            section.print_str(&label, label_style)?;
        }
        Ok(())
    }
}

impl PageDecorator for PageChromeDecorator {
    fn decorate_page<'a>(
        &mut self,
        context: &genpdf::Context,
        mut area: render::Area<'a>,
        style: Style,
    ) -> Result<render::Area<'a>, Error> {
        let number = self.counter.advance();

        if self.chrome.for_page(number).page_number {
            self.print_page_number(context, &area, style, number)?;
        }

        area.add_margins(self.page.margins());
        Ok(area)
    }
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

fn media_box_size(document: &lopdf::Document, page_id: ObjectId) -> [f32; 2] {
    let media_box = document
        .get_object(page_id)
        .and_then(Object::as_dict)
        .and_then(|page| page.get(b"MediaBox"))
        .and_then(Object::as_array);

    match media_box {
        Ok(values) if values.len() == 4 => {
            let coords: Vec<f32> = values.iter().filter_map(number).collect();
            if coords.len() == 4 {
                [coords[2] - coords[0], coords[3] - coords[1]]
            } else {
                FALLBACK_MEDIA_BOX
            }
        }
        _ => FALLBACK_MEDIA_BOX,
    }
}

fn fill_operations(operations: &mut Vec<Operation>, color: crate::style::Rgb, rect: [f32; 4]) {
    let [r, g, b] = color.unit_channels();
    operations.push(Operation::new("rg", vec![r.into(), g.into(), b.into()]));
    operations.push(Operation::new(
        "re",
        rect.iter().map(|value| Object::from(*value)).collect(),
    ));
    operations.push(Operation::new("f", vec![]));
}

/// Drawing operations for the underlay of one page, or `None` when the chrome paints nothing.
pub fn underlay_operations(chrome: &PageChrome, page_size: [f32; 2]) -> Option<Vec<Operation>> {
    if chrome.background.is_none() && chrome.accent.is_none() {
        return None;
    }

    let [width, height] = page_size;
    let mut operations = vec![Operation::new("q", vec![])];
    if let Some(background) = chrome.background {
        fill_operations(&mut operations, background, [0.0, 0.0, width, height]);
    }
    if let Some(accent) = chrome.accent {
        let bar = chrome.accent_height_pt.max(0.0) as f32;
        fill_operations(&mut operations, accent, [0.0, 0.0, width, bar]);
    }
    operations.push(Operation::new("Q", vec![]));
    Some(operations)
}

/// Prepends the background underlay to every page of `document`.
///
/// Returns the number of pages that received an underlay.
pub fn paint_backgrounds(
    document: &mut lopdf::Document,
    chrome: &ChromeConfig,
) -> Result<usize, lopdf::Error> {
    let mut painted = 0;

    for (number, page_id) in document.get_pages() {
        let size = media_box_size(document, page_id);
        let Some(operations) = underlay_operations(chrome.for_page(number as usize), size) else {
            continue;
        };

        let content = Content { operations }.encode()?;
        let underlay_id = document.add_object(Stream::new(Dictionary::new(), content));

        let page = document.get_object_mut(page_id)?.as_dict_mut()?;
        let mut contents = vec![Object::Reference(underlay_id)];
        match page.get(b"Contents") {
            Ok(Object::Array(existing)) => contents.extend(existing.iter().cloned()),
            Ok(existing) => contents.push(existing.clone()),
            Err(_) => {}
        }
        page.set("Contents", Object::Array(contents));
        painted += 1;
    }

    Ok(painted)
}
