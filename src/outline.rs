//! Flat PDF outline built from the deck's header blocks.

use std::collections::BTreeMap;

use lopdf::{Dictionary, Document, Object, ObjectId};
use thiserror::Error;

/// Errors that can occur while attaching the outline to a rendered document.
#[derive(Debug, Error)]
pub enum OutlineError {
    #[error("failed to read the rendered PDF")]
    Pdf(#[from] lopdf::Error),

    #[error("PDF catalog entry is missing or not a dictionary")]
    MissingCatalog,

    #[error("heading `{title}` refers to missing page {page}")]
    MissingPage { title: String, page: usize },
}

/// A heading and the 1-based page it first appeared on, if it was rendered at all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Heading {
    pub title: String,
    pub page: Option<usize>,
}

struct OutlineEntry {
    object_id: ObjectId,
    page_ref: ObjectId,
    title: String,
}

/// Adds an `/Outlines` tree with one `/Dest [page /Fit]` entry per placed heading.
///
/// Returns the number of entries written; when no heading was placed the document is untouched.
pub fn attach_outline(document: &mut Document, headings: &[Heading]) -> Result<usize, OutlineError> {
    let pages = document.get_pages();
    let mut entries = collect_entries(document, headings, &pages)?;
    if entries.is_empty() {
        return Ok(0);
    }

    let outlines_id = document.new_object_id();
    link_entries(outlines_id, document, &mut entries);
    insert_outlines_root(outlines_id, document, &entries)?;
    Ok(entries.len())
}

fn collect_entries(
    document: &mut Document,
    headings: &[Heading],
    pages: &BTreeMap<u32, ObjectId>,
) -> Result<Vec<OutlineEntry>, OutlineError> {
    let mut entries = Vec::new();

    for heading in headings {
        let Some(page) = heading.page else {
            continue;
        };
        let page_ref = u32::try_from(page)
            .ok()
            .and_then(|number| pages.get(&number).copied())
            .ok_or_else(|| OutlineError::MissingPage {
                title: heading.title.clone(),
                page,
            })?;

        entries.push(OutlineEntry {
            object_id: document.new_object_id(),
            page_ref,
            title: heading.title.clone(),
        });
    }

    Ok(entries)
}

fn link_entries(outlines_id: ObjectId, document: &mut Document, entries: &mut [OutlineEntry]) {
    for index in 0..entries.len() {
        let mut dictionary = Dictionary::new();
        dictionary.set(
            "Title",
            Object::string_literal(entries[index].title.as_str()),
        );
        dictionary.set(
            "Dest",
            Object::Array(vec![
                Object::Reference(entries[index].page_ref),
                Object::Name("Fit".into()),
            ]),
        );
        dictionary.set("Parent", Object::Reference(outlines_id));

        if index > 0 {
            dictionary.set("Prev", Object::Reference(entries[index - 1].object_id));
        }
        if index + 1 < entries.len() {
            dictionary.set("Next", Object::Reference(entries[index + 1].object_id));
        }

        document
            .objects
            .insert(entries[index].object_id, Object::Dictionary(dictionary));
    }
}

fn insert_outlines_root(
    outlines_id: ObjectId,
    document: &mut Document,
    entries: &[OutlineEntry],
) -> Result<(), OutlineError> {
    let catalog_id = document
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| OutlineError::MissingCatalog)?;

    let mut dictionary = Dictionary::new();
    dictionary.set("Type", Object::Name("Outlines".into()));
    dictionary.set("Count", Object::Integer(entries.len() as i64));
    if let Some(first) = entries.first() {
        dictionary.set("First", Object::Reference(first.object_id));
    }
    if let Some(last) = entries.last() {
        dictionary.set("Last", Object::Reference(last.object_id));
    }
    document
        .objects
        .insert(outlines_id, Object::Dictionary(dictionary));

    let catalog = document
        .get_object_mut(catalog_id)
        .and_then(Object::as_dict_mut)
        .map_err(|_| OutlineError::MissingCatalog)?;
    catalog.set("Outlines", Object::Reference(outlines_id));
    catalog.set("PageMode", Object::Name("UseOutlines".into()));

    Ok(())
}
