//! Font discovery for deck rendering.
//!
//! Body text uses a Helvetica-metric sans family and display text a Times-metric serif family
//! (the Liberation fonts).  Both are looked up, in order, in:
//!
//! 1. `$DECK_FONTS_DIR`
//! 2. `assets/fonts` next to the running executable
//! 3. `assets/fonts` in the crate root
//! 4. the usual system locations of the Liberation fonts
//!
//! The sans family is mandatory.  A missing serif family only degrades the display styles, so it
//! falls back to the sans family with a warning.

use std::env;
use std::io;
use std::path::{Path, PathBuf};

use genpdf::error::{Error, ErrorKind};
use genpdf::fonts::{self, FontData, FontFamily};
use log::warn;

use crate::style::FontChoice;

/// Environment variable naming an extra font directory searched first.
pub const FONTS_DIR_ENV: &str = "DECK_FONTS_DIR";

/// File stem of the sans family, as expected by [`genpdf::fonts::from_files`].
pub const SANS_FAMILY_NAME: &str = "LiberationSans";

/// File stem of the serif family.
pub const SERIF_FAMILY_NAME: &str = "LiberationSerif";

const FACES: &[&str] = &["Regular", "Bold", "Italic", "BoldItalic"];

const SYSTEM_DIRECTORIES: &[&str] = &[
    "/usr/share/fonts/truetype/liberation",
    "/usr/share/fonts/truetype/liberation2",
    "/usr/share/fonts/liberation",
    "/usr/share/fonts/liberation-sans",
    "/usr/share/fonts/liberation-serif",
];

impl FontChoice {
    fn family_name(self) -> &'static str {
        match self {
            FontChoice::Sans => SANS_FAMILY_NAME,
            FontChoice::Serif => SERIF_FAMILY_NAME,
        }
    }
}

/// The families loaded for one render.
pub struct DeckFonts {
    /// Document default family.
    pub sans: FontFamily<FontData>,
    /// Display family, `None` when only the sans family could be found.
    pub serif: Option<FontFamily<FontData>>,
}

fn directory_candidates() -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    let mut push = |candidate: PathBuf| {
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    };

    if let Some(path) = env::var_os(FONTS_DIR_ENV).filter(|value| !value.is_empty()) {
        push(PathBuf::from(path));
    }

    if let Some(bin_dir) = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        push(bin_dir.join("assets/fonts"));
    }

    push(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/fonts"));

    for system in SYSTEM_DIRECTORIES {
        push(PathBuf::from(system));
    }

    candidates
}

fn face_files(directory: &Path, family: &'static str) -> impl Iterator<Item = PathBuf> {
    let directory = directory.to_path_buf();
    FACES
        .iter()
        .map(move |face| directory.join(format!("{}-{}.ttf", family, face)))
}

fn find_family_directory(choice: FontChoice) -> Result<PathBuf, Error> {
    let family = choice.family_name();
    let mut attempts = Vec::new();

    for candidate in directory_candidates() {
        if !candidate.is_dir() {
            attempts.push(format!("{} (directory missing)", candidate.display()));
            continue;
        }

        let missing: Vec<String> = face_files(&candidate, family)
            .filter(|path| !path.is_file())
            .map(|path| path.file_name().unwrap_or_default().to_string_lossy().into_owned())
            .collect();

        if missing.is_empty() {
            return Ok(candidate);
        }
        attempts.push(format!(
            "{} (missing {})",
            candidate.display(),
            missing.join(", ")
        ));
    }

    Err(Error::new(
        format!(
            "Unable to locate the {} font family. Checked: {}. Set {} to a directory containing {}-Regular.ttf and its Bold/Italic/BoldItalic faces.",
            family,
            attempts.join(", "),
            FONTS_DIR_ENV,
            family
        ),
        io::Error::new(io::ErrorKind::NotFound, "font family not found"),
    ))
}

/// Loads one family from the first directory that contains all four faces.
pub fn load_family(choice: FontChoice) -> Result<FontFamily<FontData>, Error> {
    let directory = find_family_directory(choice)?;
    let family = choice.family_name();

    fonts::from_files(&directory, family, None).map_err(|err| {
        Error::new(
            format!(
                "Failed to load font family '{}' from {}: {}",
                family,
                directory.display(),
                err
            ),
            io::Error::new(io::ErrorKind::Other, err.to_string()),
        )
    })
}

fn fonts_missing(err: &Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::IoError(io_err)
            if io_err.kind() == io::ErrorKind::NotFound
                || io_err.kind() == io::ErrorKind::PermissionDenied
    )
}

/// Loads the sans family and, when available, the serif family.
pub fn load_deck_fonts() -> Result<DeckFonts, Error> {
    let sans = load_family(FontChoice::Sans)?;
    let serif = match load_family(FontChoice::Serif) {
        Ok(family) => Some(family),
        Err(err) if fonts_missing(&err) => {
            warn!(
                "Serif fonts unavailable ({}); display styles fall back to {}.",
                err, SANS_FAMILY_NAME
            );
            None
        }
        Err(err) => return Err(err),
    };
    Ok(DeckFonts { sans, serif })
}

/// Indicates whether the mandatory sans family can be found.
pub fn default_fonts_available() -> bool {
    find_family_directory(FontChoice::Sans).is_ok()
}
