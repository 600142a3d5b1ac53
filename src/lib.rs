//! Asset-backed proposal decks rendered to PDF.
//!
//! A deck is an ordered list of [`model::ContentBlock`]s. [`builder::DeckBuilder`] resolves the
//! remote images through the on-disk [`assets::AssetCache`] and lays everything out with `genpdf`.

pub mod assets;
pub mod builder;
pub mod chrome;
pub mod config;
pub mod elements;
pub mod fonts;
pub mod model;
pub mod outline;
pub mod richtext;
pub mod style;

pub use builder::{BuildError, BuildReport, DeckBuilder};
pub use config::BuildConfig;
pub use model::{ContentBlock, DeckDefinition};
