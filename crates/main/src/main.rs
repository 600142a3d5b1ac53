use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::info;
use proposal_deck::model::BUILTIN_DECKS;
use proposal_deck::{BuildConfig, DeckBuilder, DeckDefinition};

/// Renders the Collective Oasis proposal decks to PDF.
///
/// Without a subcommand the `proposal` deck is written to its default path. Fonts are looked up
/// in `DECK_FONTS_DIR`, `assets/fonts` and the system Liberation font directories.
#[derive(Parser)]
#[command(author, version, about = "Render proposal decks to PDF")]
struct Cli {
    /// TOML file overriding the cache, page, chrome and style settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one deck.
    Build {
        /// Built-in deck name or path to a deck TOML file.
        #[arg(long, default_value = "proposal")]
        deck: String,

        /// Output path; defaults to the deck's own `output`.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Render every built-in deck.
    All,

    /// List the built-in decks.
    Decks,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Build {
        deck: "proposal".to_owned(),
        output: None,
    });

    if let Err(err) = run(cli.config, command) {
        eprintln!("Error: {}", err);
        print_error_sources(err.as_ref());
        std::process::exit(1);
    }
}

fn run(config: Option<PathBuf>, command: Commands) -> Result<(), Box<dyn Error>> {
    let config = match config {
        Some(path) => BuildConfig::load(path)?,
        None => BuildConfig::default(),
    };

    match command {
        Commands::Build { deck, output } => {
            let builder = DeckBuilder::new(config)?;
            let deck = DeckDefinition::locate(&deck)?;
            build_one(&builder, &deck, output)
        }
        Commands::All => {
            let builder = DeckBuilder::new(config)?;
            for name in BUILTIN_DECKS {
                let deck = DeckDefinition::builtin(name)?;
                build_one(&builder, &deck, None)?;
            }
            Ok(())
        }
        Commands::Decks => {
            for name in BUILTIN_DECKS {
                let deck = DeckDefinition::builtin(name)?;
                println!("{:<10} {}", name, deck.output.display());
            }
            Ok(())
        }
    }
}

fn build_one(
    builder: &DeckBuilder<proposal_deck::assets::HttpFetcher>,
    deck: &DeckDefinition,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let output = output.unwrap_or_else(|| deck.output.clone());
    let report = builder.build(deck, &output)?;

    if !report.skipped.is_empty() {
        info!(
            "{} image(s) left out: {}",
            report.skipped.len(),
            report
                .skipped
                .iter()
                .map(|skipped| skipped.key.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    println!("PDF successfully created: {}", report.output.display());
    Ok(())
}

fn print_error_sources(mut error: &(dyn Error + 'static)) {
    while let Some(source) = error.source() {
        eprintln!("  caused by: {}", source);
        error = source;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_arguments_means_default_build() {
        let cli = Cli::try_parse_from(["proposal-deck"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn all_has_no_run_aliases() {
        let cli = Cli::try_parse_from(["proposal-deck", "all"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::All)));
        assert!(Cli::try_parse_from(["proposal-deck", "run-all"]).is_err());
        assert!(Cli::try_parse_from(["proposal-deck", "run_all"]).is_err());
    }

    #[test]
    fn build_accepts_deck_and_output() {
        let cli = Cli::try_parse_from([
            "proposal-deck",
            "--config",
            "deck.toml",
            "build",
            "--deck",
            "catalog",
            "--output",
            "out/catalog.pdf",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("deck.toml")));
        match cli.command {
            Some(Commands::Build { deck, output }) => {
                assert_eq!(deck, "catalog");
                assert_eq!(output, Some(PathBuf::from("out/catalog.pdf")));
            }
            _ => panic!("expected the build subcommand"),
        }
    }
}
