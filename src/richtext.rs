//! Inline emphasis inside text blocks.
//!
//! Deck text may use a tiny markup:
//!
//! - `**bold**`
//! - `*italic*`
//! - `[accent]{text}` for text drawn in the theme accent colour
//!
//! Markers nest (`**very *cool***`).  Malformed input is rejected with the byte offset of the
//! problem so that a typo in a deck file fails the build instead of printing stray asterisks.

use std::fmt;

use genpdf::style::{Color, Style, StyledString};

const ACCENT_OPEN: &str = "[accent]{";

/// A run of text sharing the same emphasis.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Span {
    text: String,
    bold: bool,
    italic: bool,
    accent: bool,
}

impl Span {
    /// Creates an unemphasised span.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_bold(&self) -> bool {
        self.bold
    }

    pub fn is_italic(&self) -> bool {
        self.italic
    }

    pub fn is_accent(&self) -> bool {
        self.accent
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    pub fn accent(mut self) -> Self {
        self.accent = true;
        self
    }

    /// Converts the span into a `genpdf` string. Only the emphasis is set here; font, size and
    /// base colour come from the enclosing block style.
    pub fn to_styled_string(&self, accent_color: Color) -> StyledString {
        let mut style = Style::new();
        if self.bold {
            style.set_bold();
        }
        if self.italic {
            style.set_italic();
        }
        if self.accent {
            style.set_color(accent_color);
        }
        StyledString::new(self.text.clone(), style)
    }
}

/// Markup error with the byte offset where it was detected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    index: usize,
    message: String,
}

impl ParseError {
    fn new(index: usize, message: impl Into<String>) -> Self {
        Self {
            index,
            message: message.into(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at byte {})", self.message, self.index)
    }
}

impl std::error::Error for ParseError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Marker {
    Bold,
    Italic,
    Accent,
}

impl Marker {
    fn closing(self) -> &'static str {
        match self {
            Marker::Bold => "**",
            Marker::Italic => "*",
            Marker::Accent => "}",
        }
    }

    fn apply(self, mut span: Span) -> Span {
        match self {
            Marker::Bold => span.bold = true,
            Marker::Italic => span.italic = true,
            Marker::Accent => span.accent = true,
        }
        span
    }
}

/// Splits `input` into spans, resolving the emphasis markers.
pub fn parse_markup(input: &str) -> Result<Vec<Span>, ParseError> {
    let mut parser = Parser {
        input,
        index: 0,
        spans: Vec::new(),
    };
    parser.run(Span::default(), None)?;
    Ok(parser.spans)
}

struct Parser<'a> {
    input: &'a str,
    index: usize,
    spans: Vec<Span>,
}

impl Parser<'_> {
    fn rest(&self) -> &str {
        &self.input[self.index..]
    }

    fn run(&mut self, state: Span, closing: Option<Marker>) -> Result<(), ParseError> {
        let mut buffer = String::new();
        let opened_at = self.index;

        while let Some(ch) = self.rest().chars().next() {
            if let Some(marker) = closing {
                if self.rest().starts_with(marker.closing()) {
                    self.flush(&mut buffer, &state);
                    self.index += marker.closing().len();
                    return Ok(());
                }
            }

            let opened = if self.rest().starts_with("**") {
                Some((Marker::Bold, 2))
            } else if ch == '*' {
                Some((Marker::Italic, 1))
            } else if self.rest().starts_with(ACCENT_OPEN) {
                Some((Marker::Accent, ACCENT_OPEN.len()))
            } else {
                None
            };

            if let Some((marker, width)) = opened {
                self.flush(&mut buffer, &state);
                self.index += width;
                self.run(marker.apply(state.clone()), Some(marker))?;
                continue;
            }

            match ch {
                '}' => {
                    return Err(ParseError::new(
                        self.index,
                        "unexpected `}` without a matching `[accent]{`",
                    ))
                }
                '[' => {
                    return Err(ParseError::new(
                        self.index,
                        "unsupported directive; expected `[accent]{...}`",
                    ))
                }
                _ => {
                    buffer.push(ch);
                    self.index += ch.len_utf8();
                }
            }
        }

        match closing {
            Some(marker) => Err(ParseError::new(
                opened_at,
                format!("unterminated `{}` span", marker.closing()),
            )),
            None => {
                self.flush(&mut buffer, &state);
                Ok(())
            }
        }
    }

    fn flush(&mut self, buffer: &mut String, state: &Span) {
        if buffer.is_empty() {
            return;
        }
        let mut span = state.clone();
        span.text = std::mem::take(buffer);
        self.spans.push(span);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_one_span() {
        let spans = parse_markup("Located in the heart of the dunes").unwrap();
        assert_eq!(spans, vec![Span::new("Located in the heart of the dunes")]);
    }

    #[test]
    fn nested_emphasis() {
        let spans = parse_markup("This is **very *cool***!").unwrap();
        assert_eq!(
            spans,
            vec![
                Span::new("This is "),
                Span::new("very ").bold(),
                Span::new("cool").bold().italic(),
                Span::new("!"),
            ]
        );
    }

    #[test]
    fn accent_directive() {
        let spans = parse_markup("Play [accent]{**giant** soccer} today").unwrap();
        assert_eq!(
            spans,
            vec![
                Span::new("Play "),
                Span::new("giant").accent().bold(),
                Span::new(" soccer").accent(),
                Span::new(" today"),
            ]
        );
    }

    #[test]
    fn styled_string_carries_emphasis_only() {
        let gold = Color::Rgb(0xC5, 0xA0, 0x65);
        let styled = Span::new("TOTAL").bold().accent().to_styled_string(gold);
        assert_eq!(styled.s, "TOTAL");
        assert!(styled.style.is_bold());
        assert!(!styled.style.is_italic());
        assert_eq!(styled.style.color(), Some(gold));
    }

    #[test]
    fn unterminated_bold_reports_its_start() {
        let err = parse_markup("Cost **oops").unwrap_err();
        assert_eq!(err.index(), 7);
        assert!(err.message().contains("unterminated"));
    }

    #[test]
    fn stray_brace_is_rejected() {
        let err = parse_markup("50% } off").unwrap_err();
        assert_eq!(err.index(), 4);
    }

    #[test]
    fn unknown_directive_is_rejected() {
        assert!(parse_markup("[color=#fff]{x}").is_err());
    }
}
