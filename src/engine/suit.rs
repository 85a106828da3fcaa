//! The four card suits and their glyph handling.
//!
//! Upstream feeds mix emoji-presentation variants (`♠️`, `❤️`) with the
//! plain codepoints. Everything entering the engine goes through one
//! canonicalization table instead of ad-hoc substitutions.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Suit {
    Spades,
    Hearts,
    Diamonds,
    Clubs,
}

/// Difference pairings consulted by the scheduler, in evaluation order.
pub const PAIRINGS: [(Suit, Suit); 2] = [
    (Suit::Diamonds, Suit::Spades),
    (Suit::Hearts, Suit::Clubs),
];

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Spades, Suit::Hearts, Suit::Diamonds, Suit::Clubs];

    /// Canonical single-codepoint glyph.
    pub fn glyph(&self) -> char {
        match self {
            Suit::Spades => '♠',
            Suit::Hearts => '♥',
            Suit::Diamonds => '♦',
            Suit::Clubs => '♣',
        }
    }

    /// Emoji-presentation form used in published announcements.
    pub fn display(&self) -> &'static str {
        match self {
            Suit::Spades => "♠️",
            Suit::Hearts => "♥️",
            Suit::Diamonds => "♦️",
            Suit::Clubs => "♣️",
        }
    }

}

/// Normalize every suit glyph variant in `text` to its canonical
/// codepoint, stripping emoji variation selectors.
pub fn normalize_glyphs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{fe0f}' => {} // variation selector, drop
            '❤' => out.push('♥'),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_variants() {
        assert_eq!(normalize_glyphs("♠️ ❤️ ♦️ ♣️ ❤"), "♠ ♥ ♦ ♣ ♥");
    }

    #[test]
    fn test_normalized_text_contains_canonical_glyphs() {
        for s in Suit::ALL {
            assert!(normalize_glyphs(s.display()).contains(s.glyph()));
        }
    }
}
