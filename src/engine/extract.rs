//! Tolerant text extractors for the two upstream feeds.
//!
//! Absence of a suit, a count, or a round token is a normal outcome,
//! never an error: every function here returns `Option` or a partial
//! map and the caller logs and moves on.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use super::suit::{normalize_glyphs, Suit};

fn round_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)#N\s*(\d+)").expect("round regex"))
}

fn group_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(([^)]*)\)").expect("group regex"))
}

/// Extract the round number from a `#N <digits>` token.
pub fn extract_round_number(text: &str) -> Option<u64> {
    round_re()
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// A results message is finalized when it carries no in-progress marker
/// and at least one completion marker.
pub fn is_finalized(text: &str) -> bool {
    if text.contains('⏰') {
        return false;
    }
    text.contains('✅') || text.contains('🔰') || text.contains("▶️")
}

/// Parse a statistics message into per-suit counts.
///
/// For each suit, finds the first occurrence of its glyph and records
/// the first decimal number appearing anywhere after it (line breaks
/// included — the stats feed formats counts in loose tables).
pub fn parse_stats(text: &str) -> BTreeMap<Suit, u32> {
    let normalized = normalize_glyphs(text);
    let mut stats = BTreeMap::new();

    for suit in Suit::ALL {
        if let Some(pos) = normalized.find(suit.glyph()) {
            let tail = &normalized[pos + suit.glyph().len_utf8()..];
            if let Some(count) = first_number(tail) {
                stats.insert(suit, count);
            }
        }
    }
    stats
}

fn first_number(text: &str) -> Option<u32> {
    let mut digits = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if !digits.is_empty() {
            break;
        }
    }
    if digits.is_empty() {
        None
    } else {
        // Saturate rather than fail on absurdly long digit runs.
        Some(digits.parse().unwrap_or(u32::MAX))
    }
}

/// Extract every parenthesized group, left to right.
pub fn extract_groups(text: &str) -> Vec<String> {
    group_re()
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Does the suit's glyph (any variant) appear within the group text?
pub fn suit_in_group(group: &str, suit: Suit) -> bool {
    normalize_glyphs(group).contains(suit.glyph())
}

/// Dedup key component: the first 50 characters of the raw text.
pub fn message_prefix(text: &str) -> String {
    text.chars().take(50).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_number_variants() {
        assert_eq!(extract_round_number("🎮 #N 123 (♠)(♦)"), Some(123));
        assert_eq!(extract_round_number("#n4567"), Some(4567));
        assert_eq!(extract_round_number("no token here"), None);
        assert_eq!(extract_round_number("#N"), None);
    }

    #[test]
    fn test_finality_matrix() {
        assert!(is_finalized("#N 12 ✅ done"));
        assert!(is_finalized("#N 12 🔰"));
        assert!(is_finalized("#N 12 ▶️ next"));
        assert!(!is_finalized("#N 12 in play"));
        // In-progress marker vetoes even with completion markers present.
        assert!(!is_finalized("#N 12 ⏰ ✅"));
    }

    #[test]
    fn test_parse_stats_complete() {
        let text = "Stats\n♠ : 20 jeux\n♥ : 8\n♦ : 5\n♣ : 9";
        let stats = parse_stats(text);
        assert_eq!(stats.len(), 4);
        assert_eq!(stats[&Suit::Spades], 20);
        assert_eq!(stats[&Suit::Hearts], 8);
        assert_eq!(stats[&Suit::Diamonds], 5);
        assert_eq!(stats[&Suit::Clubs], 9);
    }

    #[test]
    fn test_parse_stats_glyph_variants_and_table_noise() {
        // Emoji variants, prose between glyph and count, counts on later lines.
        let text = "♠️ pique —\n20\n❤️ coeur | 8 | ♦️ carreau 15";
        let stats = parse_stats(text);
        assert_eq!(stats[&Suit::Spades], 20);
        assert_eq!(stats[&Suit::Hearts], 8);
        assert_eq!(stats[&Suit::Diamonds], 15);
        assert!(!stats.contains_key(&Suit::Clubs));
    }

    #[test]
    fn test_parse_stats_empty() {
        assert!(parse_stats("rien d'utile ici").is_empty());
        assert!(parse_stats("♠ sans nombre").is_empty());
    }

    #[test]
    fn test_extract_groups_order() {
        let groups = extract_groups("#N 9 (A♠ K♦)(3♥)(Q♣)");
        assert_eq!(groups, vec!["A♠ K♦", "3♥", "Q♣"]);
        assert!(extract_groups("no parens").is_empty());
    }

    #[test]
    fn test_suit_in_group_normalizes() {
        assert!(suit_in_group("K❤️ 10♣️", Suit::Hearts));
        assert!(suit_in_group("K❤️ 10♣️", Suit::Clubs));
        assert!(!suit_in_group("K❤️ 10♣️", Suit::Spades));
    }

    #[test]
    fn test_message_prefix_counts_chars() {
        let text = "♠".repeat(60);
        assert_eq!(message_prefix(&text).chars().count(), 50);
        assert_eq!(message_prefix("court"), "court");
    }
}
