//! Variation classification for similar matches.
//!
//! Rules are evaluated in order and the first hit wins, so a name with both
//! "live" and "edit" classifies as live. A standalone "edit" counts as a
//! remix; the "edit" of "radio edit" is left to the radio edit rule.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::VariationType;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// One classifier rule: a label and the word-boundary pattern that selects it.
pub struct VariationRule {
    pub variation: VariationType,
    pattern: Regex,
}

impl VariationRule {
    fn new(variation: VariationType, pattern: &str) -> Self {
        Self {
            variation,
            pattern: Regex::new(pattern).unwrap(),
        }
    }

    /// Test a lower-cased name against this rule.
    pub fn matches(&self, name: &str) -> bool {
        match self.variation {
            VariationType::Remix => self
                .pattern
                .find_iter(name)
                .any(|m| !(m.as_str() == "edit" && name[..m.start()].ends_with("radio "))),
            _ => self.pattern.is_match(name),
        }
    }
}

/// Ordered rules, tested against the lower-cased name. Order is significant.
/// "Radio Edit" lands on radio_edit, not remix: see `VariationRule::matches`.
pub static VARIATION_RULES: Lazy<Vec<VariationRule>> = Lazy::new(|| {
    vec![
        VariationRule::new(VariationType::Live, r"(?i)\b(?:live|en vivo|ao vivo)\b"),
        VariationRule::new(VariationType::Remix, r"(?i)\b(?:remix|rmx|rework|edit)\b"),
        VariationRule::new(VariationType::Remaster, r"(?i)\b(?:remaster|remastered)\b"),
        VariationRule::new(VariationType::Acoustic, r"(?i)\b(?:acoustic|unplugged|stripped)\b"),
        VariationRule::new(VariationType::Instrumental, r"(?i)\b(?:instrumental|karaoke)\b"),
        VariationRule::new(VariationType::RadioEdit, r"(?i)\b(?:radio edit|single version)\b"),
        VariationRule::new(VariationType::Extended, r"(?i)\b(?:extended|long version|full length)\b"),
        VariationRule::new(VariationType::Demo, r"(?i)\b(?:demo|rough mix)\b"),
    ]
});

/// Any parenthesized or bracketed group, checked on the original-case name.
pub static QUALIFIER_GROUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[(\[].*?[)\]]").unwrap());

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Classify a track name. `None` means no qualifier was detected at all.
pub fn classify_variation(track_name: &str) -> Option<VariationType> {
    let lower = track_name.to_lowercase();

    if let Some(rule) = VARIATION_RULES.iter().find(|rule| rule.matches(&lower)) {
        return Some(rule.variation);
    }

    if QUALIFIER_GROUP.is_match(track_name) {
        return Some(VariationType::Other);
    }

    None
}
