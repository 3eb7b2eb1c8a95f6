//! Label heuristics for intro and credits hints.
//!
//! Chapter titles and metadata keys are matched case-insensitively against
//! short multilingual keyword sets. The patterns are deliberately unanchored:
//! labels such as `op1`, `ED`, `Opening (TV size)` or `Титры` all count.

use crate::ranges::SegmentKind;
use regex::Regex;
use std::sync::OnceLock;

const INTRO_PATTERN: &str = r"(?i)(op|opening|intro|вступ|застав)";
const CREDITS_PATTERN: &str = r"(?i)(ed|ending|outro|credits|титр)";

fn intro_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(INTRO_PATTERN).expect("intro pattern is valid"))
}

fn credits_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CREDITS_PATTERN).expect("credits pattern is valid"))
}

pub fn is_intro_label(text: &str) -> bool {
    intro_regex().is_match(text)
}

pub fn is_credits_label(text: &str) -> bool {
    credits_regex().is_match(text)
}

/// Classify a label. Intro keywords win when both sets match.
pub fn kind_for_label(text: &str) -> Option<SegmentKind> {
    if text.is_empty() {
        None
    } else if is_intro_label(text) {
        Some(SegmentKind::Intro)
    } else if is_credits_label(text) {
        Some(SegmentKind::Credits)
    } else {
        None
    }
}
