/// Regex patterns for G-code line shapes
///
/// All patterns are compiled once on first use via `LazyLock`, are
/// case-insensitive, and are only reachable through the classifier.
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

/// Build a case-insensitive regex from a compile-time constant pattern.
///
/// # Panics
///
/// Panics if the pattern is invalid. All patterns in this module are
/// constants covered by the tests below, so this can only fire during
/// development, at first access of the `LazyLock` static.
fn build_re(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .unicode(true)
        .build()
        .unwrap_or_else(|_| panic!("Invalid regex pattern: {pattern}"))
}

// Anchor pattern
const SOL_STR: &str = r"^\s*"; // Start of line

// Numeric forms
const DECIMAL: &str = r"[-+]?\d*\.?\d+(?:e[-+]?\d+)?";
const SIGNED_INT: &str = r"-?\d+";

// ===== STRUCTURED COMMENT MARKERS =====
// Matched against the whole line (without line ending)

// ; TYPE: <text>
pub(super) static TYPE_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| build_re(&format!(r"{SOL_STR};\s*TYPE\s*:\s*(.+)$")));

// ;LAYER:<n>
pub(super) static LAYER_INDEX_RE: LazyLock<Regex> =
    LazyLock::new(|| build_re(&format!(r"{SOL_STR};LAYER:\s*({SIGNED_INT})")));

// ; layer <n>
pub(super) static LAYER_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| build_re(&format!(r"{SOL_STR};\s*layer\s+({SIGNED_INT})\b")));

// ;LAYER_CHANGE / ;BEFORE_LAYER_CHANGE
pub(super) static LAYER_CHANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| build_re(&format!(r"{SOL_STR};(?:BEFORE_)?LAYER_CHANGE\b")));

// ===== COMMANDS =====
// Matched against the code part of a line (comment already removed)

// M104 / M109 with an S target; group 1 is the variant digit
pub(super) static TEMPERATURE_RE: LazyLock<Regex> =
    LazyLock::new(|| build_re(&format!(r"{SOL_STR}M10([49])\b.*\bS(-?\d+(?:\.\d+)?)")));

pub(super) static FAN_ON_RE: LazyLock<Regex> =
    LazyLock::new(|| build_re(&format!(r"{SOL_STR}M106\b.*\bS(\d+)")));
pub(super) static FAN_OFF_RE: LazyLock<Regex> =
    LazyLock::new(|| build_re(&format!(r"{SOL_STR}M107\b")));

pub(super) static ABSOLUTE_EXTRUSION_RE: LazyLock<Regex> =
    LazyLock::new(|| build_re(&format!(r"{SOL_STR}M82\b")));
pub(super) static RELATIVE_EXTRUSION_RE: LazyLock<Regex> =
    LazyLock::new(|| build_re(&format!(r"{SOL_STR}M83\b")));

pub(super) static POSITION_RESET_RE: LazyLock<Regex> =
    LazyLock::new(|| build_re(&format!(r"{SOL_STR}G92\b")));

// G0 / G1 / G00 / G01
pub(super) static MOTION_RE: LazyLock<Regex> =
    LazyLock::new(|| build_re(&format!(r"{SOL_STR}G0*[01]\b")));

// G2 / G3 / G02 / G03
pub(super) static ARC_RE: LazyLock<Regex> =
    LazyLock::new(|| build_re(&format!(r"{SOL_STR}G0*[23]\b")));

// ===== AXIS WORDS =====

pub(super) static E_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| build_re(&format!(r"\bE({DECIMAL})")));
pub(super) static Z_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| build_re(r"\bZ([-+]?\d*\.?\d+)"));
