//! Line classification.
//!
//! Recognizes the structured comment markers slicers emit (feature type,
//! layer index, layer change) and the handful of commands whose effect on
//! printer state the rewriter needs to follow. Everything is a pure function
//! of the line text; no state is kept here.

use regex::Captures;

use super::patterns::{
    ABSOLUTE_EXTRUSION_RE, ARC_RE, E_WORD_RE, FAN_OFF_RE, FAN_ON_RE, LAYER_CHANGE_RE,
    LAYER_INDEX_RE, LAYER_WORD_RE, MOTION_RE, POSITION_RESET_RE, RELATIVE_EXTRUSION_RE,
    TEMPERATURE_RE, TYPE_MARKER_RE, Z_WORD_RE,
};

/// A numeric token inside a line, with its byte span
///
/// Parsing is deferred so a token that fails to parse can still be reported
/// (and left untouched) by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

impl<'a> Token<'a> {
    fn from_group(caps: &Captures<'a>, group: usize) -> Option<Self> {
        caps.get(group).map(|m| Token {
            text: m.as_str(),
            start: m.start(),
            end: m.end(),
        })
    }

    /// Token value as a float; `None` when it does not parse
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        self.text.parse::<f64>().ok().filter(|v| v.is_finite())
    }

    /// Token value as an 8-bit duty, clamping values above 255
    #[must_use]
    pub fn as_duty(&self) -> Option<u8> {
        self.text
            .parse::<u32>()
            .ok()
            .map(|v| u8::try_from(v.min(255)).unwrap_or(u8::MAX))
    }

    /// Token value as a signed integer
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        self.text.parse::<i64>().ok()
    }
}

/// Structured comment markers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker<'a> {
    /// `; TYPE: <text>` with the raw text after the colon
    FeatureType(&'a str),
    /// `;LAYER:<n>` or `; layer <n>`
    LayerIndex(Token<'a>),
    /// `;LAYER_CHANGE` or `;BEFORE_LAYER_CHANGE`
    LayerChange,
}

/// A linear move and the axis words the rewriter cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Motion<'a> {
    pub z: Option<Token<'a>>,
    pub e: Option<Token<'a>>,
}

/// Commands that affect tracked printer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Motion(Motion<'a>),
    /// `G2` / `G3`; its E word moves the extruder but is never rescaled
    Arc { e: Option<Token<'a>> },
    /// `M104` (no wait) or `M109` (wait)
    SetTemperature { target: Token<'a>, wait: bool },
    /// `M106 S<duty>`
    FanOn { duty: Token<'a> },
    /// `M107`
    FanOff,
    /// `M82`
    AbsoluteExtrusion,
    /// `M83`
    RelativeExtrusion,
    /// `G92`, with its E word when present
    ResetPosition { e: Option<Token<'a>> },
    Other,
}

/// Split a line into its code part and its comment (starting at `;`).
///
/// The comment starts at the first `;` not escaped with a backslash. The
/// comment part is empty when the line has none.
#[must_use]
pub fn split_comment(line: &str) -> (&str, &str) {
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b';' && (i == 0 || bytes[i - 1] != b'\\') {
            return line.split_at(i);
        }
    }
    (line, "")
}

/// Recognize a structured comment marker.
///
/// `line` must not include its line ending. Layer markers take priority over
/// feature markers.
#[must_use]
pub fn classify_marker(line: &str) -> Option<Marker<'_>> {
    if let Some(caps) = LAYER_INDEX_RE
        .captures(line)
        .or_else(|| LAYER_WORD_RE.captures(line))
    {
        return Token::from_group(&caps, 1).map(Marker::LayerIndex);
    }
    if LAYER_CHANGE_RE.is_match(line) {
        return Some(Marker::LayerChange);
    }
    TYPE_MARKER_RE
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| Marker::FeatureType(m.as_str()))
}

/// Classify the command on a line, ignoring any trailing comment.
///
/// Token spans index into `line` itself.
#[must_use]
pub fn classify_command(line: &str) -> Command<'_> {
    let (code, _) = split_comment(line);

    if MOTION_RE.is_match(code) {
        return Command::Motion(Motion {
            z: Z_WORD_RE
                .captures(code)
                .and_then(|caps| Token::from_group(&caps, 1)),
            e: extrusion_word(code),
        });
    }
    if ARC_RE.is_match(code) {
        return Command::Arc {
            e: extrusion_word(code),
        };
    }
    if ABSOLUTE_EXTRUSION_RE.is_match(code) {
        return Command::AbsoluteExtrusion;
    }
    if RELATIVE_EXTRUSION_RE.is_match(code) {
        return Command::RelativeExtrusion;
    }
    if POSITION_RESET_RE.is_match(code) {
        return Command::ResetPosition {
            e: extrusion_word(code),
        };
    }
    if let Some(caps) = TEMPERATURE_RE.captures(code) {
        if let Some(target) = Token::from_group(&caps, 2) {
            return Command::SetTemperature {
                target,
                wait: &caps[1] == "9",
            };
        }
    }
    if FAN_OFF_RE.is_match(code) {
        return Command::FanOff;
    }
    if let Some(duty) = FAN_ON_RE
        .captures(code)
        .and_then(|caps| Token::from_group(&caps, 1))
    {
        return Command::FanOn { duty };
    }
    Command::Other
}

/// First E word in the code part of a line
fn extrusion_word(code: &str) -> Option<Token<'_>> {
    E_WORD_RE
        .captures(code)
        .and_then(|caps| Token::from_group(&caps, 1))
}
