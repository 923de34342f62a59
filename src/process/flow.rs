//! Flow rewriting: rescale positive extrusion while keeping the absolute
//! extrusion position consistent for every later move.
//!
//! Positions are tracked in input space. Scaling a move shifts every later
//! absolute value by the extra filament it added, so the offset between
//! output and input is carried in [`ProcessingState::extrusion_offset`].

use crate::parser::Token;

use super::state::ProcessingState;

/// Offsets smaller than this are treated as no shift at all
const OFFSET_EPSILON: f64 = 1e-12;

/// Account for one extrusion value and compute its replacement.
///
/// `factor` is the flow factor of the active feature, already `None` when
/// scaling is not in effect. `skip` marks the untouched leading layers.
/// Returns the value to write in place of `value`, or `None` to leave the
/// line as it is.
pub fn rewrite_extrusion(
    state: &mut ProcessingState,
    value: f64,
    factor: Option<f64>,
    skip: bool,
) -> Option<f64> {
    if state.extrusion_mode_relative {
        let scaled = factor
            .filter(|_| value > 0.0 && !skip)
            .map(|f| value * f);
        state.last_absolute_extrusion += value;
        state.extrusion_offset += scaled.unwrap_or(value) - value;
        return scaled;
    }

    if skip {
        state.last_absolute_extrusion = value;
        state.extrusion_offset = 0.0;
        return None;
    }

    let delta = value - state.last_absolute_extrusion;
    if let Some(f) = factor {
        if delta > 0.0 {
            state.extrusion_offset += delta * (f - 1.0);
        }
    }
    state.last_absolute_extrusion = value;

    if state.extrusion_offset.abs() < OFFSET_EPSILON {
        None
    } else {
        Some(value + state.extrusion_offset)
    }
}

/// Account for the E word of a move and splice its replacement into `line`.
///
/// Returns `None` when the line keeps its original text.
pub fn rewrite_move(
    state: &mut ProcessingState,
    line: &str,
    token: &Token<'_>,
    value: f64,
    factor: Option<f64>,
    skip: bool,
    decimals: usize,
) -> Option<String> {
    let new_value = rewrite_extrusion(state, value, factor, skip)?;
    let text = format_extrusion(new_value, decimals);
    (text != token.text).then(|| splice_token(line, token, &text))
}

/// Format an extrusion value with at most `decimals` fractional digits,
/// without trailing zeros or a trailing point.
#[must_use]
pub fn format_extrusion(value: f64, decimals: usize) -> String {
    let text = format!("{value:.decimals$}");
    let trimmed = if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text.as_str()
    };
    match trimmed {
        "" | "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

/// Replace the token's span in `line` with `replacement`
#[must_use]
pub fn splice_token(line: &str, token: &Token<'_>, replacement: &str) -> String {
    let mut out = String::with_capacity(line.len() + replacement.len());
    out.push_str(&line[..token.start]);
    out.push_str(replacement);
    out.push_str(&line[token.end..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{classify_command, Command};

    fn absolute_state() -> ProcessingState {
        ProcessingState::new()
    }

    fn relative_state() -> ProcessingState {
        ProcessingState {
            extrusion_mode_relative: true,
            ..ProcessingState::new()
        }
    }

    #[test]
    fn test_format_extrusion() {
        assert_eq!(format_extrusion(5.5, 5), "5.5");
        assert_eq!(format_extrusion(5.0, 5), "5");
        assert_eq!(format_extrusion(0.123_456_7, 5), "0.12346");
        assert_eq!(format_extrusion(-0.000_001, 5), "0");
        assert_eq!(format_extrusion(0.0, 5), "0");
        assert_eq!(format_extrusion(10.0, 0), "10");
        assert_eq!(format_extrusion(-2.5, 1), "-2.5");
    }

    #[test]
    fn test_absolute_first_scaled_move() {
        let mut state = absolute_state();
        let out = rewrite_extrusion(&mut state, 5.0, Some(1.1), false).unwrap();
        assert_eq!(format_extrusion(out, 5), "5.5");
        assert_eq!(state.last_absolute_extrusion, 5.0);
    }

    #[test]
    fn test_absolute_consecutive_moves_scale_true_deltas() {
        let mut state = absolute_state();
        let outputs: Vec<String> = [1.0, 2.0, 3.0]
            .iter()
            .filter_map(|&v| rewrite_extrusion(&mut state, v, Some(2.0), false))
            .map(|v| format_extrusion(v, 5))
            .collect();
        assert_eq!(outputs, vec!["2", "4", "6"]);
    }

    #[test]
    fn test_absolute_retraction_keeps_delta() {
        let mut state = absolute_state();
        rewrite_extrusion(&mut state, 10.0, Some(1.5), false);
        // Retract by 1: output shifts with the accumulated offset
        let out = rewrite_extrusion(&mut state, 9.0, Some(1.5), false).unwrap();
        assert_eq!(format_extrusion(out, 5), "14");
    }

    #[test]
    fn test_absolute_unscaled_moves_follow_offset() {
        let mut state = absolute_state();
        rewrite_extrusion(&mut state, 4.0, Some(1.25), false);
        // Feature without flow: original delta of 2 is kept
        let out = rewrite_extrusion(&mut state, 6.0, None, false).unwrap();
        assert_eq!(format_extrusion(out, 5), "7");
    }

    #[test]
    fn test_absolute_without_offset_is_untouched() {
        let mut state = absolute_state();
        assert_eq!(rewrite_extrusion(&mut state, 3.0, None, false), None);
        assert_eq!(state.last_absolute_extrusion, 3.0);
    }

    #[test]
    fn test_absolute_skip_clears_offset() {
        let mut state = absolute_state();
        rewrite_extrusion(&mut state, 4.0, Some(1.5), false);
        assert_eq!(rewrite_extrusion(&mut state, 5.0, None, true), None);
        assert_eq!(state.extrusion_offset, 0.0);
        assert_eq!(state.last_absolute_extrusion, 5.0);
    }

    #[test]
    fn test_relative_scales_positive_only() {
        let mut state = relative_state();
        assert_eq!(rewrite_extrusion(&mut state, 0.5, Some(1.2), false), Some(0.6));
        assert_eq!(rewrite_extrusion(&mut state, -0.8, Some(1.2), false), None);
        assert_eq!(rewrite_extrusion(&mut state, 0.5, None, false), None);
        assert_eq!(rewrite_extrusion(&mut state, 0.5, Some(1.2), true), None);
    }

    #[test]
    fn test_relative_moves_advance_position() {
        let mut state = relative_state();
        rewrite_extrusion(&mut state, 1.0, Some(2.0), false);
        rewrite_extrusion(&mut state, 1.0, None, false);
        assert_eq!(state.last_absolute_extrusion, 2.0);
        assert_eq!(state.extrusion_offset, 1.0);
    }

    #[test]
    fn test_splice_token_keeps_comment() {
        let line = "G1 X10 E5 ; extrude";
        let Command::Motion(motion) = classify_command(line) else {
            panic!("expected motion");
        };
        let e = motion.e.unwrap();
        assert_eq!(splice_token(line, &e, "5.5"), "G1 X10 E5.5 ; extrude");
    }
}
