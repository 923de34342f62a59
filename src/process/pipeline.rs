//! Single forward rewriting pass
//!
//! Every line goes through the same steps, in order:
//! - Layer tracking (explicit markers, Z rises)
//! - Flow rewriting of the E word on motion lines (arcs are only shifted)
//! - Passive observation of heater, fan and extrusion-mode commands
//! - Feature transitions on `; TYPE:` markers, which may inject lines

use std::borrow::Cow;
use std::fmt;
use std::io::{BufRead, Write};

use tracing::{debug, info};

use crate::config::Config;
use crate::feature::AliasTable;
use crate::parser::{
    classify_command, classify_marker, read_document, split_lines, strip_line_ending, write_lines,
    Command, LineEnding, Marker, Motion,
};
use crate::Result;

use super::flow::rewrite_move;
use super::layer::{track_layer, LayerUpdate};
use super::overrides::on_feature_marker;
use super::state::ProcessingState;

/// Counters collected over one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub lines_in: usize,
    pub lines_out: usize,
    pub injected_lines: usize,
    pub rewritten_extrusions: usize,
    pub feature_markers: usize,
    pub unknown_markers: usize,
    pub malformed_tokens: usize,
    /// Layer index when the pass ended (`-1` if no layer signal was seen)
    pub final_layer: i64,
}

impl fmt::Display for PassSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} lines in, {} out, {} injected, {} extrusions rewritten, \
             {} feature markers ({} unknown), {} malformed values, final layer {}",
            self.lines_in,
            self.lines_out,
            self.injected_lines,
            self.rewritten_extrusions,
            self.feature_markers,
            self.unknown_markers,
            self.malformed_tokens,
            self.final_layer
        )
    }
}

/// Rewritten lines, each with its line ending, plus the pass counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassOutput {
    pub lines: Vec<String>,
    pub summary: PassSummary,
}

impl PassOutput {
    /// Concatenate the output lines back into one document
    #[must_use]
    pub fn text(&self) -> String {
        self.lines.concat()
    }
}

/// Run one pass over `lines` (each keeping its own line ending).
///
/// A fresh [`ProcessingState`] is created for the pass; `config` and
/// `aliases` are only read.
#[must_use]
pub fn rewrite_lines<S: AsRef<str>>(
    lines: &[S],
    config: &Config,
    aliases: &AliasTable,
) -> PassOutput {
    let ending = LineEnding::detect(lines).as_str();
    let mut state = ProcessingState::new();
    let mut summary = PassSummary {
        lines_in: lines.len(),
        ..PassSummary::default()
    };
    let mut output = Vec::with_capacity(lines.len());

    for (index, raw) in lines.iter().enumerate() {
        let raw = raw.as_ref();
        let line_number = index + 1;
        let (body, line_ending) = strip_line_ending(raw);
        let marker = classify_marker(body);
        let command = classify_command(body);

        if let LayerUpdate::Malformed(bad) = track_layer(&mut state, marker.as_ref(), &command) {
            debug!("Line {line_number}: unparsable layer value {bad:?}");
            summary.malformed_tokens += 1;
        }

        let mut line = Cow::Borrowed(raw);
        let extrusion = match command {
            Command::Motion(Motion { e: Some(token), .. }) => Some((token, true)),
            Command::Arc { e: Some(token) } => Some((token, false)),
            _ => None,
        };
        if let Some((token, scalable)) = extrusion {
            match token.as_f64() {
                Some(value) => {
                    let skip = config.in_skip_span(state.current_layer);
                    let factor = state
                        .current_feature
                        .filter(|_| scalable && !skip)
                        .and_then(|feature| config.flow_factor(feature));
                    if let Some(mut rewritten) = rewrite_move(
                        &mut state,
                        body,
                        &token,
                        value,
                        factor,
                        skip,
                        config.flow_decimals,
                    ) {
                        rewritten.push_str(line_ending);
                        line = Cow::Owned(rewritten);
                        summary.rewritten_extrusions += 1;
                    }
                }
                None => {
                    debug!("Line {line_number}: unparsable extrusion value {:?}", token.text);
                    summary.malformed_tokens += 1;
                }
            }
        }

        if let Some(bad) = state.observe(&command) {
            debug!("Line {line_number}: unparsable value {bad:?}");
            summary.malformed_tokens += 1;
        }

        if let Some(Marker::FeatureType(text)) = marker {
            summary.feature_markers += 1;
            let transition = on_feature_marker(&mut state, config, aliases, text);
            if transition.feature.is_none() {
                summary.unknown_markers += 1;
            }
            if !transition.injected.is_empty() {
                summary.injected_lines += transition.injected.len();
                push_with_injections(&mut output, body, line_ending, ending, transition.injected);
                continue;
            }
        }

        output.push(line.into_owned());
    }

    summary.lines_out = output.len();
    summary.final_layer = state.current_layer;
    PassOutput {
        lines: output,
        summary,
    }
}

/// Emit a marker followed by its injected lines.
///
/// A marker without a line ending (last line of the document) gets the
/// document's ending, and the final injected line is left unterminated in
/// its place.
fn push_with_injections(
    output: &mut Vec<String>,
    marker_body: &str,
    marker_ending: &str,
    ending: &str,
    injected: Vec<String>,
) {
    let marker_terminated = !marker_ending.is_empty();
    output.push(format!(
        "{marker_body}{}",
        if marker_terminated {
            marker_ending
        } else {
            ending
        }
    ));
    let count = injected.len();
    for (i, mut line) in injected.into_iter().enumerate() {
        if marker_terminated || i + 1 < count {
            line.push_str(ending);
        }
        output.push(line);
    }
}

/// Run one pass over a whole document
#[must_use]
pub fn process_document(text: &str, config: &Config, aliases: &AliasTable) -> PassOutput {
    rewrite_lines(&split_lines(text), config, aliases)
}

/// Read a document, rewrite it, and write the result.
///
/// Nothing is written until the whole pass has completed.
pub fn process_file<R: BufRead, W: Write>(
    input: R,
    output: &mut W,
    config: &Config,
    aliases: &AliasTable,
    filename: &str,
) -> Result<PassSummary> {
    let document = read_document(input)?;
    let pass = process_document(&document, config, aliases);
    write_lines(output, &pass.lines)?;
    info!("{filename}: {}", pass.summary);
    Ok(pass.summary)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::FeatureOverride;
    use crate::feature::Feature;

    fn run(text: &str, config: &Config) -> PassOutput {
        process_document(text, config, &AliasTable::builtin())
    }

    fn bridge_infill_config() -> Config {
        let mut config = Config::default();
        config.features.insert(
            Feature::Bridge,
            FeatureOverride {
                temperature: Some(200.0),
                ..Default::default()
            },
        );
        config.features.insert(
            Feature::Infill,
            FeatureOverride {
                flow: Some(1.1),
                ..Default::default()
            },
        );
        config
    }

    #[test]
    fn test_empty_document() {
        let pass = run("", &Config::default());
        assert!(pass.lines.is_empty());
        assert_eq!(pass.summary.final_layer, -1);
    }

    #[test]
    fn test_untouched_document_round_trips() {
        let text = "; generated\r\nM104 S210\r\n\r\nG1 Z0.2\r\n;TYPE:Skirt\r\nG1 X5 E1";
        let pass = run(text, &bridge_infill_config());
        assert_eq!(pass.text(), text);
        assert_eq!(pass.summary.unknown_markers, 1);
        assert_eq!(pass.summary.lines_in, pass.summary.lines_out);
    }

    #[test]
    fn test_infill_flow_sample() {
        let pass = run("; TYPE: infill\nG1 X10 E5\n", &bridge_infill_config());
        assert_eq!(pass.text(), "; TYPE: infill\nG1 X10 E5.5\n");
        assert_eq!(pass.summary.rewritten_extrusions, 1);
    }

    #[test]
    fn test_bridge_then_infill_restores_temperature() {
        let text = "M104 S215\n; TYPE: Bridge infill\nG1 X1 E1\n; TYPE: infill\nG1 X2 E2\n";
        let pass = run(text, &bridge_infill_config());
        assert_eq!(
            pass.text(),
            "M104 S215\n\
             ; TYPE: Bridge infill\n\
             M104 S200 ; set temp (bridge)\n\
             G1 X1 E1\n\
             ; TYPE: infill\n\
             M104 S215 ; set temp (restore baseline at feature boundary)\n\
             G1 X2 E2.1\n"
        );
        assert_eq!(pass.summary.injected_lines, 2);
    }

    #[test]
    fn test_layer_change_ends_flow_span() {
        let text = "; TYPE: infill\nG1 X1 E1\n;LAYER_CHANGE\nG1 X2 E2\n";
        let pass = run(text, &bridge_infill_config());
        // Second move keeps its delta of 1 but follows the 0.1 shift
        assert_eq!(
            pass.text(),
            "; TYPE: infill\nG1 X1 E1.1\n;LAYER_CHANGE\nG1 X2 E2.1\n"
        );
        assert_eq!(pass.summary.final_layer, 1);
    }

    #[test]
    fn test_crlf_injection_and_unterminated_marker() {
        let text = "M104 S215\r\n; TYPE: bridge";
        let pass = run(text, &bridge_infill_config());
        assert_eq!(
            pass.lines,
            vec![
                "M104 S215\r\n",
                "; TYPE: bridge\r\n",
                "M104 S200 ; set temp (bridge)",
            ]
        );
    }

    #[test]
    fn test_skip_first_layers() {
        let mut config = bridge_infill_config();
        config.skip_first_layers = 1;
        let text = ";LAYER:0\n; TYPE: bridge\n; TYPE: infill\nG1 X1 E1\n\
                    ;LAYER:1\n; TYPE: infill\nG1 X1 E2\n";
        let pass = run(text, &config);
        assert_eq!(
            pass.text(),
            ";LAYER:0\n; TYPE: bridge\n; TYPE: infill\nG1 X1 E1\n\
             ;LAYER:1\n; TYPE: infill\nG1 X1 E2.1\n"
        );
    }

    #[test]
    fn test_raft_layers_stay_negative() {
        let mut config = bridge_infill_config();
        config.skip_first_layers = 1;
        let text = ";LAYER:-2\n; TYPE: bridge\n;LAYER:-1\n; TYPE: bridge\nG1 Z0.5\n";
        let pass = run(text, &config);
        assert_eq!(pass.text(), text);
        assert_eq!(pass.summary.final_layer, -1);
    }

    #[test]
    fn test_relative_mode_scaling() {
        let text = "M83\n; TYPE: infill\nG1 X1 E0.5\nG1 E-0.8\nG1 X2 E0.25 ; tail\n";
        let pass = run(text, &bridge_infill_config());
        assert_eq!(
            pass.text(),
            "M83\n; TYPE: infill\nG1 X1 E0.55\nG1 E-0.8\nG1 X2 E0.275 ; tail\n"
        );
    }

    #[test]
    fn test_arc_moves_follow_the_shift() {
        let text = "M82\nG92 E0\n; TYPE: infill\nG1 X1 E1\nG2 X2 Y2 I1 J0 E2\nG1 X3 E3\n";
        let pass = run(text, &bridge_infill_config());
        // The arc keeps its delta of 1; the next line scales only its own delta
        assert_eq!(
            pass.text(),
            "M82\nG92 E0\n; TYPE: infill\nG1 X1 E1.1\nG2 X2 Y2 I1 J0 E2.1\nG1 X3 E3.2\n"
        );
        assert_eq!(pass.summary.rewritten_extrusions, 3);

        let relative = "M83\n; TYPE: infill\nG3 X1 Y1 I1 J0 E0.5\n";
        assert_eq!(run(relative, &bridge_infill_config()).text(), relative);
    }

    #[test]
    fn test_malformed_tokens_are_counted_and_kept() {
        let text = "M104 S\u{0662}00\n; TYPE: infill\nG1 X1 E\u{0665}\n";
        let pass = run(text, &bridge_infill_config());
        assert_eq!(pass.text(), text);
        assert_eq!(pass.summary.malformed_tokens, 2);
    }

    #[test]
    fn test_process_file() {
        let mut output = Vec::new();
        let summary = process_file(
            Cursor::new("; TYPE: infill\nG1 X10 E5\n"),
            &mut output,
            &bridge_infill_config(),
            &AliasTable::builtin(),
            "test.gcode",
        )
        .unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "; TYPE: infill\nG1 X10 E5.5\n");
        assert_eq!(summary.feature_markers, 1);
        assert_eq!(summary.final_layer, 0);
    }
}
