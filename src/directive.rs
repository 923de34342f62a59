//! Inline directive parsing for `; featurecode:` comments
//!
//! Supports per-document overrides of the global options via a special comment:
//! `; featurecode: --wait-temp --skip-first-layers 2`

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::config::Config;

/// Pattern to match featurecode directives
static FEATURECODE_DIRECTIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*;\s*featurecode:\s*(.*?)\s*$").unwrap());

/// Parsed directive options that can override config
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DirectiveOverrides {
    pub wait_temp: Option<bool>,
    pub skip_first_layers: Option<u32>,
    pub flow_decimals: Option<usize>,
}

impl DirectiveOverrides {
    /// Check if any overrides are set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.wait_temp.is_none() && self.skip_first_layers.is_none() && self.flow_decimals.is_none()
    }

    /// Apply the overrides on top of `config`
    pub fn apply(&self, config: &mut Config) {
        if let Some(v) = self.wait_temp {
            debug!("Directive override: wait_temp = {v}");
            config.wait_temp = v;
        }
        if let Some(v) = self.skip_first_layers {
            debug!("Directive override: skip_first_layers = {v}");
            config.skip_first_layers = v;
        }
        if let Some(v) = self.flow_decimals {
            debug!("Directive override: flow_decimals = {v}");
            config.flow_decimals = v;
        }
    }
}

/// Check if a line contains a featurecode directive
#[must_use]
pub fn is_directive_line(line: &str) -> bool {
    FEATURECODE_DIRECTIVE_RE.is_match(line)
}

/// Parse a featurecode directive line and return option overrides
///
/// # Returns
/// * `Some(DirectiveOverrides)` if the line is a directive with at least one known option
/// * `None` otherwise
#[must_use]
pub fn parse_directive(line: &str) -> Option<DirectiveOverrides> {
    let caps = FEATURECODE_DIRECTIVE_RE.captures(line.trim_end_matches(['\r', '\n']))?;
    let args_str = caps.get(1)?.as_str();

    // Parse the arguments like CLI args
    parse_directive_args(args_str)
}

/// Parse directive arguments into overrides
fn parse_directive_args(args_str: &str) -> Option<DirectiveOverrides> {
    let mut overrides = DirectiveOverrides::default();
    let mut tokens = args_str.split_whitespace();

    while let Some(token) = tokens.next() {
        match token {
            "--wait-temp" => overrides.wait_temp = Some(true),
            "--no-wait-temp" => overrides.wait_temp = Some(false),
            "--skip-first-layers" => {
                overrides.skip_first_layers = tokens.next().and_then(|v| v.parse().ok());
            }
            "--flow-decimals" => {
                overrides.flow_decimals = tokens.next().and_then(|v| v.parse().ok());
            }
            _ => {
                // Unknown option, skip
            }
        }
    }

    if overrides.is_empty() {
        None
    } else {
        Some(overrides)
    }
}

/// Scan input for featurecode directives and return the first found
///
/// Only the first directive line is used (subsequent ones are ignored).
pub fn find_directive<R: std::io::BufRead>(input: &mut R) -> Option<DirectiveOverrides> {
    let mut buffer = String::new();

    while input.read_line(&mut buffer).ok()? > 0 {
        if is_directive_line(buffer.trim_end_matches(['\r', '\n'])) {
            return parse_directive(&buffer);
        }
        buffer.clear();
    }

    None
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_is_directive_line() {
        assert!(is_directive_line("; featurecode: --wait-temp"));
        assert!(is_directive_line("  ;featurecode: --skip-first-layers 1"));
        assert!(is_directive_line("; FEATURECODE: --flow-decimals 3"));
        assert!(!is_directive_line("; generated by PrusaSlicer"));
        assert!(!is_directive_line("G1 X1"));
    }

    #[test]
    fn test_parse_directive_options() {
        let overrides =
            parse_directive("; featurecode: --wait-temp --skip-first-layers 2 --flow-decimals 3")
                .unwrap();
        assert_eq!(overrides.wait_temp, Some(true));
        assert_eq!(overrides.skip_first_layers, Some(2));
        assert_eq!(overrides.flow_decimals, Some(3));
    }

    #[test]
    fn test_parse_directive_no_wait() {
        let overrides = parse_directive("; featurecode: --no-wait-temp").unwrap();
        assert_eq!(overrides.wait_temp, Some(false));
    }

    #[test]
    fn test_parse_invalid_directive() {
        assert!(parse_directive("; featurecode:").is_none());
        assert!(parse_directive("; featurecode: --skip-first-layers many").is_none());
        assert!(parse_directive("; featurecode: --bridge 200").is_none());
    }

    #[test]
    fn test_find_first_directive() {
        let text = "; header\r\n; featurecode: --skip-first-layers 1\r\n\
                    ; featurecode: --skip-first-layers 5\r\n";
        let overrides = find_directive(&mut Cursor::new(text)).unwrap();
        assert_eq!(overrides.skip_first_layers, Some(1));
        assert!(find_directive(&mut Cursor::new("G1 X1\n")).is_none());
    }

    #[test]
    fn test_apply_directive() {
        let mut config = Config {
            skip_first_layers: 3,
            ..Default::default()
        };
        DirectiveOverrides {
            wait_temp: Some(true),
            ..Default::default()
        }
        .apply(&mut config);
        assert!(config.wait_temp);
        assert_eq!(config.skip_first_layers, 3);
    }
}
