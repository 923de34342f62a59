//! Feature-boundary transitions.
//!
//! On every `; TYPE:` marker the engine leaves the previous feature (exit
//! commands, baseline restores) and enters the new one (enter commands,
//! temperature and fan overrides). Injected lines are fed back through the
//! classifier so the tracked state matches what the printer will see.

use tracing::debug;

use crate::config::Config;
use crate::feature::{AliasTable, Feature};
use crate::parser::{classify_command, Command, Motion};

use super::flow::rewrite_move;
use super::state::ProcessingState;

/// Reason attached to restores of a baseline value
const RESTORE_REASON: &str = "restore baseline at feature boundary";

/// Outcome of one feature marker
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transition {
    /// Canonical feature of the marker, `None` when unrecognized
    pub feature: Option<Feature>,
    /// Lines to emit right after the marker, without line endings
    pub injected: Vec<String>,
}

/// Collects injected lines and applies each one to the tracked state
struct Injector<'s> {
    state: &'s mut ProcessingState,
    flow_decimals: usize,
    lines: Vec<String>,
}

impl<'s> Injector<'s> {
    fn new(state: &'s mut ProcessingState, flow_decimals: usize) -> Self {
        Self {
            state,
            flow_decimals,
            lines: Vec::new(),
        }
    }

    /// Moves are shifted like input moves but never rescaled
    fn push(&mut self, line: String) {
        let mut shifted = None;
        match classify_command(&line) {
            Command::Motion(Motion { e: Some(token), .. }) | Command::Arc { e: Some(token) } => {
                match token.as_f64() {
                    Some(value) => {
                        shifted = rewrite_move(
                            self.state,
                            &line,
                            &token,
                            value,
                            None,
                            false,
                            self.flow_decimals,
                        );
                    }
                    None => debug!(
                        "Injected line {line:?} has unparsable value {:?}",
                        token.text
                    ),
                }
            }
            command => {
                if let Some(bad) = self.state.observe(&command) {
                    debug!("Injected line {line:?} has unparsable value {bad:?}");
                }
            }
        }
        self.lines.push(shifted.unwrap_or(line));
    }

    /// Custom commands, one physical line each, tagged with a comment
    fn push_custom(&mut self, commands: &[String], tag: &str, feature: Feature) {
        for command in commands.iter().flat_map(|c| c.lines()) {
            let command = command.trim();
            if !command.is_empty() {
                self.push(format!("{command} ; {tag} {feature}"));
            }
        }
    }

    fn push_temperature(&mut self, config: &Config, target: f64, reason: &str) {
        self.push(format!(
            "{} S{target} ; set temp ({reason})",
            config.temperature_command()
        ));
    }

    fn push_fan(&mut self, duty: u8, reason: &str) {
        self.push(format!("M106 S{duty} ; set fan ({reason})"));
    }
}

/// Handle a feature marker carrying `text`.
///
/// Unrecognized text and markers inside the skipped leading layers only
/// update the feature bookkeeping; nothing is injected for them.
pub fn on_feature_marker(
    state: &mut ProcessingState,
    config: &Config,
    aliases: &AliasTable,
    text: &str,
) -> Transition {
    if !state.layer_started() {
        state.enter_layer(0);
    }

    let feature = aliases.canonicalize(text);
    let mut injected = Vec::new();

    match feature {
        Some(feature) if config.in_skip_span(state.current_layer) => {
            debug!(
                "Layer {}: {feature} inside skipped layers, no overrides",
                state.current_layer
            );
        }
        Some(feature) => {
            debug!(
                "Layer {}: {} -> {feature}",
                state.current_layer,
                state
                    .previous_feature
                    .map_or("(none)", Feature::as_str)
            );
            injected = enter_feature(state, config, feature);
        }
        None => debug!("Unknown feature marker {text:?}"),
    }

    state.previous_feature = feature;
    state.current_feature = feature;
    Transition { feature, injected }
}

/// Leave the previous feature and apply the overrides of `feature`
fn enter_feature(state: &mut ProcessingState, config: &Config, feature: Feature) -> Vec<String> {
    let previous = state.previous_feature;
    let next = config.feature(feature);
    let next_temperature = next.and_then(|o| o.temperature);
    let next_fan = next.and_then(|o| o.fan_duty());

    let mut inject = Injector::new(state, config.flow_decimals);

    if let Some(prev) = previous {
        if let Some(over) = config.feature(prev) {
            inject.push_custom(&over.gcode_exit, "exit", prev);
        }
    }

    if inject.state.override_active_temp && next_temperature.is_none() {
        if let Some(baseline) = inject.state.baseline_temperature {
            inject.push_temperature(config, baseline, RESTORE_REASON);
        }
    }
    if inject.state.override_active_fan && next_fan.is_none() {
        if let Some(baseline) = inject.state.baseline_fan_duty {
            inject.push_fan(baseline, RESTORE_REASON);
        }
    }

    inject.state.baseline_temperature = inject.state.current_temperature;
    inject.state.baseline_fan_duty = inject.state.current_fan_duty;

    if let Some(over) = next {
        inject.push_custom(&over.gcode_enter, "enter", feature);
    }

    if let Some(target) = next_temperature {
        inject.push_temperature(config, target, feature.as_str());
    }
    inject.state.override_active_temp = next_temperature.is_some();

    if let Some(duty) = next_fan {
        inject.push_fan(duty, feature.as_str());
    }
    inject.state.override_active_fan = next_fan.is_some();

    inject.lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureOverride;

    fn config_with(feature: Feature, over: FeatureOverride) -> Config {
        let mut config = Config::default();
        config.features.insert(feature, over);
        config
    }

    fn marker(state: &mut ProcessingState, config: &Config, text: &str) -> Vec<String> {
        on_feature_marker(state, config, &AliasTable::builtin(), text).injected
    }

    #[test]
    fn test_sentinel_layer_normalized() {
        let mut state = ProcessingState::new();
        marker(&mut state, &Config::default(), "Skirt");
        assert_eq!(state.current_layer, 0);
    }

    #[test]
    fn test_raft_layer_not_normalized() {
        let mut state = ProcessingState::new();
        state.enter_layer(-1);
        marker(&mut state, &Config::default(), "Support");
        assert_eq!(state.current_layer, -1);
    }

    #[test]
    fn test_temperature_override_and_restore() {
        let config = config_with(
            Feature::Bridge,
            FeatureOverride {
                temperature: Some(200.0),
                ..Default::default()
            },
        );
        let mut state = ProcessingState::new();
        state.current_temperature = Some(215.0);

        let lines = marker(&mut state, &config, "Bridge infill");
        assert_eq!(lines, vec!["M104 S200 ; set temp (bridge)"]);
        assert_eq!(state.current_temperature, Some(200.0));
        assert_eq!(state.baseline_temperature, Some(215.0));
        assert!(state.override_active_temp);

        let lines = marker(&mut state, &config, "Internal infill");
        assert_eq!(
            lines,
            vec!["M104 S215 ; set temp (restore baseline at feature boundary)"]
        );
        assert_eq!(state.current_temperature, Some(215.0));
        assert!(!state.override_active_temp);
    }

    #[test]
    fn test_wait_variant_and_fractional_temperature() {
        let mut config = config_with(
            Feature::TopSurface,
            FeatureOverride {
                temperature: Some(207.5),
                ..Default::default()
            },
        );
        config.wait_temp = true;
        let mut state = ProcessingState::new();
        let lines = marker(&mut state, &config, "Top solid infill");
        assert_eq!(lines, vec!["M109 S207.5 ; set temp (top_surface)"]);
    }

    #[test]
    fn test_no_restore_without_baseline() {
        let config = config_with(
            Feature::Bridge,
            FeatureOverride {
                fan: Some(100.0),
                ..Default::default()
            },
        );
        let mut state = ProcessingState::new();
        assert_eq!(
            marker(&mut state, &config, "bridge"),
            vec!["M106 S255 ; set fan (bridge)"]
        );
        // No fan value was known before the bridge
        assert!(marker(&mut state, &config, "infill").is_empty());
        assert!(!state.override_active_fan);
    }

    #[test]
    fn test_override_to_override_skips_restore() {
        let mut config = Config::default();
        config.feature_mut(Feature::Bridge).fan = Some(100.0);
        config.feature_mut(Feature::OverhangPerimeter).fan = Some(80.0);
        let mut state = ProcessingState::new();
        state.current_fan_duty = Some(64);

        marker(&mut state, &config, "bridge");
        let lines = marker(&mut state, &config, "Overhang perimeter");
        // New override replaces the old one without a restore
        assert_eq!(lines, vec!["M106 S204 ; set fan (overhang_perimeter)"]);
        assert_eq!(state.baseline_fan_duty, Some(255));
    }

    #[test]
    fn test_custom_gcode_order() {
        let mut config = Config::default();
        {
            let bridge = config.feature_mut(Feature::Bridge);
            bridge.gcode_enter = vec!["M204 S500".to_string()];
            bridge.gcode_exit = vec!["M204 S1000".to_string(), "  ".to_string()];
            bridge.temperature = Some(200.0);
        }
        config.feature_mut(Feature::Infill).gcode_enter =
            vec!["M221 S95\nM117 infill".to_string()];
        let mut state = ProcessingState::new();
        state.current_temperature = Some(210.0);

        assert_eq!(
            marker(&mut state, &config, "bridge"),
            vec!["M204 S500 ; enter bridge", "M104 S200 ; set temp (bridge)"]
        );
        assert_eq!(
            marker(&mut state, &config, "infill"),
            vec![
                "M204 S1000 ; exit bridge",
                "M104 S210 ; set temp (restore baseline at feature boundary)",
                "M221 S95 ; enter infill",
                "M117 infill ; enter infill",
            ]
        );
    }

    #[test]
    fn test_unknown_marker_clears_previous_feature() {
        let config = config_with(
            Feature::Support,
            FeatureOverride {
                gcode_exit: vec!["M400".to_string()],
                ..Default::default()
            },
        );
        let mut state = ProcessingState::new();
        marker(&mut state, &config, "support");
        assert_eq!(state.previous_feature, Some(Feature::Support));

        let transition = on_feature_marker(&mut state, &config, &AliasTable::builtin(), "Skirt");
        assert_eq!(transition, Transition::default());
        assert_eq!(state.previous_feature, None);
        assert_eq!(state.current_feature, None);
        // The support exit commands were dropped with it
        assert!(marker(&mut state, &config, "infill").is_empty());
    }

    #[test]
    fn test_skip_span_updates_bookkeeping_only() {
        let mut config = config_with(
            Feature::Bridge,
            FeatureOverride {
                temperature: Some(190.0),
                ..Default::default()
            },
        );
        config.skip_first_layers = 1;
        let mut state = ProcessingState::new();
        assert!(marker(&mut state, &config, "bridge").is_empty());
        assert_eq!(state.current_feature, Some(Feature::Bridge));
        assert!(!state.override_active_temp);

        state.current_layer = 1;
        assert_eq!(
            marker(&mut state, &config, "bridge"),
            vec!["M104 S190 ; set temp (bridge)"]
        );
    }

    #[test]
    fn test_injected_custom_gcode_updates_state() {
        let config = config_with(
            Feature::Support,
            FeatureOverride {
                gcode_enter: vec!["M83".to_string(), "M106 S30".to_string()],
                ..Default::default()
            },
        );
        let mut state = ProcessingState::new();
        marker(&mut state, &config, "support material");
        assert!(state.extrusion_mode_relative);
        assert_eq!(state.current_fan_duty, Some(30));
    }

    #[test]
    fn test_injected_move_follows_the_shift() {
        let config = config_with(
            Feature::Support,
            FeatureOverride {
                gcode_enter: vec!["G1 E12 F300".to_string()],
                ..Default::default()
            },
        );
        let mut state = ProcessingState {
            last_absolute_extrusion: 10.0,
            extrusion_offset: 0.5,
            ..ProcessingState::new()
        };
        assert_eq!(
            marker(&mut state, &config, "support"),
            vec!["G1 E12.5 F300 ; enter support"]
        );
        assert_eq!(state.last_absolute_extrusion, 12.0);
        assert_eq!(state.extrusion_offset, 0.5);
    }
}
