//! Layer tracking from explicit markers and Z rises.

use crate::parser::{Command, Marker};

use super::state::ProcessingState;

/// Minimum Z rise that counts as a new layer
const Z_EPSILON: f64 = 1e-6;

/// What the tracker did with a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerUpdate<'a> {
    /// No layer signal on this line
    Unchanged,
    /// The layer index moved (set, incremented, or left the sentinel)
    Changed,
    /// A layer signal carried a value that failed to parse
    Malformed(&'a str),
}

/// Update the current layer from one line.
///
/// Signals are checked in priority order: explicit layer index, layer-change
/// marker, then Z on a motion line. Only one fires per line. Every
/// transition ends the active feature span.
pub fn track_layer<'a>(
    state: &mut ProcessingState,
    marker: Option<&Marker<'a>>,
    command: &Command<'a>,
) -> LayerUpdate<'a> {
    match marker {
        Some(Marker::LayerIndex(token)) => {
            state.current_feature = None;
            return match token.as_i64() {
                Some(index) => {
                    state.enter_layer(index);
                    LayerUpdate::Changed
                }
                None => LayerUpdate::Malformed(token.text),
            };
        }
        Some(Marker::LayerChange) => {
            advance(state);
            return LayerUpdate::Changed;
        }
        Some(Marker::FeatureType(_)) | None => {}
    }

    let Command::Motion(motion) = command else {
        return LayerUpdate::Unchanged;
    };
    let Some(token) = motion.z else {
        return LayerUpdate::Unchanged;
    };
    let Some(z) = token.as_f64() else {
        return LayerUpdate::Malformed(token.text);
    };

    let update = match state.last_seen_z {
        None if !state.layer_started() => {
            state.enter_layer(0);
            LayerUpdate::Changed
        }
        Some(previous) if z - previous > Z_EPSILON => {
            advance(state);
            LayerUpdate::Changed
        }
        _ => LayerUpdate::Unchanged,
    };
    state.last_seen_z = Some(z);
    update
}

fn advance(state: &mut ProcessingState) {
    let next = if state.layer_started() {
        state.current_layer + 1
    } else {
        0
    };
    state.enter_layer(next);
    state.current_feature = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Feature;
    use crate::parser::{classify_command, classify_marker};

    fn track(state: &mut ProcessingState, line: &str) -> bool {
        let marker = classify_marker(line);
        let command = classify_command(line);
        track_layer(state, marker.as_ref(), &command) == LayerUpdate::Changed
    }

    #[test]
    fn test_explicit_index_sets_layer() {
        let mut state = ProcessingState::new();
        state.current_feature = Some(Feature::Infill);
        assert!(track(&mut state, ";LAYER:4"));
        assert_eq!(state.current_layer, 4);
        assert_eq!(state.current_feature, None);
    }

    #[test]
    fn test_layer_change_from_sentinel() {
        let mut state = ProcessingState::new();
        assert!(track(&mut state, ";LAYER_CHANGE"));
        assert_eq!(state.current_layer, 0);
        assert!(track(&mut state, ";BEFORE_LAYER_CHANGE"));
        assert_eq!(state.current_layer, 1);
    }

    #[test]
    fn test_first_z_seeds_layer() {
        let mut state = ProcessingState::new();
        assert!(track(&mut state, "G1 Z0.2 F3000"));
        assert_eq!(state.current_layer, 0);
        assert_eq!(state.last_seen_z, Some(0.2));
    }

    #[test]
    fn test_first_z_keeps_started_layer() {
        let mut state = ProcessingState::new();
        track(&mut state, ";LAYER:3");
        assert!(!track(&mut state, "G1 Z0.6"));
        assert_eq!(state.current_layer, 3);
    }

    #[test]
    fn test_raft_layers_are_started() {
        let mut state = ProcessingState::new();
        track(&mut state, ";LAYER:-1");
        assert!(state.layer_started());
        // Seeding Z must not pull a raft layer back to 0
        assert!(!track(&mut state, "G1 Z0.3"));
        assert_eq!(state.current_layer, -1);
        assert!(track(&mut state, ";LAYER_CHANGE"));
        assert_eq!(state.current_layer, 0);
    }

    #[test]
    fn test_z_rise_advances_layer() {
        let mut state = ProcessingState::new();
        track(&mut state, "G1 Z0.2");
        state.current_feature = Some(Feature::Support);
        assert!(track(&mut state, "G0 Z0.4"));
        assert_eq!(state.current_layer, 1);
        assert_eq!(state.current_feature, None);
    }

    #[test]
    fn test_z_drop_and_tiny_rise_are_ignored() {
        let mut state = ProcessingState::new();
        track(&mut state, "G1 Z0.4");
        assert!(!track(&mut state, "G1 Z0.2"));
        assert!(!track(&mut state, "G1 Z0.2000005"));
        assert_eq!(state.current_layer, 0);
        // last_seen_z follows every value
        assert_eq!(state.last_seen_z, Some(0.200_000_5));
        assert!(track(&mut state, "G1 Z0.3"));
        assert_eq!(state.current_layer, 1);
    }

    #[test]
    fn test_z_in_comment_is_ignored() {
        let mut state = ProcessingState::new();
        assert!(!track(&mut state, "G1 X5 ; Z10"));
        assert_eq!(state.last_seen_z, None);
    }

    #[test]
    fn test_malformed_index_clears_feature_only() {
        let mut state = ProcessingState::new();
        track(&mut state, ";LAYER:2");
        state.current_feature = Some(Feature::Bridge);
        let marker = classify_marker(";LAYER:99999999999999999999");
        let update = track_layer(&mut state, marker.as_ref(), &Command::Other);
        assert!(matches!(update, LayerUpdate::Malformed(_)));
        assert_eq!(state.current_layer, 2);
        assert_eq!(state.current_feature, None);
    }
}
