//! Mutable state carried across one rewriting pass.

use tracing::debug;

use crate::feature::Feature;
use crate::parser::Command;

/// Layer value before any layer signal has been seen
pub const LAYER_SENTINEL: i64 = -1;

/// Everything the engine remembers between lines
///
/// One instance lives for exactly one pass and is owned by the pass driver;
/// the layer tracker, flow rewriter and override state machine all receive it
/// by mutable reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingState {
    /// Last known nozzle temperature
    pub current_temperature: Option<f64>,
    /// Last known part-cooling fan duty
    pub current_fan_duty: Option<u8>,
    /// Temperature in effect just before the active feature took over
    pub baseline_temperature: Option<f64>,
    /// Fan duty in effect just before the active feature took over
    pub baseline_fan_duty: Option<u8>,
    /// The active feature injected its own temperature
    pub override_active_temp: bool,
    /// The active feature injected its own fan duty
    pub override_active_fan: bool,
    pub extrusion_mode_relative: bool,
    /// Absolute extrusion position as written in the input
    pub last_absolute_extrusion: f64,
    /// Output position minus input position, accumulated by scaling
    pub extrusion_offset: f64,
    pub last_seen_z: Option<f64>,
    pub current_layer: i64,
    /// A layer signal has fired; negative indices (rafts) are real layers
    pub layer_seen: bool,
    /// Feature driving flow scaling; cleared at every layer transition
    pub current_feature: Option<Feature>,
    /// Feature of the most recent marker, whose exit commands are pending
    pub previous_feature: Option<Feature>,
}

impl Default for ProcessingState {
    fn default() -> Self {
        Self {
            current_temperature: None,
            current_fan_duty: None,
            baseline_temperature: None,
            baseline_fan_duty: None,
            override_active_temp: false,
            override_active_fan: false,
            extrusion_mode_relative: false,
            last_absolute_extrusion: 0.0,
            extrusion_offset: 0.0,
            last_seen_z: None,
            current_layer: LAYER_SENTINEL,
            layer_seen: false,
            current_feature: None,
            previous_feature: None,
        }
    }
}

impl ProcessingState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow the passive effect of a command: heater, fan, extrusion mode
    /// and position resets.
    ///
    /// Motion and arc lines are left to the flow rewriter. Returns the text of a
    /// numeric token that failed to parse; the state is then left as it was.
    pub fn observe<'a>(&mut self, command: &Command<'a>) -> Option<&'a str> {
        match *command {
            Command::SetTemperature { target, .. } => match target.as_f64() {
                Some(t) => self.current_temperature = Some(t),
                None => return Some(target.text),
            },
            Command::FanOn { duty } => match duty.as_duty() {
                Some(d) => self.current_fan_duty = Some(d),
                None => return Some(duty.text),
            },
            Command::FanOff => self.current_fan_duty = Some(0),
            Command::AbsoluteExtrusion => self.extrusion_mode_relative = false,
            Command::RelativeExtrusion => self.extrusion_mode_relative = true,
            Command::ResetPosition { e: Some(e) } => match e.as_f64() {
                Some(v) => self.reset_extrusion(v),
                None => return Some(e.text),
            },
            Command::ResetPosition { e: None }
            | Command::Motion(_)
            | Command::Arc { .. }
            | Command::Other => {}
        }
        None
    }

    /// Redefine the extrusion origin; input and output agree again afterwards
    pub fn reset_extrusion(&mut self, position: f64) {
        debug!("Extrusion position reset to {position}");
        self.last_absolute_extrusion = position;
        self.extrusion_offset = 0.0;
    }

    /// Whether any layer signal has fired yet
    #[must_use]
    pub fn layer_started(&self) -> bool {
        self.layer_seen
    }

    /// Move to layer `index` and mark layers as started
    pub fn enter_layer(&mut self, index: i64) {
        self.current_layer = index;
        self.layer_seen = true;
    }
}
