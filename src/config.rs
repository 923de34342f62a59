//! Configuration management for featurecode.
//!
//! This module provides the [`Config`] struct which controls every rewrite the
//! engine performs: global options plus one [`FeatureOverride`] per canonical
//! [`Feature`]. Configuration can be loaded from:
//! - TOML files (`featurecode.toml`)
//! - CLI arguments (which override file settings)
//! - In-file directives (`; featurecode: --skip-first-layers 2`)
//!
//! Config files are auto-discovered by searching parent directories from the file
//! being processed up to the filesystem root, plus the user's home directory.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ProcessError;
use crate::feature::Feature;

/// Config file names to search for (in order of priority, later overrides earlier)
const CONFIG_FILE_NAMES: &[&str] = &["featurecode.toml"];

/// Get the user's home directory
fn dirs_home() -> Option<PathBuf> {
    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home));
    }
    // Windows
    if let Ok(userprofile) = std::env::var("USERPROFILE") {
        return Some(PathBuf::from(userprofile));
    }
    None
}

/// Convert a fan percentage to an 8-bit PWM duty.
///
/// Rounds half to even, then clamps to `0..=255`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn percent_to_duty(pct: f64) -> u8 {
    (pct / 100.0 * 255.0).round_ties_even().clamp(0.0, 255.0) as u8
}

/// Overrides applied while one feature is being printed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureOverride {
    /// Nozzle temperature in °C
    pub temperature: Option<f64>,
    /// Part-cooling fan level in percent (0-100)
    pub fan: Option<f64>,
    /// Multiplier for positive extrusion amounts
    pub flow: Option<f64>,
    /// Commands emitted when the feature starts
    pub gcode_enter: Vec<String>,
    /// Commands emitted when the feature ends
    pub gcode_exit: Vec<String>,
}

impl FeatureOverride {
    /// Fan level as PWM duty, if a fan override is set
    #[must_use]
    pub fn fan_duty(&self) -> Option<u8> {
        self.fan.map(percent_to_duty)
    }

    /// Flow factor, only when it actually changes extrusion
    #[must_use]
    pub fn flow_factor(&self) -> Option<f64> {
        self.flow.filter(|f| (f - 1.0).abs() > 1e-12)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.fan.is_none()
            && self.flow.is_none()
            && self.gcode_enter.is_empty()
            && self.gcode_exit.is_empty()
    }

    fn apply_partial(&mut self, partial: &PartialFeatureOverride) {
        if let Some(v) = partial.temperature {
            self.temperature = Some(v);
        }
        if let Some(v) = partial.fan {
            self.fan = Some(v);
        }
        if let Some(v) = partial.flow {
            self.flow = Some(v);
        }
        // Lists replace rather than append
        if let Some(v) = &partial.gcode_enter {
            self.gcode_enter.clone_from(v);
        }
        if let Some(v) = &partial.gcode_exit {
            self.gcode_exit.clone_from(v);
        }
    }
}

/// Main configuration struct for featurecode
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Use `M109` (wait) instead of `M104` for injected temperature changes
    pub wait_temp: bool,

    /// Number of leading layers left untouched (default: 0)
    pub skip_first_layers: u32,

    /// Maximum fractional digits of rewritten extrusion values (default: 5)
    pub flow_decimals: usize,

    /// Per-feature overrides
    pub features: BTreeMap<Feature, FeatureOverride>,
}

/// Partial per-feature table for TOML parsing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialFeatureOverride {
    pub temperature: Option<f64>,
    pub fan: Option<f64>,
    pub flow: Option<f64>,
    pub gcode_enter: Option<Vec<String>>,
    pub gcode_exit: Option<Vec<String>>,
}

/// Partial configuration for TOML parsing
///
/// All fields are `Option<T>` so we can distinguish between
/// "explicitly set" and "not specified" when merging configs.
#[derive(Debug, Clone, Default, Deserialize)]
struct PartialConfig {
    pub wait_temp: Option<bool>,
    pub skip_first_layers: Option<u32>,
    pub flow_decimals: Option<usize>,
    /// Keyed by canonical or hyphenated feature name
    #[serde(default)]
    pub features: HashMap<String, PartialFeatureOverride>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            wait_temp: false,
            skip_first_layers: 0,
            flow_decimals: Self::DEFAULT_FLOW_DECIMALS,
            features: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Default fractional digits for rewritten extrusion values
    pub const DEFAULT_FLOW_DECIMALS: usize = 5;
    /// Maximum fractional digits (beyond this f64 noise shows up)
    const MAX_FLOW_DECIMALS: usize = 12;
    /// Highest accepted nozzle temperature
    const MAX_TEMPERATURE: f64 = 500.0;

    /// Overrides for a feature, if any are configured
    #[must_use]
    pub fn feature(&self, feature: Feature) -> Option<&FeatureOverride> {
        self.features.get(&feature)
    }

    /// Mutable overrides for a feature, created empty on first access
    pub fn feature_mut(&mut self, feature: Feature) -> &mut FeatureOverride {
        self.features.entry(feature).or_default()
    }

    /// Effective flow factor for a feature
    #[must_use]
    pub fn flow_factor(&self, feature: Feature) -> Option<f64> {
        self.feature(feature).and_then(FeatureOverride::flow_factor)
    }

    /// Heater command used for injected temperature changes
    #[must_use]
    pub fn temperature_command(&self) -> &'static str {
        if self.wait_temp {
            "M109"
        } else {
            "M104"
        }
    }

    /// Whether `layer` falls inside the leading span left untouched
    #[must_use]
    pub fn in_skip_span(&self, layer: i64) -> bool {
        self.skip_first_layers > 0 && layer < i64::from(self.skip_first_layers)
    }

    /// Validate configuration values are within reasonable bounds
    ///
    /// Returns an error message if validation fails, None if valid.
    #[must_use]
    pub fn validate(&self) -> Option<String> {
        if self.flow_decimals > Self::MAX_FLOW_DECIMALS {
            return Some(format!(
                "flow_decimals {} exceeds maximum of {}",
                self.flow_decimals,
                Self::MAX_FLOW_DECIMALS
            ));
        }
        for (feature, over) in &self.features {
            if let Some(t) = over.temperature {
                if !t.is_finite() || !(0.0..=Self::MAX_TEMPERATURE).contains(&t) {
                    return Some(format!(
                        "{feature}: temperature {t} must be between 0 and {}",
                        Self::MAX_TEMPERATURE
                    ));
                }
            }
            if let Some(pct) = over.fan {
                if !pct.is_finite() || !(0.0..=100.0).contains(&pct) {
                    return Some(format!("{feature}: fan {pct} must be between 0 and 100"));
                }
            }
            if let Some(flow) = over.flow {
                if !flow.is_finite() || flow <= 0.0 {
                    return Some(format!("{feature}: flow {flow} must be a positive number"));
                }
            }
        }
        None
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ProcessError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::default();
        config.apply_toml(&contents)?;
        Ok(config)
    }

    /// Parse TOML text and apply it on top of this configuration
    pub fn apply_toml(&mut self, contents: &str) -> anyhow::Result<()> {
        let partial: PartialConfig = toml::from_str(contents)?;
        self.apply_partial(&partial)?;
        Ok(())
    }

    /// Apply a partial config, only overriding fields that are explicitly set
    fn apply_partial(&mut self, partial: &PartialConfig) -> Result<(), ProcessError> {
        // Resolve every feature key before touching anything
        let mut resolved = Vec::with_capacity(partial.features.len());
        for (name, over) in &partial.features {
            let feature = Feature::from_name(name).ok_or_else(|| {
                ProcessError::InvalidConfig(format!("unknown feature table [features.{name}]"))
            })?;
            resolved.push((feature, over));
        }

        if let Some(v) = partial.wait_temp {
            self.wait_temp = v;
        }
        if let Some(v) = partial.skip_first_layers {
            self.skip_first_layers = v;
        }
        if let Some(v) = partial.flow_decimals {
            self.flow_decimals = v;
        }
        for (feature, over) in resolved {
            self.feature_mut(feature).apply_partial(over);
        }
        Ok(())
    }

    /// Discover config files from parent directories of a given path
    ///
    /// Searches from the file's directory up to the root, then adds home directory config.
    /// Returns list of config file paths in order of priority (least specific first).
    #[must_use]
    pub fn discover_config_files(start_path: &Path) -> Vec<PathBuf> {
        let mut config_files = Vec::new();

        // Home directory config has the lowest priority
        if let Some(home) = dirs_home() {
            for config_name in CONFIG_FILE_NAMES {
                let home_config = home.join(config_name);
                if home_config.is_file() {
                    config_files.push(home_config);
                }
            }
        }

        let start_dir = if start_path.is_file() {
            start_path.parent().map(Path::to_path_buf)
        } else if start_path.is_dir() {
            Some(start_path.to_path_buf())
        } else {
            std::env::current_dir().ok()
        };

        if let Some(dir) = start_dir {
            let mut ancestors: Vec<PathBuf> = dir.ancestors().map(Path::to_path_buf).collect();
            // Root first, so closer files come later and win
            ancestors.reverse();

            for ancestor in ancestors {
                for config_name in CONFIG_FILE_NAMES {
                    let config_path = ancestor.join(config_name);
                    if config_path.is_file() && !config_files.contains(&config_path) {
                        config_files.push(config_path);
                    }
                }
            }
        }

        config_files
    }

    /// Load and merge configuration from discovered config files
    ///
    /// Later files override earlier ones (only explicitly set values).
    /// Files that fail to read or parse are skipped with a warning.
    #[must_use]
    pub fn from_discovered_files(start_path: &Path) -> Self {
        let mut config = Self::default();
        for path in Self::discover_config_files(start_path) {
            match std::fs::read_to_string(&path) {
                Ok(contents) => {
                    // Parse into a copy so a bad file leaves no partial changes
                    let mut candidate = config.clone();
                    match candidate.apply_toml(&contents) {
                        Ok(()) => {
                            debug!("Applied config file {}", path.display());
                            config = candidate;
                        }
                        Err(e) => warn!("Failed to parse {}: {e}", path.display()),
                    }
                }
                Err(e) => warn!("Failed to read {}: {e}", path.display()),
            }
        }
        config
    }
}
