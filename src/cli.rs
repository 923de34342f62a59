//! Command-line interface for featurecode.
//!
//! Defines CLI arguments using clap builder API. The per-feature options
//! (`--bridge`, `--bridge-fan`, `--bridge-flow`, `--bridge-gcode`,
//! `--bridge-gcode-exit`, ...) are generated from [`Feature::ALL`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Arg, ArgAction, Command};

use crate::config::FeatureOverride;
use crate::feature::Feature;

/// Overrides for one feature given on the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureArgs {
    pub temperature: Option<f64>,
    /// Fan level in percent
    pub fan: Option<f64>,
    pub flow: Option<f64>,
    pub gcode_enter: Option<Vec<String>>,
    pub gcode_exit: Option<Vec<String>>,
}

impl FeatureArgs {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.fan.is_none()
            && self.flow.is_none()
            && self.gcode_enter.is_none()
            && self.gcode_exit.is_none()
    }

    /// Apply on top of lower-priority settings; command lists replace
    pub fn apply(&self, over: &mut FeatureOverride) {
        if let Some(v) = self.temperature {
            over.temperature = Some(v);
        }
        if let Some(v) = self.fan {
            over.fan = Some(v);
        }
        if let Some(v) = self.flow {
            over.flow = Some(v);
        }
        if let Some(v) = &self.gcode_enter {
            over.gcode_enter.clone_from(v);
        }
        if let Some(v) = &self.gcode_exit {
            over.gcode_exit.clone_from(v);
        }
    }
}

/// CLI arguments parsed from command line
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Files or directories to process
    pub inputs: Vec<PathBuf>,

    /// Use M109 instead of M104 for injected temperatures
    pub wait_temp: Option<bool>,

    /// Number of leading layers left untouched
    pub skip_first_layers: Option<u32>,

    /// Fractional digits of rewritten extrusion values
    pub flow_decimals: Option<usize>,

    /// Per-feature overrides, only for features with at least one option set
    pub features: BTreeMap<Feature, FeatureArgs>,

    /// Output to stdout instead of in-place
    pub stdout: bool,

    /// Config file path
    pub config: Option<PathBuf>,

    /// Recursive directory processing
    pub recursive: bool,

    /// Silent mode (errors only)
    pub silent: bool,

    /// Number of parallel jobs (0 = auto, 1 = sequential)
    pub jobs: Option<usize>,

    /// Exclude patterns for files/directories (glob patterns)
    pub exclude: Vec<String>,

    /// Custom G-code file extensions (in addition to defaults)
    pub extensions: Vec<String>,

    /// Enable debug output
    pub debug: bool,
}

fn fan_id(feature: Feature) -> String {
    format!("{}-fan", feature.cli_name())
}

fn flow_id(feature: Feature) -> String {
    format!("{}-flow", feature.cli_name())
}

fn gcode_id(feature: Feature) -> String {
    format!("{}-gcode", feature.cli_name())
}

fn gcode_exit_id(feature: Feature) -> String {
    format!("{}-gcode-exit", feature.cli_name())
}

/// The five options of one feature
fn feature_args(feature: Feature) -> [Arg; 5] {
    let name = feature.cli_name();
    let label = feature.label();
    [
        Arg::new(name)
            .long(name)
            .help(format!("Nozzle temperature while printing {label}"))
            .value_name("TEMP")
            .value_parser(clap::value_parser!(f64)),
        Arg::new(fan_id(feature))
            .long(fan_id(feature))
            .help(format!("Fan level in percent (0-100) while printing {label}"))
            .value_name("PCT")
            .value_parser(clap::value_parser!(f64)),
        Arg::new(flow_id(feature))
            .long(flow_id(feature))
            .help(format!("Flow factor for {label} extrusion"))
            .value_name("FACTOR")
            .value_parser(clap::value_parser!(f64)),
        Arg::new(gcode_id(feature))
            .long(gcode_id(feature))
            .help(format!("Command to emit when {label} starts (can be repeated)"))
            .value_name("CMD")
            .action(ArgAction::Append),
        Arg::new(gcode_exit_id(feature))
            .long(gcode_exit_id(feature))
            .help(format!("Command to emit when {label} ends (can be repeated)"))
            .value_name("CMD")
            .action(ArgAction::Append),
    ]
}

/// Build the clap Command for parsing CLI arguments
#[must_use]
pub fn build_cli() -> Command {
    let cmd = Command::new("featurecode")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Per-feature temperature, fan, flow and custom G-code overrides for sliced G-code")
        .arg(
            Arg::new("inputs")
                .help("G-code files or directories to rewrite in place (- for stdin)")
                .value_name("FILE")
                .num_args(1..)
                .required(false)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("wait-temp")
                .long("wait-temp")
                .help("Use M109 (wait) instead of M104 for injected temperature changes")
                .action(ArgAction::SetTrue)
                .overrides_with("no-wait-temp"),
        )
        .arg(
            Arg::new("no-wait-temp")
                .long("no-wait-temp")
                .help("Use M104 (no wait) for injected temperature changes")
                .action(ArgAction::SetTrue)
                .overrides_with("wait-temp"),
        )
        .arg(
            Arg::new("skip-first-layers")
                .long("skip-first-layers")
                .help("Leave this many leading layers untouched [default: 0]")
                .value_name("NUM")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("flow-decimals")
                .long("flow-decimals")
                .help("Maximum fractional digits of rewritten extrusion values [default: 5]")
                .value_name("NUM")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("stdout")
                .short('s')
                .long("stdout")
                .help("Output to stdout instead of modifying files in-place")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to configuration file (overrides auto-discovery)")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("recursive")
                .short('r')
                .long("recursive")
                .help("Recursively process directories")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("exclude")
                .short('e')
                .long("exclude")
                .help("Exclude files/directories matching pattern (glob syntax, can be repeated)")
                .value_name("PATTERN")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("extension")
                .short('x')
                .long("extension")
                .help("Additional G-code file extension (can be repeated, e.g., -x bgcode)")
                .value_name("EXT")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("debug")
                .short('D')
                .long("debug")
                .help("Enable debug output (shows config, feature transitions, malformed values)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("silent")
                .short('S')
                .long("silent")
                .help("Silent mode (errors only)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("jobs")
                .short('j')
                .long("jobs")
                .help("Number of parallel jobs (0=auto, 1=sequential)")
                .value_name("NUM")
                .value_parser(clap::value_parser!(usize)),
        )
        .next_help_heading("Feature overrides");

    Feature::ALL
        .into_iter()
        .fold(cmd, |cmd, feature| cmd.args(feature_args(feature)))
}

/// Parse CLI arguments from command line
#[must_use]
pub fn parse_args() -> CliArgs {
    args_from_matches(&build_cli().get_matches())
}

/// Parse CLI arguments from an iterator (for testing)
#[must_use]
pub fn parse_args_from<I, T>(args: I) -> CliArgs
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    args_from_matches(&build_cli().get_matches_from(args))
}

fn strings(matches: &clap::ArgMatches, id: &str) -> Option<Vec<String>> {
    matches
        .get_many::<String>(id)
        .map(|vals| vals.cloned().collect())
}

fn feature_from_matches(matches: &clap::ArgMatches, feature: Feature) -> FeatureArgs {
    FeatureArgs {
        temperature: matches.get_one::<f64>(feature.cli_name()).copied(),
        fan: matches.get_one::<f64>(&fan_id(feature)).copied(),
        flow: matches.get_one::<f64>(&flow_id(feature)).copied(),
        gcode_enter: strings(matches, &gcode_id(feature)),
        gcode_exit: strings(matches, &gcode_exit_id(feature)),
    }
}

/// Convert clap `ArgMatches` to `CliArgs`
fn args_from_matches(matches: &clap::ArgMatches) -> CliArgs {
    let wait_temp = if matches.get_flag("wait-temp") {
        Some(true)
    } else if matches.get_flag("no-wait-temp") {
        Some(false)
    } else {
        None
    };

    let features = Feature::ALL
        .into_iter()
        .map(|feature| (feature, feature_from_matches(matches, feature)))
        .filter(|(_, args)| !args.is_empty())
        .collect();

    CliArgs {
        inputs: matches
            .get_many::<PathBuf>("inputs")
            .map(|vals| vals.cloned().collect())
            .unwrap_or_default(),
        wait_temp,
        skip_first_layers: matches.get_one::<u32>("skip-first-layers").copied(),
        flow_decimals: matches.get_one::<usize>("flow-decimals").copied(),
        features,
        stdout: matches.get_flag("stdout"),
        config: matches.get_one::<PathBuf>("config").cloned(),
        recursive: matches.get_flag("recursive"),
        exclude: strings(matches, "exclude").unwrap_or_default(),
        extensions: strings(matches, "extension").unwrap_or_default(),
        debug: matches.get_flag("debug"),
        silent: matches.get_flag("silent"),
        jobs: matches.get_one::<usize>("jobs").copied(),
    }
}
