//! featurecode - Per-feature overrides for sliced G-code
//!
//! Rewrites a G-code document so that each printed feature (walls, infill,
//! bridges, support, ...) gets its own nozzle temperature, fan level, flow
//! factor and custom commands, restoring the previous settings at feature
//! boundaries.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod directive;
pub mod error;
pub mod feature;
pub mod parser;
pub mod process;

// Re-export commonly used types
pub use cli::{build_cli, parse_args, parse_args_from, CliArgs, FeatureArgs};
pub use config::{Config, FeatureOverride};
pub use directive::{find_directive, parse_directive, DirectiveOverrides};
pub use error::{ProcessError, Result};
pub use feature::{AliasTable, Feature};
pub use process::{process_document, process_file, PassOutput, PassSummary};
