//! The rewriting engine.
//!
//! One pass walks the document line by line, carrying a [`ProcessingState`]:
//!
//! - [`layer`]: current layer from `;LAYER:` / `;LAYER_CHANGE` markers and Z rises
//! - [`flow`]: rescales positive extrusion inside features with a flow factor
//! - [`overrides`]: feature-boundary transitions (custom commands, temperature
//!   and fan overrides, baseline restores)
//! - [`pipeline`]: drives the pass and assembles the output lines
//!
//! The main entry point is [`process_file`] which processes a buffered reader
//! and writes the rewritten document to any `Write` implementation.

pub mod flow;
pub mod layer;
pub mod overrides;
pub mod pipeline;
pub mod state;

pub use flow::{format_extrusion, rewrite_extrusion};
pub use layer::{track_layer, LayerUpdate};
pub use overrides::{on_feature_marker, Transition};
pub use pipeline::{process_document, process_file, rewrite_lines, PassOutput, PassSummary};
pub use state::{ProcessingState, LAYER_SENTINEL};
