//! G-code line parsing utilities.
//!
//! This module provides the read-only view of a G-code document:
//! - [`classify`]: recognizes structured comment markers and state-changing commands
//! - [`stream`]: converts a document to an ordered line sequence and back
//! - `patterns`: precompiled regex patterns, private to this module
//!
//! Classification never modifies a line; the rewriting passes in
//! [`crate::process`] decide what to change based on what is recognized here.

pub mod classify;
mod patterns;
pub mod stream;

pub use classify::{
    classify_command, classify_marker, split_comment, Command, Marker, Motion, Token,
};
pub use stream::{
    read_document, split_lines, strip_line_ending, write_atomic, write_lines, LineEnding,
};
