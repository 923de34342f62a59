//! Canonical print features and alias resolution.
//!
//! - [`Feature`]: the closed set of geometry categories overrides can target
//! - [`AliasTable`]: maps the many slicer spellings of a feature to its [`Feature`]

pub mod alias;
pub mod types;

pub use alias::{normalize_key, AliasTable};
pub use types::{Feature, UnknownFeatureName};
