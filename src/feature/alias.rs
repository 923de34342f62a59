//! Feature-name canonicalization.
//!
//! Slicers spell the same geometry in many ways (`External perimeter`,
//! `WALL-OUTER`, `outer wall`). [`AliasTable`] maps any accepted spelling to
//! its canonical [`Feature`]. The table is built once and only read afterwards,
//! so a single instance can be shared by every pass, including passes running
//! on other threads.

use std::collections::HashMap;

use super::types::Feature;

/// Characters that separate the feature name from trailing annotations
const ANNOTATION_SEPARATORS: [char; 3] = [';', '|', ','];

/// Immutable alias vocabulary with its derived normalization index
#[derive(Debug, Clone)]
pub struct AliasTable {
    /// Lowercased alias -> feature
    exact: HashMap<String, Feature>,
    /// Normalized alias (see [`normalize_key`]) -> feature
    normalized: HashMap<String, Feature>,
}

impl AliasTable {
    /// Build a table from `(feature, aliases)` pairs.
    ///
    /// When two features claim the same alias the later pair wins.
    pub fn new<'a, I, A>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Feature, A)>,
        A: IntoIterator<Item = &'a str>,
    {
        let mut exact = HashMap::new();
        let mut normalized = HashMap::new();
        for (feature, aliases) in entries {
            for alias in aliases {
                exact.insert(alias.trim().to_lowercase(), feature);
                normalized.insert(normalize_key(alias), feature);
            }
        }
        Self { exact, normalized }
    }

    /// Table holding the built-in vocabulary of every [`Feature`]
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(
            Feature::ALL
                .into_iter()
                .map(|f| (f, f.builtin_aliases().iter().copied())),
        )
    }

    /// Resolve the text of a `; TYPE:` marker to a canonical feature.
    ///
    /// Only the first segment before `;`, `|` or `,` is significant. Exact
    /// (lowercased) spelling is tried first, then the normalized spelling.
    #[must_use]
    pub fn canonicalize(&self, raw: &str) -> Option<Feature> {
        let primary = raw
            .split(ANNOTATION_SEPARATORS)
            .next()
            .unwrap_or_default()
            .trim();
        if primary.is_empty() {
            return None;
        }
        self.exact
            .get(&primary.to_lowercase())
            .or_else(|| self.normalized.get(&normalize_key(primary)))
            .copied()
    }

    /// Number of distinct exact aliases
    #[must_use]
    pub fn len(&self) -> usize {
        self.exact.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Lowercase, treat `_` and `-` as spaces, and collapse runs of whitespace
#[must_use]
pub fn normalize_key(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
