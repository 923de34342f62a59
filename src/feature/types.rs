/// Canonical feature identifiers
use std::fmt;
use std::str::FromStr;

/// Printed geometry categories that can receive their own overrides
///
/// The set is closed: every `; TYPE:` marker either resolves to one of these
/// or is left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Feature {
    ExternalPerimeter,
    InternalPerimeter,
    OverhangPerimeter,
    Infill,
    SolidInfill,
    TopSurface,
    BottomSurface,
    Bridge,
    SupportInterface,
    Support,
}

impl Feature {
    /// All features, in CLI/help order
    pub const ALL: [Feature; 10] = [
        Feature::ExternalPerimeter,
        Feature::InternalPerimeter,
        Feature::OverhangPerimeter,
        Feature::Infill,
        Feature::SolidInfill,
        Feature::TopSurface,
        Feature::BottomSurface,
        Feature::Bridge,
        Feature::SupportInterface,
        Feature::Support,
    ];

    /// Canonical snake_case name, used in config files and injected comments
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Feature::ExternalPerimeter => "external_perimeter",
            Feature::InternalPerimeter => "internal_perimeter",
            Feature::OverhangPerimeter => "overhang_perimeter",
            Feature::Infill => "infill",
            Feature::SolidInfill => "solid_infill",
            Feature::TopSurface => "top_surface",
            Feature::BottomSurface => "bottom_surface",
            Feature::Bridge => "bridge",
            Feature::SupportInterface => "support_interface",
            Feature::Support => "support",
        }
    }

    /// Hyphenated name used as the CLI option stem (`--top-surface-fan`)
    #[must_use]
    pub fn cli_name(self) -> &'static str {
        match self {
            Feature::ExternalPerimeter => "external-perimeter",
            Feature::InternalPerimeter => "internal-perimeter",
            Feature::OverhangPerimeter => "overhang-perimeter",
            Feature::Infill => "infill",
            Feature::SolidInfill => "solid-infill",
            Feature::TopSurface => "top-surface",
            Feature::BottomSurface => "bottom-surface",
            Feature::Bridge => "bridge",
            Feature::SupportInterface => "support-interface",
            Feature::Support => "support",
        }
    }

    /// Human-readable label for help text
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Feature::ExternalPerimeter => "external perimeter",
            Feature::InternalPerimeter => "internal perimeter",
            Feature::OverhangPerimeter => "overhang perimeter",
            Feature::Infill => "infill",
            Feature::SolidInfill => "solid infill",
            Feature::TopSurface => "top surface",
            Feature::BottomSurface => "bottom surface",
            Feature::Bridge => "bridge",
            Feature::SupportInterface => "support interface",
            Feature::Support => "support",
        }
    }

    /// Built-in spellings slicers use for this feature in `; TYPE:` markers
    #[must_use]
    pub fn builtin_aliases(self) -> &'static [&'static str] {
        match self {
            Feature::ExternalPerimeter => &[
                "external perimeter",
                "external perimeters",
                "external wall",
                "outer wall",
                "wall-outer",
                "wall outer",
            ],
            Feature::InternalPerimeter => &[
                "perimeter",
                "perimeters",
                "inner wall",
                "wall-inner",
                "wall inner",
            ],
            Feature::OverhangPerimeter => &[
                "overhang perimeter",
                "overhang wall",
                "wall-overhang",
                "overhang-wall",
            ],
            Feature::Infill => &["infill", "internal infill", "sparse infill", "fill"],
            Feature::SolidInfill => &["solid infill", "solid-infill", "internal solid infill"],
            Feature::TopSurface => &[
                "top solid infill",
                "skin top",
                "top surface",
                "top surfaces",
                "topskin",
            ],
            Feature::BottomSurface => &[
                "bottom solid infill",
                "skin bottom",
                "bottom surface",
                "bottom surfaces",
                "bottomskin",
            ],
            Feature::Bridge => &["bridge", "bridges", "bridge infill", "bridge-infill"],
            Feature::SupportInterface => &["support material interface", "support interface"],
            Feature::Support => &["support material", "support", "supports"],
        }
    }

    /// Resolve a canonical or CLI spelling (`top_surface` / `top-surface`)
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.into_iter().find(|f| {
            f.as_str().eq_ignore_ascii_case(name) || f.cli_name().eq_ignore_ascii_case(name)
        })
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a feature name is not one of the canonical identifiers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown feature name: {0}")]
pub struct UnknownFeatureName(pub String);

impl FromStr for Feature {
    type Err = UnknownFeatureName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| UnknownFeatureName(s.to_string()))
    }
}
