//! Core type definitions for the Intention Filter
//!
//! Feature flags identify the independently toggleable behaviors; the page
//! context captures the route-dependent part of rule applicability.

use serde::{Deserialize, Serialize};

// =============================================================================
// Feature Flags
// =============================================================================

/// One independently toggleable suppression behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureFlag {
    /// Home feed grid, watch-next sidebar, end screens
    HideRecommendations,
    /// Shorts shelves, tiles and navigation entries
    HideShorts,
    /// Native media autoplay and the autoplay toggle
    DisableAutoplay,
    /// Comment section under the player
    HideComments,
}

impl FeatureFlag {
    /// All flags in scan order.
    pub const ALL: [FeatureFlag; 4] = [
        FeatureFlag::HideRecommendations,
        FeatureFlag::HideShorts,
        FeatureFlag::DisableAutoplay,
        FeatureFlag::HideComments,
    ];

    /// Settings store key.
    pub fn key(self) -> &'static str {
        match self {
            Self::HideRecommendations => "hideRecommendations",
            Self::HideShorts => "hideShorts",
            Self::DisableAutoplay => "disableAutoplay",
            Self::HideComments => "hideComments",
        }
    }

    /// Parse from a settings store key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|flag| flag.key() == key)
    }

    /// Rule list category name.
    pub fn category(self) -> &'static str {
        match self {
            Self::HideRecommendations => "recommendations",
            Self::HideShorts => "shorts",
            Self::DisableAutoplay => "autoplay",
            Self::HideComments => "comments",
        }
    }

    /// Parse from a rule list category name.
    pub fn from_category(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|flag| flag.category() == name)
    }

    /// Value used when the store has no (or no usable) entry for this flag.
    pub fn default_enabled(self) -> bool {
        !matches!(self, Self::HideComments)
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::HideRecommendations => "Hide recommendations",
            Self::HideShorts => "Hide Shorts",
            Self::DisableAutoplay => "Disable autoplay",
            Self::HideComments => "Hide comments",
        }
    }

    pub fn bit(self) -> FeatureSet {
        match self {
            Self::HideRecommendations => FeatureSet::HIDE_RECOMMENDATIONS,
            Self::HideShorts => FeatureSet::HIDE_SHORTS,
            Self::DisableAutoplay => FeatureSet::DISABLE_AUTOPLAY,
            Self::HideComments => FeatureSet::HIDE_COMMENTS,
        }
    }
}

impl std::fmt::Display for FeatureFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

// =============================================================================
// Feature Set (bit mask of enabled flags)
// =============================================================================

bitflags::bitflags! {
    /// Set of enabled feature flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FeatureSet: u8 {
        const HIDE_RECOMMENDATIONS = 1 << 0;
        const HIDE_SHORTS = 1 << 1;
        const DISABLE_AUTOPLAY = 1 << 2;
        const HIDE_COMMENTS = 1 << 3;

        /// Documented defaults (everything but comments)
        const DEFAULTS = Self::HIDE_RECOMMENDATIONS.bits()
            | Self::HIDE_SHORTS.bits()
            | Self::DISABLE_AUTOPLAY.bits();
    }
}

impl FeatureSet {
    /// Iterate the enabled flags in scan order.
    pub fn flags(self) -> impl Iterator<Item = FeatureFlag> {
        FeatureFlag::ALL
            .into_iter()
            .filter(move |flag| self.contains(flag.bit()))
    }
}

// =============================================================================
// Page Context
// =============================================================================

/// Coarse classification of the current route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Route {
    /// `/`
    Home,
    /// `/feed/explore...`
    Explore,
    /// `/feed/subscriptions...`
    Subscriptions,
    /// `/results...`
    Search,
    /// `/watch...`
    Watch,
    Other,
}

/// Route-dependent context, computed once per scan pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageContext {
    pub route: Route,
}

impl PageContext {
    /// Classify a location path. Query strings and fragments are ignored.
    pub fn from_path(path: &str) -> Self {
        let path = path
            .split(['?', '#'])
            .next()
            .unwrap_or_default();

        let route = if path.is_empty() || path == "/" {
            Route::Home
        } else if path.starts_with("/feed/subscriptions") {
            Route::Subscriptions
        } else if path.starts_with("/feed/explore") {
            Route::Explore
        } else if path.starts_with("/results") {
            Route::Search
        } else if path.starts_with("/watch") {
            Route::Watch
        } else {
            Route::Other
        };

        Self { route }
    }

    /// Does the route denote a discovery/home feed?
    pub fn is_discovery_feed(&self) -> bool {
        matches!(self.route, Route::Home | Route::Explore)
    }
}
