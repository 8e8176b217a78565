//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Default limit on nested engine invocations.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Including tree carried by a boundary whose kind has no dedicated cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IncludingFallback {
    /// Only Select, Where and Group boundaries carry the freshly cut tree;
    /// other kinds keep the tree of the previous step when it still fits
    /// their result type.
    #[default]
    PreviousStep,
    /// Every boundary carries the freshly cut tree.
    FreshCut,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum depth of nested engine invocations (attaching queries, check
    /// views, join inputs).
    pub max_depth: usize,

    /// Including tree carried across unsupported boundary kinds.
    pub including_fallback: IncludingFallback,

    /// Register top-level results as roots of the identity map.
    pub attach_roots: bool,

    /// Load references that were not included when a local operation
    /// navigates them, instead of failing with `NotLoaded`.
    pub lazy_loading: bool,
}

impl EngineConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            including_fallback: IncludingFallback::PreviousStep,
            attach_roots: true,
            lazy_loading: true,
        }
    }

    /// Set the maximum nesting depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set the including fallback.
    pub fn with_including_fallback(mut self, fallback: IncludingFallback) -> Self {
        self.including_fallback = fallback;
        self
    }

    /// Enable or disable attaching roots.
    pub fn with_attach_roots(mut self, enabled: bool) -> Self {
        self.attach_roots = enabled;
        self
    }

    /// Enable or disable lazy loading.
    pub fn with_lazy_loading(mut self, enabled: bool) -> Self {
        self.lazy_loading = enabled;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
