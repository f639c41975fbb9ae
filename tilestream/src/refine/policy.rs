//! Refinement policy knobs.

/// Default number of unvisited ticks before a subtree is released.
pub const DEFAULT_EVICTION_GRACE_TICKS: u64 = 60;

/// Tunable refinement behavior.
///
/// The threshold itself travels with the per-tick
/// [`ViewParameters`](super::ViewParameters); this policy fixes the
/// behaviors that are deliberately configuration rather than hard-coded:
/// the tie-break exactly at the threshold, and the eviction grace period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefinePolicy {
    /// Whether a node whose scaled error equals the threshold exactly
    /// refines. Off by default: ties prefer the coarser representation,
    /// bounding load volume.
    pub refine_at_threshold: bool,

    /// Number of consecutive ticks a subtree may go unvisited before it is
    /// unloaded, deepest-first.
    pub eviction_grace_ticks: u64,
}

impl RefinePolicy {
    /// Returns true if a node with `error` should refine against
    /// `threshold`.
    pub fn should_refine(&self, error: f64, threshold: f64) -> bool {
        if self.refine_at_threshold {
            error >= threshold
        } else {
            error > threshold
        }
    }

    /// Returns true if a node last visited at `last_visible_tick` has
    /// outlived its grace period at `current_tick`.
    pub fn expired(&self, last_visible_tick: u64, current_tick: u64) -> bool {
        current_tick.saturating_sub(last_visible_tick) > self.eviction_grace_ticks
    }
}

impl Default for RefinePolicy {
    fn default() -> Self {
        Self {
            refine_at_threshold: false,
            eviction_grace_ticks: DEFAULT_EVICTION_GRACE_TICKS,
        }
    }
}
