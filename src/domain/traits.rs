// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The training workflow only needs "something that yields
// preference pairs". Keeping that behind a trait lets the
// synthetic generator used by the demo be swapped for any
// other producer of already-tokenised pairs without touching
// the application or ML layers.

use anyhow::Result;
use crate::domain::preference::PreferencePair;

// ─── PreferenceSource ─────────────────────────────────────────────────────────
/// Any component that can produce tokenised preference pairs.
///
/// Implementations:
///   - SyntheticPreferences → seeded toy pairs for the demo driver
pub trait PreferenceSource {
    /// Return every pair this source holds.
    fn load_pairs(&self) -> Result<Vec<PreferencePair>>;
}
