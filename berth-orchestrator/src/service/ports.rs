//! Port allocation
//!
//! Rejection sampling over an open interval: draw a random candidate, accept
//! it if no known service holds it. Fine while the range is sparse relative to
//! the number of services; bounded so an exhausted range fails instead of
//! spinning.

use rand::Rng;
use std::collections::HashSet;

/// Draws up to `attempts` candidates from the open interval `(min, max)`
///
/// Returns the first candidate not in `taken`, or `None` if every draw collided.
pub fn allocate_port<R: Rng>(
    rng: &mut R,
    (min, max): (u16, u16),
    taken: &HashSet<u16>,
    attempts: u32,
) -> Option<u16> {
    if max <= min.saturating_add(1) {
        return None;
    }

    (0..attempts)
        .map(|_| rng.random_range(min + 1..max))
        .find(|candidate| !taken.contains(candidate))
}
