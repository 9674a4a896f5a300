//! Turn rotation.
//!
//! Pure function over roster size and director position. No clock,
//! no broadcast. The state machine applies the result.

/// Result of advancing the active index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation {
    pub index: usize,
    /// How many times index 0 was crossed (each one is a new turn number).
    pub wraps: u32,
}

/// Next active index after `current`, skipping `director`.
///
/// Steps `(i + 1) mod n`; every arrival at index 0 counts a wrap. Returns
/// `None` when no eligible participant exists.
pub fn next_active(count: usize, current: usize, director: Option<usize>) -> Option<Rotation> {
    if count == 0 {
        return None;
    }
    let mut index = current % count;
    let mut wraps = 0;
    for _ in 0..count {
        index = (index + 1) % count;
        if index == 0 {
            wraps += 1;
        }
        if Some(index) != director {
            return Some(Rotation { index, wraps });
        }
    }
    None
}

/// First eligible index at or after `start`, without counting wraps.
/// Used when combat begins and when the active participant leaves.
pub fn first_eligible(count: usize, start: usize, director: Option<usize>) -> Option<usize> {
    (0..count)
        .map(|offset| (start + offset) % count)
        .find(|&i| Some(i) != director)
}
