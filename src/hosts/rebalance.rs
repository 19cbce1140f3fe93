//! Load-balancing decision for membership changes.
//!
//! When the ensemble grows, a share of the already-connected clients must
//! move so the new members receive traffic. Each client decides on its own
//! with a single random draw against [`migration_probability`]; the expected
//! fraction of movers across all clients equals the share of the new
//! ensemble that the old members should give up.

use std::net::SocketAddr;

/// Probability that a client should drop a healthy connection after a
/// membership update.
///
/// - `old_size`: members of the previous list still present in the new one.
/// - `new_size`: size of the new list.
/// - `retained`: whether the endpoint the client is connected to survived.
///
/// A client whose endpoint disappeared always moves. Otherwise it moves with
/// probability `1 - old_size / new_size` when the ensemble grew, and never
/// when it shrank or kept its size.
pub fn migration_probability(old_size: usize, new_size: usize, retained: bool) -> f64 {
    if !retained {
        return 1.0;
    }
    if new_size == 0 || old_size >= new_size {
        return 0.0;
    }
    1.0 - old_size as f64 / new_size as f64
}

/// Comparison of a previous and a new membership list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipDiff {
    /// The currently connected endpoint is part of the new list.
    pub retained: bool,
    /// Slots of the new list that were already present in the old list.
    pub survivors: usize,
    /// Slots of the new list that were not present in the old list.
    pub arrivals: Vec<SocketAddr>,
}

impl MembershipDiff {
    /// Compare `old` against `new` from the point of view of a client
    /// connected to `current`.
    pub fn compute(old: &[SocketAddr], new: &[SocketAddr], current: SocketAddr) -> Self {
        let mut survivors = 0;
        let mut arrivals = Vec::new();
        for endpoint in new {
            if old.contains(endpoint) {
                survivors += 1;
            } else {
                arrivals.push(*endpoint);
            }
        }

        Self {
            retained: new.contains(&current),
            survivors,
            arrivals,
        }
    }

    /// Migration probability for this diff.
    pub fn probability(&self) -> f64 {
        migration_probability(
            self.survivors,
            self.survivors + self.arrivals.len(),
            self.retained,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 1], port))
    }

    #[test]
    fn test_probability_growth() {
        assert!((migration_probability(3, 5, true) - 0.4).abs() < 1e-9);
        assert!((migration_probability(1, 2, true) - 0.5).abs() < 1e-9);
        assert!((migration_probability(4, 5, true) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_probability_stability() {
        // Same size or shrinking never moves a retained client
        assert_eq!(migration_probability(3, 3, true), 0.0);
        assert_eq!(migration_probability(5, 3, true), 0.0);
        assert_eq!(migration_probability(0, 0, true), 0.0);
    }

    #[test]
    fn test_probability_removed() {
        assert_eq!(migration_probability(3, 5, false), 1.0);
        assert_eq!(migration_probability(3, 3, false), 1.0);
        assert_eq!(migration_probability(0, 1, false), 1.0);
    }

    #[test]
    fn test_probability_bounds() {
        for old in 0..10 {
            for new in 0..10 {
                for retained in [true, false] {
                    let p = migration_probability(old, new, retained);
                    assert!((0.0..=1.0).contains(&p), "p={p} for {old}->{new}");
                }
            }
        }
    }

    #[test]
    fn test_diff_growth() {
        let old = [addr(1), addr(2), addr(3)];
        let new = [addr(1), addr(2), addr(3), addr(4), addr(5)];
        let diff = MembershipDiff::compute(&old, &new, addr(2));

        assert!(diff.retained);
        assert_eq!(diff.survivors, 3);
        assert_eq!(diff.arrivals, vec![addr(4), addr(5)]);
        assert!((diff.probability() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_diff_current_removed() {
        let old = [addr(1), addr(2), addr(3)];
        let new = [addr(1), addr(3)];
        let diff = MembershipDiff::compute(&old, &new, addr(2));

        assert!(!diff.retained);
        assert_eq!(diff.survivors, 2);
        assert!(diff.arrivals.is_empty());
        assert_eq!(diff.probability(), 1.0);
    }

    #[test]
    fn test_diff_partial_replacement() {
        let old = [addr(1), addr(2), addr(3)];
        let new = [addr(1), addr(4), addr(5)];
        let diff = MembershipDiff::compute(&old, &new, addr(1));
        assert_eq!(diff.survivors, 1);
        assert!((diff.probability() - 2.0 / 3.0).abs() < 1e-9);

        let old = [addr(1), addr(2), addr(3), addr(4), addr(5)];
        let new = [addr(1), addr(2), addr(6)];
        let diff = MembershipDiff::compute(&old, &new, addr(1));
        assert_eq!(diff.survivors, 2);
        assert!((diff.probability() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_diff_duplicates_count_per_slot() {
        let old = [addr(1)];
        let new = [addr(1), addr(1), addr(2)];
        let diff = MembershipDiff::compute(&old, &new, addr(1));

        assert_eq!(diff.survivors, 2);
        assert_eq!(diff.arrivals, vec![addr(2)]);
    }
}
