//! Elo-style rating updates
//!
//! Pure functions over f64 ratings. The K factor is the only tunable and is
//! resolved per participant through [`KFactorSchedule`]: fast convergence
//! for fresh accounts, stability for established high-rated ones.

/// Logistic scale constant in the Elo convention.
pub const ELO_SCALE: f64 = 400.0;

/// Win probability of `a` against `b`.
///
/// `expected_outcome(a, b) + expected_outcome(b, a)` is always 1.
#[inline]
pub fn expected_outcome(a: f64, b: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((b - a) / ELO_SCALE))
}

/// Apply a decisive result. Returns `(new_winner, new_loser)`.
///
/// The transfer is symmetric: the winner gains exactly what the loser
/// loses, so the rating pool is conserved.
#[inline]
pub fn apply_result(winner: f64, loser: f64, k: f64) -> (f64, f64) {
    let delta = k * (1.0 - expected_outcome(winner, loser));
    (winner + delta, loser - delta)
}

/// Per-participant K factor policy.
///
/// Placement matches move fast; veterans above the cutoff move slowly;
/// everyone else uses the standard K.
#[derive(Clone, Copy, Debug)]
pub struct KFactorSchedule {
    /// Matches played below which the placement K applies.
    pub placement_matches: u32,
    pub placement_k: f64,
    pub standard_k: f64,
    /// Rating at or above which the veteran K applies.
    pub veteran_rating: f64,
    pub veteran_k: f64,
}

impl Default for KFactorSchedule {
    fn default() -> Self {
        KFactorSchedule {
            placement_matches: 10,
            placement_k: 40.0,
            standard_k: 20.0,
            veteran_rating: 2400.0,
            veteran_k: 10.0,
        }
    }
}

impl KFactorSchedule {
    /// Resolve the K factor for a participant.
    ///
    /// Placement takes precedence over the veteran cutoff: a fresh account
    /// converges fast no matter where it starts.
    pub fn k_for(&self, matches_played: u32, rating: f64) -> f64 {
        if matches_played < self.placement_matches {
            self.placement_k
        } else if rating >= self.veteran_rating {
            self.veteran_k
        } else {
            self.standard_k
        }
    }
}
