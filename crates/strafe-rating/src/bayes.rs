//! Simplified Bayesian team rating
//!
//! Tracks a `(mean, uncertainty)` pair per participant and updates whole
//! teams from a single win/loss observation. The model follows the usual
//! factor-graph shape but linearizes the surprise term: the posterior mean
//! moves proportionally to the participant's own variance share of the
//! combined spread, and the posterior variance shrinks by that same share.
//!
//! Uncertainty never increases and never reaches zero; it is floored at the
//! configured minimum so a long-idle skill drift can still be chased.

/// Per-participant skill belief.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SkillEstimate {
    pub mean: f64,
    pub uncertainty: f64,
}

impl SkillEstimate {
    pub const DEFAULT_MEAN: f64 = 1500.0;
    pub const DEFAULT_UNCERTAINTY: f64 = 350.0;

    pub fn new(mean: f64, uncertainty: f64) -> Self {
        SkillEstimate { mean, uncertainty }
    }

    /// Belief for a participant with no recorded matches.
    pub fn fresh() -> Self {
        SkillEstimate {
            mean: Self::DEFAULT_MEAN,
            uncertainty: Self::DEFAULT_UNCERTAINTY,
        }
    }

    #[inline]
    pub fn variance(&self) -> f64 {
        self.uncertainty * self.uncertainty
    }
}

impl Default for SkillEstimate {
    fn default() -> Self {
        SkillEstimate::fresh()
    }
}

/// Tunables for the team model.
#[derive(Clone, Copy, Debug)]
pub struct BayesConfig {
    /// Per-game performance noise on top of skill.
    pub beta: f64,
    /// Uncertainty floor. Must be positive.
    pub min_uncertainty: f64,
}

impl Default for BayesConfig {
    fn default() -> Self {
        BayesConfig {
            beta: 200.0,
            min_uncertainty: 30.0,
        }
    }
}

/// Team-vs-team rater. Stateless apart from configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct TeamRater {
    config: BayesConfig,
}

impl TeamRater {
    pub fn new(config: BayesConfig) -> Self {
        TeamRater { config }
    }

    /// Aggregate team skill (sum of member means).
    pub fn team_mean(team: &[SkillEstimate]) -> f64 {
        team.iter().map(|s| s.mean).sum()
    }

    /// Combined spread of one matchup: every member's variance plus one
    /// performance-noise term per player.
    fn combined_spread(&self, a: &[SkillEstimate], b: &[SkillEstimate]) -> f64 {
        let variance: f64 = a.iter().chain(b).map(|s| s.variance()).sum();
        let players = (a.len() + b.len()) as f64;
        (variance + players * self.config.beta * self.config.beta).sqrt()
    }

    /// Win probability of team `a` over team `b` under the current beliefs.
    pub fn expected_team_outcome(&self, a: &[SkillEstimate], b: &[SkillEstimate]) -> f64 {
        let spread = self.combined_spread(a, b);
        let diff = Self::team_mean(b) - Self::team_mean(a);
        1.0 / (1.0 + 10f64.powf(diff / spread))
    }

    /// Update both teams after `winners` beat `losers`.
    ///
    /// Every member moves by their own variance share of the combined
    /// spread; the same share shrinks their variance, floored at the
    /// configured minimum.
    pub fn rate_teams(
        &self,
        winners: &[SkillEstimate],
        losers: &[SkillEstimate],
    ) -> (Vec<SkillEstimate>, Vec<SkillEstimate>) {
        let spread = self.combined_spread(winners, losers);
        let expected = self.expected_team_outcome(winners, losers);
        let surprise = 1.0 - expected;

        let updated_winners = winners
            .iter()
            .map(|s| self.nudge(s, spread, surprise))
            .collect();
        let updated_losers = losers
            .iter()
            .map(|s| self.nudge(s, spread, -surprise))
            .collect();

        (updated_winners, updated_losers)
    }

    /// Update a whole match worth of teams given the winning team index.
    ///
    /// The winner is scored pairwise against every losing team from the
    /// pre-match beliefs; its deltas accumulate, each loser is updated once.
    pub fn rate_match(
        &self,
        teams: &[Vec<SkillEstimate>],
        winner_index: usize,
    ) -> Vec<Vec<SkillEstimate>> {
        let mut updated: Vec<Vec<SkillEstimate>> = teams.to_vec();
        if winner_index >= teams.len() {
            return updated;
        }

        let winner_before = &teams[winner_index];
        for (idx, loser_before) in teams.iter().enumerate() {
            if idx == winner_index {
                continue;
            }
            let (new_winners, new_losers) = self.rate_teams(winner_before, loser_before);
            updated[idx] = new_losers;
            // Accumulate winner deltas relative to the pre-match belief.
            for ((acc, fresh), before) in updated[winner_index]
                .iter_mut()
                .zip(&new_winners)
                .zip(winner_before)
            {
                acc.mean += fresh.mean - before.mean;
                acc.uncertainty = acc.uncertainty.min(fresh.uncertainty);
            }
        }
        updated
    }

    fn nudge(&self, estimate: &SkillEstimate, spread: f64, surprise: f64) -> SkillEstimate {
        let variance = estimate.variance();
        let mean = estimate.mean + (variance / spread) * surprise;

        // Shrink is strictly below 1 because the spread always contains this
        // member's variance plus the noise terms.
        let shrink = 1.0 - variance / (spread * spread);
        let floor = self.config.min_uncertainty;
        let uncertainty = (variance * shrink).sqrt().max(floor).min(estimate.uncertainty);

        SkillEstimate { mean, uncertainty }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rater() -> TeamRater {
        TeamRater::new(BayesConfig::default())
    }

    #[test]
    fn test_even_matchup_moves_both_sides() {
        let a = vec![SkillEstimate::fresh()];
        let b = vec![SkillEstimate::fresh()];

        let (winners, losers) = rater().rate_teams(&a, &b);

        assert!(winners[0].mean > a[0].mean);
        assert!(losers[0].mean < b[0].mean);
        // Equal beliefs, equal magnitude
        let gain = winners[0].mean - a[0].mean;
        let loss = b[0].mean - losers[0].mean;
        assert!((gain - loss).abs() < 1e-9);
    }

    #[test]
    fn test_upset_moves_more_than_expected_result() {
        let strong = vec![SkillEstimate::new(1800.0, 100.0)];
        let weak = vec![SkillEstimate::new(1400.0, 100.0)];

        let (upset_winners, _) = rater().rate_teams(&weak, &strong);
        let (expected_winners, _) = rater().rate_teams(&strong, &weak);

        let upset_gain = upset_winners[0].mean - 1400.0;
        let expected_gain = expected_winners[0].mean - 1800.0;
        assert!(upset_gain > expected_gain);
    }

    #[test]
    fn test_uncertain_player_moves_faster() {
        let fresh = vec![SkillEstimate::new(1500.0, 350.0)];
        let settled = vec![SkillEstimate::new(1500.0, 60.0)];
        let opponent = vec![SkillEstimate::new(1500.0, 200.0)];

        let (fresh_after, _) = rater().rate_teams(&fresh, &opponent);
        let (settled_after, _) = rater().rate_teams(&settled, &opponent);

        assert!(fresh_after[0].mean - 1500.0 > settled_after[0].mean - 1500.0);
    }

    #[test]
    fn test_uncertainty_shrinks_and_floors() {
        let config = BayesConfig::default();
        let rater = TeamRater::new(config);

        let mut team = vec![SkillEstimate::fresh()];
        let opponent = vec![SkillEstimate::fresh()];

        let mut last = team[0].uncertainty;
        for _ in 0..500 {
            let (updated, _) = rater.rate_teams(&team, &opponent);
            team = updated;
            assert!(team[0].uncertainty <= last);
            assert!(team[0].uncertainty >= config.min_uncertainty);
            last = team[0].uncertainty;
        }
        assert_eq!(team[0].uncertainty, config.min_uncertainty);
    }

    #[test]
    fn test_team_update_touches_every_member() {
        let winners = vec![
            SkillEstimate::new(1450.0, 300.0),
            SkillEstimate::new(1550.0, 120.0),
        ];
        let losers = vec![
            SkillEstimate::new(1500.0, 250.0),
            SkillEstimate::new(1500.0, 250.0),
        ];

        let (new_winners, new_losers) = rater().rate_teams(&winners, &losers);

        for (before, after) in winners.iter().zip(&new_winners) {
            assert!(after.mean > before.mean);
        }
        for (before, after) in losers.iter().zip(&new_losers) {
            assert!(after.mean < before.mean);
        }
        // The high-variance member moved further
        assert!(
            new_winners[0].mean - winners[0].mean > new_winners[1].mean - winners[1].mean
        );
    }

    #[test]
    fn test_rate_match_two_teams() {
        let teams = vec![
            vec![SkillEstimate::fresh(), SkillEstimate::fresh()],
            vec![SkillEstimate::fresh(), SkillEstimate::fresh()],
        ];

        let updated = rater().rate_match(&teams, 1);

        for member in &updated[1] {
            assert!(member.mean > SkillEstimate::DEFAULT_MEAN);
        }
        for member in &updated[0] {
            assert!(member.mean < SkillEstimate::DEFAULT_MEAN);
        }
    }

    #[test]
    fn test_rate_match_bad_index_is_identity() {
        let teams = vec![vec![SkillEstimate::fresh()], vec![SkillEstimate::fresh()]];
        let updated = rater().rate_match(&teams, 7);
        assert_eq!(updated, teams);
    }

    proptest! {
        #[test]
        fn prop_uncertainty_never_increases(
            mean_a in 1000.0f64..2000.0,
            mean_b in 1000.0f64..2000.0,
            sigma_a in 30.0f64..400.0,
            sigma_b in 30.0f64..400.0,
        ) {
            let a = vec![SkillEstimate::new(mean_a, sigma_a)];
            let b = vec![SkillEstimate::new(mean_b, sigma_b)];
            let (winners, losers) = rater().rate_teams(&a, &b);

            prop_assert!(winners[0].uncertainty <= sigma_a);
            prop_assert!(losers[0].uncertainty <= sigma_b);
            prop_assert!(winners[0].uncertainty >= BayesConfig::default().min_uncertainty);
        }

        #[test]
        fn prop_expected_team_outcomes_sum_to_one(
            mean_a in 1000.0f64..2000.0,
            mean_b in 1000.0f64..2000.0,
        ) {
            let a = vec![SkillEstimate::new(mean_a, 200.0)];
            let b = vec![SkillEstimate::new(mean_b, 200.0)];
            let r = rater();
            let total = r.expected_team_outcome(&a, &b) + r.expected_team_outcome(&b, &a);
            prop_assert!((total - 1.0).abs() < 1e-9);
        }
    }
}
