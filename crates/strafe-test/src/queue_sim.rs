//! Matchmaking scenario drivers
//!
//! [`QueueSim`] wraps a [`MatchQueue`] with a hand-driven clock so tests
//! spell out wait time instead of sleeping through it. [`LadderSim`] builds
//! on it for whole-population runs: every round the ladder enqueues
//! everyone, plays the formed matches out with outcomes drawn from each
//! player's hidden true skill, and folds the rating updates back in. Rating
//! convergence then becomes an end-to-end assertion instead of a formula
//! check.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use strafe_core::{Clock, ManualClock, PlayerId, StrafeError, StrafeResult, TicketId};
use strafe_matchmaker::{Match, MatchQueue, Participant, QueueConfig, TickOutcome};
use strafe_rating::{BayesConfig, SkillEstimate, TeamRater};

/// A match queue on simulated time.
pub struct QueueSim {
    queue: MatchQueue,
    clock: ManualClock,
    tick: Duration,
}

impl QueueSim {
    pub fn new(config: QueueConfig, tick: Duration) -> Self {
        QueueSim {
            queue: MatchQueue::new(config),
            clock: ManualClock::new(),
            tick,
        }
    }

    pub fn queue(&self) -> &MatchQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut MatchQueue {
        &mut self.queue
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Enqueue a solo participant with the given skill mean and the default
    /// uncertainty.
    pub fn join(&mut self, player: u64, mean: f64) -> StrafeResult<TicketId> {
        let participant = Participant::new(
            PlayerId::new(player),
            SkillEstimate::new(mean, SkillEstimate::DEFAULT_UNCERTAINTY),
        );
        self.join_participant(participant)
    }

    pub fn join_participant(&mut self, participant: Participant) -> StrafeResult<TicketId> {
        self.queue.enqueue(participant, self.clock.now())
    }

    /// Advance one tick interval and evaluate the queue.
    pub fn tick_once(&mut self) -> TickOutcome {
        self.clock.advance(self.tick);
        self.queue.tick(self.clock.now())
    }

    /// Tick until a match forms. A queue timeout before any match is the
    /// error the waiting participant would see.
    pub fn first_match(&mut self, max_ticks: u32) -> StrafeResult<Option<Match>> {
        for _ in 0..max_ticks {
            let TickOutcome { matches, timeouts } = self.tick_once();
            if let Some(found) = matches.into_iter().next() {
                return Ok(Some(found));
            }
            if let Some(timeout) = timeouts.into_iter().next() {
                return Err(StrafeError::QueueTimeout {
                    ticket: timeout.ticket,
                });
            }
        }
        Ok(None)
    }
}

/// One ladder player: a hidden true skill and the engine's current belief.
#[derive(Clone, Debug)]
pub struct LadderEntry {
    pub player: PlayerId,
    pub true_mean: f64,
    pub estimate: SkillEstimate,
    pub games: u32,
}

/// A population of solo players grinding 1v1 rounds.
pub struct LadderSim {
    sim: QueueSim,
    rater: TeamRater,
    entries: Vec<LadderEntry>,
    rng: StdRng,
}

impl LadderSim {
    /// `count` players with true means evenly spread across `span` around
    /// 1600, all starting from the fresh default estimate.
    pub fn new(count: usize, span: f64, seed: u64) -> Self {
        let step = span / (count.max(2) - 1) as f64;
        let entries = (0..count)
            .map(|i| LadderEntry {
                player: PlayerId::new(i as u64 + 1),
                true_mean: 1600.0 - span / 2.0 + step * i as f64,
                estimate: SkillEstimate::fresh(),
                games: 0,
            })
            .collect();
        LadderSim {
            sim: QueueSim::new(QueueConfig::default(), Duration::from_secs(1)),
            rater: TeamRater::new(BayesConfig::default()),
            entries,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn entries(&self) -> &[LadderEntry] {
        &self.entries
    }

    /// Enqueue everyone, play out what the queue pairs within `max_ticks`,
    /// and clear stragglers so the next round starts clean. Returns the
    /// number of matches played.
    pub fn play_round(&mut self, max_ticks: u32) -> StrafeResult<u32> {
        let mut tickets = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let participant = Participant::new(entry.player, entry.estimate);
            tickets.push(self.sim.join_participant(participant)?);
        }

        let mut played = 0;
        for _ in 0..max_ticks {
            let outcome = self.sim.tick_once();
            for found in outcome.matches {
                self.resolve(&found);
                played += 1;
            }
            if self.sim.queue().is_empty() {
                break;
            }
        }

        for ticket in tickets {
            match self.sim.queue_mut().cancel(ticket) {
                Ok(())
                | Err(StrafeError::AlreadyMatched { .. })
                | Err(StrafeError::UnknownTicket { .. }) => {}
                Err(other) => return Err(other),
            }
        }
        Ok(played)
    }

    /// Draw the outcome from true skill, then update beliefs from it.
    fn resolve(&mut self, found: &Match) {
        let (Some(side_a), Some(side_b)) = (found.teams.first(), found.teams.get(1)) else {
            return;
        };
        let a_players: Vec<PlayerId> = side_a.members.iter().map(|p| p.player).collect();
        let b_players: Vec<PlayerId> = side_b.members.iter().map(|p| p.player).collect();

        let truth = |players: &[PlayerId], entries: &[LadderEntry]| -> Vec<SkillEstimate> {
            players
                .iter()
                .filter_map(|p| entries.iter().find(|e| e.player == *p))
                .map(|e| SkillEstimate::new(e.true_mean, 50.0))
                .collect()
        };
        let belief = |players: &[PlayerId], entries: &[LadderEntry]| -> Vec<SkillEstimate> {
            players
                .iter()
                .filter_map(|p| entries.iter().find(|e| e.player == *p))
                .map(|e| e.estimate)
                .collect()
        };

        let p_a = self
            .rater
            .expected_team_outcome(&truth(&a_players, &self.entries), &truth(&b_players, &self.entries));
        let a_wins = self.rng.gen::<f64>() < p_a;

        let a_belief = belief(&a_players, &self.entries);
        let b_belief = belief(&b_players, &self.entries);
        let (winners, losers, new_winners, new_losers) = if a_wins {
            let (w, l) = self.rater.rate_teams(&a_belief, &b_belief);
            (&a_players, &b_players, w, l)
        } else {
            let (w, l) = self.rater.rate_teams(&b_belief, &a_belief);
            (&b_players, &a_players, w, l)
        };

        for (player, fresh) in winners.iter().zip(new_winners) {
            self.record(*player, fresh);
        }
        for (player, fresh) in losers.iter().zip(new_losers) {
            self.record(*player, fresh);
        }
    }

    fn record(&mut self, player: PlayerId, estimate: SkillEstimate) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.player == player) {
            entry.estimate = estimate;
            entry.games += 1;
        }
    }
}
