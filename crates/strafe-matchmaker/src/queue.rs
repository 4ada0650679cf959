//! Matchmaking queue
//!
//! Holds waiting participants and forms matches on every evaluation tick.
//! Each entry's skill search range widens with wait time up to a cap; the
//! scan walks entries oldest-first (ties by insertion order, never random)
//! and greedily assembles the anchor plus its closest-in-skill eligible
//! candidates into full teams. Entries past the hard wait budget get one
//! widest-range attempt, then a timeout report. Matches below the quality
//! floor still ship; they are flagged, never blocked.
//!
//! All operations take an explicit `now` so the scheduler stays the only
//! owner of wall time.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tracing::{debug, info, warn};

use strafe_core::{MatchId, PlayerId, SimTime, StrafeError, StrafeResult, TicketId};

use crate::participant::{Participant, PoolKey, Region};

/// Hard cap on the per-team size accepted at enqueue.
pub const MAX_TEAM_SIZE: u8 = 16;

/// Queue tunables.
#[derive(Clone, Copy, Debug)]
pub struct QueueConfig {
    /// Search range at enqueue, in skill points.
    pub initial_range: f64,
    /// Range growth per second of waiting.
    pub expansion_rate: f64,
    /// Widest range an entry ever reaches.
    pub max_range: f64,
    /// Hard wait budget: past this the entry gets one widest-range attempt,
    /// then a timeout report.
    pub max_wait_time: Duration,
    /// Teams per match. Two for the standard head-to-head setup.
    pub team_count: u8,
    /// Scale constant of the quality curve `1 / (1 + gap / scale)`.
    pub quality_scale: f64,
    /// Quality below which a match is flagged for analytics.
    pub min_quality: f64,
    /// How many closed tickets to remember for cancel-race reporting.
    pub closed_ticket_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            initial_range: 100.0,
            expansion_rate: 10.0,
            max_range: 1000.0,
            max_wait_time: Duration::from_secs(120),
            team_count: 2,
            quality_scale: 100.0,
            min_quality: 0.5,
            closed_ticket_capacity: 4096,
        }
    }
}

/// A queued participant plus the queue-owned matching state.
#[derive(Clone, Debug)]
pub struct QueueEntry {
    pub ticket: TicketId,
    pub participant: Participant,
    pub entered_at: SimTime,
    /// Widens monotonically while queued; reset to the initial value for
    /// every newly (re)queued participant.
    pub current_search_range: f64,
}

impl QueueEntry {
    fn range_at(&self, now: SimTime, config: &QueueConfig) -> f64 {
        let waited = now.since(self.entered_at).as_secs_f64();
        (config.initial_range + waited * config.expansion_rate).min(config.max_range)
    }

    fn waited(&self, now: SimTime) -> Duration {
        now.since(self.entered_at)
    }
}

/// One side of a match.
#[derive(Clone, Debug)]
pub struct Team {
    pub members: Vec<Participant>,
    /// Average skill mean of the members.
    pub mean_skill: f64,
}

impl Team {
    fn from_members(members: Vec<Participant>) -> Self {
        let mean_skill = if members.is_empty() {
            0.0
        } else {
            members.iter().map(|p| p.skill.mean).sum::<f64>() / members.len() as f64
        };
        Team {
            members,
            mean_skill,
        }
    }
}

/// A formed match, ready for session creation.
#[derive(Clone, Debug)]
pub struct Match {
    pub id: MatchId,
    pub teams: Vec<Team>,
    /// `1 / (1 + gap / scale)` over the spread of team mean skills.
    pub quality: f64,
    /// True when quality landed under the configured floor. The match still
    /// ships; this is an analytics flag.
    pub below_quality_floor: bool,
    pub region: Region,
    pub team_size: u8,
    pub formed_at: SimTime,
}

impl Match {
    /// All participants across all teams.
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.teams.iter().flat_map(|t| t.members.iter())
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.participants().map(|p| p.player).collect()
    }
}

/// Report for an entry that exhausted its wait budget without a match.
#[derive(Clone, Debug)]
pub struct QueueTimeout {
    pub ticket: TicketId,
    pub player: PlayerId,
    pub waited: Duration,
}

/// Everything one evaluation tick produced.
#[derive(Clone, Debug, Default)]
pub struct TickOutcome {
    pub matches: Vec<Match>,
    pub timeouts: Vec<QueueTimeout>,
}

impl TickOutcome {
    pub fn is_quiet(&self) -> bool {
        self.matches.is_empty() && self.timeouts.is_empty()
    }
}

/// Queue counters, exported to the monitoring collaborator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub cancelled: u64,
    pub matches_formed: u64,
    pub participants_matched: u64,
    pub below_floor: u64,
    pub timeouts: u64,
    pub ticks: u64,
}

/// Why a ticket left the queue without being cancelled.
#[derive(Clone, Copy, Debug)]
enum ClosedReason {
    Matched(MatchId),
    TimedOut,
}

/// The waiting pool. Single logical owner: callers serialize access (the
/// scheduler wraps one instance in a mutex), so enqueue, cancel, and tick
/// are mutually exclusive by construction.
pub struct MatchQueue {
    config: QueueConfig,
    entries: HashMap<TicketId, QueueEntry>,
    next_ticket: u64,
    next_match: u64,
    /// Recently closed tickets, bounded, for cancel-race reporting.
    closed: HashMap<TicketId, ClosedReason>,
    closed_order: VecDeque<TicketId>,
    stats: QueueStats,
}

impl MatchQueue {
    pub fn new(config: QueueConfig) -> Self {
        debug_assert!(config.team_count >= 2, "a match needs at least two teams");
        MatchQueue {
            config,
            entries: HashMap::new(),
            next_ticket: 0,
            next_match: 0,
            closed: HashMap::new(),
            closed_order: VecDeque::new(),
            stats: QueueStats::default(),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read access to a waiting entry.
    pub fn entry(&self, ticket: TicketId) -> Option<&QueueEntry> {
        self.entries.get(&ticket)
    }

    /// Add a participant to the pool. The returned ticket is the handle for
    /// cancellation and the insertion-order tie-break.
    pub fn enqueue(&mut self, participant: Participant, now: SimTime) -> StrafeResult<TicketId> {
        if participant.team_size == 0 || participant.team_size > MAX_TEAM_SIZE {
            return Err(StrafeError::InvalidEnqueue(format!(
                "team size {} outside 1..={}",
                participant.team_size, MAX_TEAM_SIZE
            )));
        }
        if !participant.skill.mean.is_finite() || !participant.skill.uncertainty.is_finite() {
            return Err(StrafeError::InvalidEnqueue(
                "skill estimate must be finite".to_string(),
            ));
        }

        self.next_ticket += 1;
        let ticket = TicketId::new(self.next_ticket);
        let entry = QueueEntry {
            ticket,
            participant,
            entered_at: now,
            current_search_range: self.config.initial_range,
        };

        debug!(
            ticket = ticket.0,
            player = %entry.participant.player,
            pool = ?entry.participant.pool(),
            "enqueued"
        );
        self.entries.insert(ticket, entry);
        self.stats.enqueued += 1;
        Ok(ticket)
    }

    /// Remove a waiting entry by ticket, O(1).
    ///
    /// A cancellation racing a formed match resolves here: once the match
    /// is finalized the ticket is closed and the cancel loses with
    /// [`StrafeError::AlreadyMatched`].
    pub fn cancel(&mut self, ticket: TicketId) -> StrafeResult<()> {
        if self.entries.remove(&ticket).is_some() {
            self.stats.cancelled += 1;
            debug!(ticket = ticket.0, "cancelled");
            return Ok(());
        }

        match self.closed.get(&ticket) {
            Some(ClosedReason::Matched(_)) => Err(StrafeError::AlreadyMatched { ticket }),
            Some(ClosedReason::TimedOut) | None => Err(StrafeError::UnknownTicket { ticket }),
        }
    }

    /// One evaluation pass over the pool.
    ///
    /// Entries are scanned oldest-first. Each unconsumed entry anchors one
    /// assembly attempt against its pool; anchors past the wait budget try
    /// the widest allowed range and time out if even that cannot fill a
    /// match.
    pub fn tick(&mut self, now: SimTime) -> TickOutcome {
        self.stats.ticks += 1;
        let mut outcome = TickOutcome::default();

        // Widen ranges. The max() guards the monotonic invariant against a
        // caller handing in a stale `now`.
        for entry in self.entries.values_mut() {
            let fresh = entry.range_at(now, &self.config);
            entry.current_search_range = entry.current_search_range.max(fresh);
        }

        let mut order: Vec<TicketId> = self.entries.keys().copied().collect();
        order.sort_by_key(|t| {
            let e = &self.entries[t];
            (e.entered_at, e.ticket)
        });

        // Matched entries leave the map inside form_match, so a ticket from
        // `order` that was already consumed simply misses the lookup here.
        for anchor_ticket in order {
            let anchor = match self.entries.get(&anchor_ticket) {
                Some(e) => e.clone(),
                None => continue,
            };

            let needed =
                anchor.participant.team_size as usize * self.config.team_count as usize;
            let forced = anchor.waited(now) >= self.config.max_wait_time;

            let mut candidates = self.eligible_candidates(&anchor, forced);

            if candidates.len() + 1 >= needed {
                candidates.truncate(needed - 1);
                let group: Vec<QueueEntry> =
                    std::iter::once(anchor.clone()).chain(candidates).collect();
                outcome.matches.push(self.form_match(group, now));
            } else if forced {
                self.entries.remove(&anchor_ticket);
                self.remember_closed(anchor_ticket, ClosedReason::TimedOut);
                self.stats.timeouts += 1;
                let waited = anchor.waited(now);
                warn!(
                    ticket = anchor_ticket.0,
                    player = %anchor.participant.player,
                    waited_ms = waited.as_millis() as u64,
                    "queue timeout"
                );
                outcome.timeouts.push(QueueTimeout {
                    ticket: anchor_ticket,
                    player: anchor.participant.player,
                    waited,
                });
            }
            // Otherwise: not enough eligible candidates yet. The entry
            // stays queued; that is not an error.
        }

        outcome
    }

    /// Pool-mates of `anchor` within range, closest in skill first, ties to
    /// the older entry.
    fn eligible_candidates(&self, anchor: &QueueEntry, forced: bool) -> Vec<QueueEntry> {
        let pool: PoolKey = anchor.participant.pool();
        let anchor_skill = anchor.participant.skill.mean;

        let mut candidates: Vec<(f64, QueueEntry)> = self
            .entries
            .values()
            .filter(|e| e.ticket != anchor.ticket)
            .filter(|e| e.participant.pool() == pool)
            .filter_map(|e| {
                let gap = (e.participant.skill.mean - anchor_skill).abs();
                let window = if forced {
                    self.config.max_range
                } else {
                    anchor.current_search_range.min(e.current_search_range)
                };
                (gap <= window).then(|| (gap, e.clone()))
            })
            .collect();

        candidates.sort_by(|(gap_a, a), (gap_b, b)| {
            gap_a
                .partial_cmp(gap_b)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entered_at.cmp(&b.entered_at))
                .then_with(|| a.ticket.cmp(&b.ticket))
        });

        candidates.into_iter().map(|(_, e)| e).collect()
    }

    /// Turn an assembled group into a match: sort by skill, deal to teams in
    /// alternation, score quality, retire the entries.
    fn form_match(&mut self, mut group: Vec<QueueEntry>, now: SimTime) -> Match {
        group.sort_by(|a, b| {
            a.participant
                .skill
                .mean
                .partial_cmp(&b.participant.skill.mean)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.ticket.cmp(&b.ticket))
        });

        let team_count = self.config.team_count as usize;
        let region = group[0].participant.region;
        let team_size = group[0].participant.team_size;

        self.next_match += 1;
        let id = MatchId::new(self.next_match);

        let mut members: Vec<Vec<Participant>> = vec![Vec::new(); team_count];
        for (idx, entry) in group.iter().enumerate() {
            members[idx % team_count].push(entry.participant.clone());
        }

        for entry in &group {
            self.entries.remove(&entry.ticket);
            self.remember_closed(entry.ticket, ClosedReason::Matched(id));
        }

        let teams: Vec<Team> = members.into_iter().map(Team::from_members).collect();
        let spread = team_mean_spread(&teams);
        let quality = 1.0 / (1.0 + spread / self.config.quality_scale);
        let below_quality_floor = quality < self.config.min_quality;

        self.stats.matches_formed += 1;
        self.stats.participants_matched += group.len() as u64;
        if below_quality_floor {
            self.stats.below_floor += 1;
            warn!(
                match_id = ?id,
                quality,
                floor = self.config.min_quality,
                "match below quality floor"
            );
        }
        info!(
            match_id = ?id,
            quality,
            players = group.len(),
            region = region.name(),
            "match formed"
        );

        Match {
            id,
            teams,
            quality,
            below_quality_floor,
            region,
            team_size,
            formed_at: now,
        }
    }

    fn remember_closed(&mut self, ticket: TicketId, reason: ClosedReason) {
        if self.closed_order.len() >= self.config.closed_ticket_capacity {
            if let Some(evicted) = self.closed_order.pop_front() {
                self.closed.remove(&evicted);
            }
        }
        self.closed_order.push_back(ticket);
        self.closed.insert(ticket, reason);
    }
}

/// Spread between the strongest and weakest team averages.
fn team_mean_spread(teams: &[Team]) -> f64 {
    let mut min = f64::MAX;
    let mut max = f64::MIN;
    for team in teams {
        min = min.min(team.mean_skill);
        max = max.max(team.mean_skill);
    }
    if teams.is_empty() {
        0.0
    } else {
        max - min
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use strafe_rating::SkillEstimate;

    fn duel_config() -> QueueConfig {
        QueueConfig {
            initial_range: 50.0,
            expansion_rate: 10.0,
            max_range: 500.0,
            max_wait_time: Duration::from_secs(30),
            team_count: 2,
            ..QueueConfig::default()
        }
    }

    fn solo(player: u64, mean: f64) -> Participant {
        Participant::new(PlayerId::new(player), SkillEstimate::new(mean, 100.0))
    }

    #[test]
    fn test_two_close_players_match_on_first_tick() {
        let mut queue = MatchQueue::new(duel_config());
        let now = SimTime::ZERO;

        queue.enqueue(solo(1, 1500.0), now).unwrap();
        queue.enqueue(solo(2, 1520.0), now).unwrap();

        let outcome = queue.tick(now);
        assert_eq!(outcome.matches.len(), 1);
        assert!(outcome.timeouts.is_empty());

        let m = &outcome.matches[0];
        assert_eq!(m.teams.len(), 2);
        assert_eq!(m.teams[0].members.len(), 1);
        assert_eq!(m.teams[1].members.len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_solo_times_out_after_wait_budget() {
        let mut queue = MatchQueue::new(duel_config());
        let ticket = queue.enqueue(solo(1, 1500.0), SimTime::ZERO).unwrap();

        // Simulate a 30s wait in 1s ticks: quiet until the budget expires.
        for secs in 1..30 {
            let outcome = queue.tick(SimTime::from_secs_f64(secs as f64));
            assert!(outcome.is_quiet(), "tick at {secs}s should be quiet");
        }

        let outcome = queue.tick(SimTime::from_secs_f64(30.0));
        assert_eq!(outcome.timeouts.len(), 1);
        assert_eq!(outcome.timeouts[0].ticket, ticket);
        assert!(queue.is_empty());
        assert_eq!(queue.stats().timeouts, 1);
    }

    #[test]
    fn test_range_expansion_reaches_distant_player() {
        let mut queue = MatchQueue::new(duel_config());
        let now = SimTime::ZERO;

        // 200 apart: outside the initial 50, inside the range after ~15s
        // of expansion at 10/s (50 + 150 = 200) on both entries.
        queue.enqueue(solo(1, 1500.0), now).unwrap();
        queue.enqueue(solo(2, 1700.0), now).unwrap();

        assert!(queue.tick(SimTime::from_secs_f64(5.0)).matches.is_empty());
        let outcome = queue.tick(SimTime::from_secs_f64(15.0));
        assert_eq!(outcome.matches.len(), 1);
    }

    #[test]
    fn test_search_range_monotonic_and_resets_on_reenqueue() {
        let mut queue = MatchQueue::new(duel_config());
        let ticket = queue.enqueue(solo(1, 1500.0), SimTime::ZERO).unwrap();

        let mut last = queue.entry(ticket).unwrap().current_search_range;
        for secs in [1.0, 3.0, 10.0, 20.0] {
            queue.tick(SimTime::from_secs_f64(secs));
            let range = queue.entry(ticket).unwrap().current_search_range;
            assert!(range >= last);
            last = range;
        }
        assert!(last > duel_config().initial_range);

        // Re-enqueue starts over at the initial range, never inherited.
        queue.cancel(ticket).unwrap();
        let again = queue
            .enqueue(solo(1, 1500.0), SimTime::from_secs_f64(20.0))
            .unwrap();
        assert_eq!(
            queue.entry(again).unwrap().current_search_range,
            duel_config().initial_range
        );
    }

    #[test]
    fn test_range_capped_at_max() {
        let config = QueueConfig {
            max_wait_time: Duration::from_secs(1_000_000),
            ..duel_config()
        };
        let mut queue = MatchQueue::new(config);
        let ticket = queue.enqueue(solo(1, 1500.0), SimTime::ZERO).unwrap();

        queue.tick(SimTime::from_secs_f64(10_000.0));
        assert_eq!(
            queue.entry(ticket).unwrap().current_search_range,
            config.max_range
        );
    }

    #[test]
    fn test_cancel_then_unknown() {
        let mut queue = MatchQueue::new(duel_config());
        let ticket = queue.enqueue(solo(1, 1500.0), SimTime::ZERO).unwrap();

        assert!(queue.cancel(ticket).is_ok());
        assert!(matches!(
            queue.cancel(ticket),
            Err(StrafeError::UnknownTicket { .. })
        ));
    }

    #[test]
    fn test_cancel_after_match_reports_already_matched() {
        let mut queue = MatchQueue::new(duel_config());
        let now = SimTime::ZERO;
        let ticket = queue.enqueue(solo(1, 1500.0), now).unwrap();
        queue.enqueue(solo(2, 1510.0), now).unwrap();

        let outcome = queue.tick(now);
        assert_eq!(outcome.matches.len(), 1);

        assert!(matches!(
            queue.cancel(ticket),
            Err(StrafeError::AlreadyMatched { .. })
        ));
    }

    #[test]
    fn test_cancelled_entry_invisible_to_next_tick() {
        let mut queue = MatchQueue::new(duel_config());
        let now = SimTime::ZERO;
        let ticket = queue.enqueue(solo(1, 1500.0), now).unwrap();
        queue.enqueue(solo(2, 1510.0), now).unwrap();

        queue.cancel(ticket).unwrap();
        let outcome = queue.tick(now);
        assert!(outcome.matches.is_empty());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_partial_teams_never_ship() {
        let config = QueueConfig {
            initial_range: 500.0,
            ..duel_config()
        };
        let mut queue = MatchQueue::new(config);
        let now = SimTime::ZERO;

        // Team size 2 needs 4 players; 3 are not enough.
        for i in 0..3 {
            let p = solo(i + 1, 1500.0).with_team_size(2);
            queue.enqueue(p, now).unwrap();
        }

        assert!(queue.tick(now).matches.is_empty());
        assert_eq!(queue.len(), 3);

        let p = solo(4, 1500.0).with_team_size(2);
        queue.enqueue(p, now).unwrap();
        let outcome = queue.tick(now);
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].teams[0].members.len(), 2);
        assert_eq!(outcome.matches[0].teams[1].members.len(), 2);
    }

    #[test]
    fn test_oldest_entry_anchors_first() {
        let mut queue = MatchQueue::new(duel_config());

        // Three compatible players. The two oldest must pair; the newest
        // stays queued.
        let first = queue.enqueue(solo(1, 1500.0), SimTime::ZERO).unwrap();
        let second = queue
            .enqueue(solo(2, 1500.0), SimTime::from_millis(10))
            .unwrap();
        let third = queue
            .enqueue(solo(3, 1500.0), SimTime::from_millis(20))
            .unwrap();

        let outcome = queue.tick(SimTime::from_millis(30));
        assert_eq!(outcome.matches.len(), 1);
        let ids = outcome.matches[0].player_ids();
        assert!(ids.contains(&PlayerId::new(1)));
        assert!(ids.contains(&PlayerId::new(2)));
        assert!(queue.entry(third).is_some());
        assert!(queue.entry(first).is_none());
        assert!(queue.entry(second).is_none());
    }

    #[test]
    fn test_insertion_order_breaks_time_ties() {
        let mut queue = MatchQueue::new(duel_config());
        let now = SimTime::ZERO;

        // Same entry time, same skill distance from the anchor: the earlier
        // ticket wins the slot.
        queue.enqueue(solo(1, 1500.0), now).unwrap();
        queue.enqueue(solo(2, 1520.0), now).unwrap();
        queue.enqueue(solo(3, 1520.0), now).unwrap();

        let outcome = queue.tick(now);
        assert_eq!(outcome.matches.len(), 1);
        let ids = outcome.matches[0].player_ids();
        assert!(ids.contains(&PlayerId::new(1)));
        assert!(ids.contains(&PlayerId::new(2)));
        assert!(!ids.contains(&PlayerId::new(3)));
    }

    #[test]
    fn test_closest_in_skill_wins_the_slot() {
        let mut queue = MatchQueue::new(duel_config());

        let _anchor = queue.enqueue(solo(1, 1500.0), SimTime::ZERO).unwrap();
        // Both eligible, 40 vs 10 away; the closer one is taken even though
        // it queued later.
        queue
            .enqueue(solo(2, 1540.0), SimTime::from_millis(5))
            .unwrap();
        queue
            .enqueue(solo(3, 1510.0), SimTime::from_millis(10))
            .unwrap();

        let outcome = queue.tick(SimTime::from_millis(20));
        let ids = outcome.matches[0].player_ids();
        assert!(ids.contains(&PlayerId::new(1)));
        assert!(ids.contains(&PlayerId::new(3)));
    }

    #[test]
    fn test_pools_isolate_region_and_team_size() {
        let mut queue = MatchQueue::new(duel_config());
        let now = SimTime::ZERO;

        queue
            .enqueue(solo(1, 1500.0).with_region(Region::Europe), now)
            .unwrap();
        queue
            .enqueue(solo(2, 1500.0).with_region(Region::Asia), now)
            .unwrap();
        queue
            .enqueue(solo(3, 1500.0).with_team_size(2), now)
            .unwrap();
        queue
            .enqueue(solo(4, 1500.0).with_team_size(3), now)
            .unwrap();

        assert!(queue.tick(now).matches.is_empty());
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn test_alternating_deal_and_quality() {
        let config = QueueConfig {
            initial_range: 500.0,
            quality_scale: 100.0,
            ..duel_config()
        };
        let mut queue = MatchQueue::new(config);
        let now = SimTime::ZERO;

        for (player, mean) in [(1, 1000.0), (2, 1100.0), (3, 1200.0), (4, 1300.0)] {
            queue
                .enqueue(solo(player, mean).with_team_size(2), now)
                .unwrap();
        }

        let outcome = queue.tick(now);
        let m = &outcome.matches[0];

        // Sorted deal: [1000, 1200] vs [1100, 1300]
        assert_eq!(m.teams[0].mean_skill, 1100.0);
        assert_eq!(m.teams[1].mean_skill, 1200.0);
        let expected_quality = 1.0 / (1.0 + 100.0 / 100.0);
        assert!((m.quality - expected_quality).abs() < 1e-12);
    }

    #[test]
    fn test_below_floor_match_ships_flagged() {
        let config = QueueConfig {
            initial_range: 500.0,
            min_quality: 0.9,
            ..duel_config()
        };
        let mut queue = MatchQueue::new(config);
        let now = SimTime::ZERO;

        queue.enqueue(solo(1, 1500.0), now).unwrap();
        queue.enqueue(solo(2, 1900.0), now).unwrap();

        let outcome = queue.tick(now);
        assert_eq!(outcome.matches.len(), 1);
        assert!(outcome.matches[0].below_quality_floor);
        assert_eq!(queue.stats().below_floor, 1);
    }

    #[test]
    fn test_forced_widest_range_beats_timeout() {
        let config = QueueConfig {
            initial_range: 50.0,
            expansion_rate: 0.0,
            max_range: 500.0,
            max_wait_time: Duration::from_secs(30),
            ..duel_config()
        };
        let mut queue = MatchQueue::new(config);

        // 400 apart: never eligible at the frozen 50 range, but inside the
        // widest range once the anchor's budget expires.
        queue.enqueue(solo(1, 1500.0), SimTime::ZERO).unwrap();
        queue.enqueue(solo(2, 1900.0), SimTime::ZERO).unwrap();

        assert!(queue.tick(SimTime::from_secs_f64(29.0)).is_quiet());
        let outcome = queue.tick(SimTime::from_secs_f64(30.0));
        assert_eq!(outcome.matches.len(), 1);
        assert!(outcome.timeouts.is_empty());
    }

    #[test]
    fn test_invalid_enqueue_rejected() {
        let mut queue = MatchQueue::new(duel_config());
        let bad_size = solo(1, 1500.0).with_team_size(0);
        assert!(matches!(
            queue.enqueue(bad_size, SimTime::ZERO),
            Err(StrafeError::InvalidEnqueue(_))
        ));

        let bad_skill =
            Participant::new(PlayerId::new(2), SkillEstimate::new(f64::NAN, 100.0));
        assert!(matches!(
            queue.enqueue(bad_skill, SimTime::ZERO),
            Err(StrafeError::InvalidEnqueue(_))
        ));
    }

    #[test]
    fn test_no_participant_in_two_matches_per_tick() {
        let config = QueueConfig {
            initial_range: 500.0,
            ..duel_config()
        };
        let mut queue = MatchQueue::new(config);
        let now = SimTime::ZERO;

        for i in 0..6 {
            queue.enqueue(solo(i + 1, 1500.0 + i as f64), now).unwrap();
        }

        let outcome = queue.tick(now);
        assert_eq!(outcome.matches.len(), 3);

        let mut seen = HashSet::new();
        for m in &outcome.matches {
            for id in m.player_ids() {
                assert!(seen.insert(id), "{id:?} appeared in two matches");
            }
        }
    }

    proptest! {
        /// Whatever the pool looks like, no player lands in two matches and
        /// every shipped match carries exactly full teams.
        #[test]
        fn prop_players_unique_and_teams_full(
            means in proptest::collection::vec(1000.0f64..2000.0, 0..24),
            ticks in 1u32..8,
        ) {
            let mut queue = MatchQueue::new(duel_config());
            for (i, mean) in means.iter().enumerate() {
                queue.enqueue(solo(i as u64 + 1, *mean), SimTime::ZERO).unwrap();
            }

            let mut seen = HashSet::new();
            for t in 0..ticks {
                let outcome = queue.tick(SimTime::from_secs_f64(t as f64 * 5.0));
                for m in &outcome.matches {
                    for team in &m.teams {
                        prop_assert_eq!(team.members.len(), m.team_size as usize);
                    }
                    for id in m.player_ids() {
                        prop_assert!(seen.insert(id), "{:?} matched twice", id);
                    }
                }
            }
        }
    }
}
