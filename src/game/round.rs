//! Round lifecycle: waiting, countdown, playing, finished

use std::collections::BTreeSet;

use tracing::debug;

use crate::util::time::{tick_delta, SIMULATION_TPS};

use super::PlayerId;

/// Countdown length before play starts
pub const COUNTDOWN_TICKS: u32 = 3 * SIMULATION_TPS;

/// Round phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RoundPhase {
    /// Waiting for the round to be started
    Waiting,
    /// Countdown before play
    Countdown,
    /// Intents are accepted
    Playing,
    /// Round over, ranking available
    Finished,
}

#[derive(Debug, Clone)]
pub struct RoundState {
    phase: RoundPhase,
    round_number: u32,
    eliminated: BTreeSet<PlayerId>,
    countdown_remaining: u32,
    elapsed_ticks: u32,
}

impl RoundState {
    pub fn new() -> Self {
        Self {
            phase: RoundPhase::Waiting,
            round_number: 1,
            eliminated: BTreeSet::new(),
            countdown_remaining: COUNTDOWN_TICKS,
            elapsed_ticks: 0,
        }
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn round_number(&self) -> u32 {
        self.round_number
    }

    pub fn eliminated(&self) -> &BTreeSet<PlayerId> {
        &self.eliminated
    }

    pub fn is_eliminated(&self, id: &PlayerId) -> bool {
        self.eliminated.contains(id)
    }

    pub fn accepts_intents(&self) -> bool {
        self.phase == RoundPhase::Playing
    }

    /// Seconds spent in `Playing` this round
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed_ticks as f32 * tick_delta()
    }

    /// Waiting -> Countdown
    pub fn start(&mut self) -> bool {
        self.transition(RoundPhase::Waiting, RoundPhase::Countdown)
    }

    /// Advance one tick; returns the new phase if a transition happened.
    pub fn tick(&mut self) -> Option<RoundPhase> {
        match self.phase {
            RoundPhase::Countdown => {
                self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
                if self.countdown_remaining == 0 {
                    self.phase = RoundPhase::Playing;
                    return Some(RoundPhase::Playing);
                }
                None
            }
            RoundPhase::Playing => {
                self.elapsed_ticks += 1;
                None
            }
            RoundPhase::Waiting | RoundPhase::Finished => None,
        }
    }

    /// Countdown | Playing -> Finished
    pub fn finish(&mut self) -> bool {
        if matches!(self.phase, RoundPhase::Countdown | RoundPhase::Playing) {
            self.phase = RoundPhase::Finished;
            true
        } else {
            debug!(phase = ?self.phase, "Ignoring finish outside of a running round");
            false
        }
    }

    /// Finished -> Waiting, starting a new round
    pub fn reset(&mut self) -> bool {
        if !self.transition(RoundPhase::Finished, RoundPhase::Waiting) {
            return false;
        }
        self.round_number += 1;
        self.eliminated.clear();
        self.countdown_remaining = COUNTDOWN_TICKS;
        self.elapsed_ticks = 0;
        true
    }

    /// Record an elimination; false if already eliminated
    pub fn eliminate(&mut self, id: PlayerId) -> bool {
        self.eliminated.insert(id)
    }

    fn transition(&mut self, from: RoundPhase, to: RoundPhase) -> bool {
        if self.phase != from {
            debug!(phase = ?self.phase, target = ?to, "Ignoring invalid round transition");
            return false;
        }
        self.phase = to;
        true
    }
}

impl Default for RoundState {
    fn default() -> Self {
        Self::new()
    }
}

/// Next vehicle to spectate: the first live id after `current` in ascending
/// order, wrapping around. `current` itself is only chosen when it is the
/// sole live candidate.
pub fn next_spectate_target<I>(current: Option<PlayerId>, alive: I) -> Option<PlayerId>
where
    I: IntoIterator<Item = PlayerId>,
{
    let alive: BTreeSet<PlayerId> = alive.into_iter().collect();
    match current {
        Some(cur) => alive
            .range((std::ops::Bound::Excluded(cur), std::ops::Bound::Unbounded))
            .next()
            .or_else(|| alive.iter().next())
            .copied(),
        None => alive.iter().next().copied(),
    }
}

/// One row of the end-of-round ranking
#[derive(Debug, Clone, PartialEq)]
pub struct RankEntry {
    pub id: PlayerId,
    pub survival_time: f32,
    pub is_local: bool,
}

/// Rank by survival time, longest first, ties broken by id.
pub fn rank<I>(local: (PlayerId, f32), remotes: I) -> Vec<RankEntry>
where
    I: IntoIterator<Item = (PlayerId, f32)>,
{
    let mut entries: Vec<RankEntry> = remotes
        .into_iter()
        .filter(|(id, _)| *id != local.0)
        .map(|(id, survival_time)| RankEntry {
            id,
            survival_time,
            is_local: false,
        })
        .collect();
    entries.push(RankEntry {
        id: local.0,
        survival_time: local.1,
        is_local: true,
    });

    entries.sort_by(|a, b| {
        b.survival_time
            .total_cmp(&a.survival_time)
            .then_with(|| a.id.cmp(&b.id))
    });
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn id(n: u128) -> PlayerId {
        Uuid::from_u128(n)
    }

    #[test]
    fn full_lifecycle() {
        let mut round = RoundState::new();
        assert!(!round.accepts_intents());
        assert!(round.start());
        assert_eq!(round.phase(), RoundPhase::Countdown);

        for _ in 1..COUNTDOWN_TICKS {
            assert_eq!(round.tick(), None);
        }
        assert_eq!(round.tick(), Some(RoundPhase::Playing));
        assert!(round.accepts_intents());

        for _ in 0..SIMULATION_TPS {
            round.tick();
        }
        assert!((round.elapsed_secs() - 1.0).abs() < 1e-4);

        round.eliminate(id(1));
        assert!(round.finish());
        assert!(round.reset());
        assert_eq!(round.phase(), RoundPhase::Waiting);
        assert_eq!(round.round_number(), 2);
        assert!(round.eliminated().is_empty());
        assert_eq!(round.elapsed_secs(), 0.0);
    }

    #[test]
    fn transitions_do_not_go_backwards() {
        let mut round = RoundState::new();
        assert!(!round.finish());
        assert!(!round.reset());
        round.start();
        assert!(!round.start());
        assert!(!round.reset());
        assert_eq!(round.phase(), RoundPhase::Countdown);
    }

    #[test]
    fn elimination_is_recorded_once() {
        let mut round = RoundState::new();
        assert!(round.eliminate(id(4)));
        assert!(!round.eliminate(id(4)));
        assert!(round.is_eliminated(&id(4)));
    }

    #[test]
    fn spectate_cycles_in_id_order() {
        let alive = [id(3), id(1), id(2)];
        assert_eq!(next_spectate_target(None, alive), Some(id(1)));
        assert_eq!(next_spectate_target(Some(id(1)), alive), Some(id(2)));
        assert_eq!(next_spectate_target(Some(id(3)), alive), Some(id(1)));
    }

    #[test]
    fn spectate_skips_eliminated_current() {
        // id(2) was eliminated and is no longer a candidate
        assert_eq!(next_spectate_target(Some(id(2)), [id(1), id(3)]), Some(id(3)));
        assert_eq!(next_spectate_target(Some(id(2)), []), None);
    }

    #[test]
    fn ranking_merges_local_and_sorts_descending() {
        let ranking = rank((id(5), 12.0), [(id(1), 3.0), (id(2), 20.0), (id(3), 12.0)]);
        let order: Vec<_> = ranking.iter().map(|e| e.id).collect();
        assert_eq!(order, vec![id(2), id(3), id(5), id(1)]);
        assert!(ranking[2].is_local);
    }

    #[test]
    fn ranking_ignores_local_id_in_remote_set() {
        let ranking = rank((id(1), 1.0), [(id(1), 9.0)]);
        assert_eq!(ranking.len(), 1);
        assert_eq!(ranking[0].survival_time, 1.0);
    }
}
