//! Thread-safe running statistics per unordered engine pair, including the
//! pentanomial histogram over paired (color-swapped) games (spec §3
//! `StatsEntry`, §4.6).

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

/// A single game's result from one engine's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    Win,
    Draw,
    Loss,
}

/// An unordered engine pair, always stored with the lexicographically
/// smaller id first so `(a, b)` and `(b, a)` key the same entry.
pub type PairKey = (String, String);

fn normalize(a: &str, b: &str) -> PairKey {
    if a <= b {
        (a.to_owned(), b.to_owned())
    } else {
        (b.to_owned(), a.to_owned())
    }
}

/// Running totals for one unordered pair, from the perspective of
/// whichever id sorts first (the pair's "lower" id).
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatsEntry {
    pub wins_lower: u64,
    pub draws: u64,
    pub wins_higher: u64,
    /// Index 0..=4: `LL`, `LD|DL`, `LW|DD|WL`, `DW|WD`, `WW`, always from
    /// the lower id's perspective across both games of a pair.
    pub pentanomial: [u64; 5],
}

impl StatsEntry {
    pub fn games(&self) -> u64 {
        self.wins_lower + self.draws + self.wins_higher
    }
}

/// One finished match, as reported by the scheduler.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub engine_a: String,
    pub engine_b: String,
    pub round_index: u32,
    pub opening_index: u32,
    /// `engine_a`'s result.
    pub result_for_a: GameOutcome,
}

struct Pending {
    entry: GameOutcome,
}

/// Accumulates [`StatsEntry`] per unordered engine pair and pairs up the
/// two color-swapped games from the same opening into pentanomial
/// buckets (spec §4.6).
#[derive(Default)]
pub struct StatsAggregator {
    totals: Mutex<HashMap<PairKey, StatsEntry>>,
    pending: Mutex<HashMap<(PairKey, u32, u32), Pending>>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one finished match. The totals update independently of
    /// pairing; the pentanomial bucket fills in only once both games of
    /// the `(round_index, opening_index)` pair have reported (spec §4.6,
    /// §8 invariant 8: commutative regardless of arrival order).
    pub fn record(&self, outcome: MatchOutcome) {
        let key = normalize(&outcome.engine_a, &outcome.engine_b);
        let from_lower = if key.0 == outcome.engine_a {
            outcome.result_for_a
        } else {
            invert(outcome.result_for_a)
        };

        {
            let mut totals = self.totals.lock().expect("stats mutex poisoned");
            let entry = totals.entry(key.clone()).or_default();
            match from_lower {
                GameOutcome::Win => entry.wins_lower += 1,
                GameOutcome::Draw => entry.draws += 1,
                GameOutcome::Loss => entry.wins_higher += 1,
            }
        }

        let pending_key = (key.clone(), outcome.round_index, outcome.opening_index);
        let mut pending = self.pending.lock().expect("stats mutex poisoned");
        match pending.remove(&pending_key) {
            None => {
                pending.insert(pending_key, Pending { entry: from_lower });
            }
            Some(first) => {
                drop(pending);
                let bucket = pentanomial_bucket(first.entry, from_lower);
                let mut totals = self.totals.lock().expect("stats mutex poisoned");
                totals.entry(key).or_default().pentanomial[bucket] += 1;
            }
        }
    }

    pub fn entry(&self, a: &str, b: &str) -> Option<StatsEntry> {
        let key = normalize(a, b);
        self.totals
            .lock()
            .expect("stats mutex poisoned")
            .get(&key)
            .copied()
    }

    pub fn snapshot(&self) -> HashMap<PairKey, StatsEntry> {
        self.totals.lock().expect("stats mutex poisoned").clone()
    }

    /// A flat, JSON-friendly snapshot (spec §6 "Persisted state": the
    /// tournament JSON embeds the full stats map; `serde_json` cannot key
    /// a map by a tuple, so each pair becomes one record instead).
    pub fn snapshot_json(&self) -> Vec<PairStats> {
        self.snapshot()
            .into_iter()
            .map(|((a, b), entry)| PairStats { a, b, entry })
            .collect()
    }
}

/// One [`StatsEntry`] paired with the two engine names it describes, for
/// serialization (see [`StatsAggregator::snapshot_json`]).
#[derive(Debug, Clone, Serialize)]
pub struct PairStats {
    pub a: String,
    pub b: String,
    #[serde(flatten)]
    pub entry: StatsEntry,
}

fn invert(outcome: GameOutcome) -> GameOutcome {
    match outcome {
        GameOutcome::Win => GameOutcome::Loss,
        GameOutcome::Loss => GameOutcome::Win,
        GameOutcome::Draw => GameOutcome::Draw,
    }
}

fn pentanomial_bucket(first: GameOutcome, second: GameOutcome) -> usize {
    use GameOutcome::*;
    match (first, second) {
        (Loss, Loss) => 0,
        (Loss, Draw) | (Draw, Loss) => 1,
        (Loss, Win) | (Draw, Draw) | (Win, Loss) => 2,
        (Draw, Win) | (Win, Draw) => 3,
        (Win, Win) => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(a: &str, b: &str, round: u32, opening: u32, result: GameOutcome) -> MatchOutcome {
        MatchOutcome {
            engine_a: a.to_owned(),
            engine_b: b.to_owned(),
            round_index: round,
            opening_index: opening,
            result_for_a: result,
        }
    }

    #[test]
    fn totals_accumulate_from_lower_ids_perspective() {
        let stats = StatsAggregator::new();
        stats.record(outcome("bravo", "alpha", 0, 0, GameOutcome::Win));
        let entry = stats.entry("alpha", "bravo").unwrap();
        assert_eq!(entry.wins_higher, 1, "bravo > alpha, so bravo's win counts as wins_higher");
    }

    #[test]
    fn pair_of_games_fills_one_pentanomial_bucket() {
        let stats = StatsAggregator::new();
        stats.record(outcome("alpha", "bravo", 0, 0, GameOutcome::Win));
        stats.record(outcome("alpha", "bravo", 0, 0, GameOutcome::Win));
        let entry = stats.entry("alpha", "bravo").unwrap();
        assert_eq!(entry.pentanomial, [0, 0, 0, 0, 1]);
    }

    #[test]
    fn arrival_order_does_not_change_totals() {
        let forward = StatsAggregator::new();
        forward.record(outcome("alpha", "bravo", 0, 0, GameOutcome::Win));
        forward.record(outcome("alpha", "bravo", 0, 1, GameOutcome::Draw));

        let backward = StatsAggregator::new();
        backward.record(outcome("alpha", "bravo", 0, 1, GameOutcome::Draw));
        backward.record(outcome("alpha", "bravo", 0, 0, GameOutcome::Win));

        assert_eq!(
            forward.entry("alpha", "bravo").unwrap().wins_lower,
            backward.entry("alpha", "bravo").unwrap().wins_lower
        );
    }

    #[test]
    fn distinct_openings_stay_separate_pairs_until_both_games_report() {
        let stats = StatsAggregator::new();
        stats.record(outcome("alpha", "bravo", 0, 0, GameOutcome::Win));
        stats.record(outcome("alpha", "bravo", 0, 1, GameOutcome::Loss));
        let entry = stats.entry("alpha", "bravo").unwrap();
        assert_eq!(entry.pentanomial, [0, 0, 0, 0, 0]);
    }
}
