//! Round-robin scheduling and engine lifecycle management (spec §4.7).
//! No single `original_source` file maps onto a worker-pool-over-a-fixed-
//! size-concurrency-cap driver (the original's round robin is entangled
//! with its GUI-facing tournament object); this module is instead
//! composed from the primitives the rest of the crate already ported:
//! `cache.rs`'s `CachePool` for engine-process reuse, `affinity.rs` for
//! CPU bookkeeping, and `sprt.rs` for early stopping, driven through a
//! `FuturesUnordered` pool the way the teacher's `rev::dispatcher` bounds
//! concurrent work.

use std::path::Path;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{instrument, warn};

use crate::affinity::{AffinityAllocator, CpuSet};
use crate::cache::CachePool;
use crate::config::{Engine as EngineConfig, Tournament as TournamentConfig};
use crate::match_data::{GameResult as MatchResult, MatchData, Pairing};
use crate::match_runner::MatchRunner;
use crate::opening_book::{Opening, OpeningBook};
use crate::output::TournamentOutput;
use crate::participant::Participant;
use crate::process::ProcessRegistry;
use crate::sprt::{SprtDecider, SprtResult};
use crate::stats::{GameOutcome, MatchOutcome, StatsAggregator};
use crate::stop::StopFlag;
use crate::uci::EngineHandle;
use crate::Res;

/// Every unordered pair of engine indices in `0..n`.
fn pairs(n: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            out.push((i, j));
        }
    }
    out
}

fn to_outcome(result: MatchResult) -> GameOutcome {
    match result {
        MatchResult::Win => GameOutcome::Win,
        MatchResult::Lose => GameOutcome::Loss,
        MatchResult::Draw => GameOutcome::Draw,
    }
}

/// One scheduled game: which engines play which color, and the opening
/// drawn for it. Two consecutive entries per `(round_index, pair)` always
/// share `opening_index` with colors swapped, so [`StatsAggregator`] can
/// fill in the pentanomial bucket for the pair (spec §4.6).
struct MatchSpec {
    white_idx: usize,
    black_idx: usize,
    round_index: u32,
    opening_index: u32,
    game_index: u32,
    opening: Opening,
}

/// A best-effort CPU reservation, released automatically when dropped.
/// Acquisition failure degrades to "no reservation" rather than failing
/// the match, since nothing in this crate pins a process to the set it
/// describes (spec §4.8 scopes actual affinity syscalls out; see
/// `affinity.rs`'s module doc).
struct CpuLease<'a> {
    alloc: &'a AffinityAllocator,
    set: Option<CpuSet>,
}

impl<'a> CpuLease<'a> {
    fn acquire(alloc: &'a AffinityAllocator, size: usize) -> Self {
        Self {
            alloc,
            set: alloc.acquire(size),
        }
    }
}

impl Drop for CpuLease<'_> {
    fn drop(&mut self) {
        if let Some(set) = self.set.take() {
            self.alloc.release(&set);
        }
    }
}

/// Drives the whole tournament: builds the pairing schedule, runs
/// matches with bounded concurrency, accumulates statistics, and polls
/// SPRT after every completed match (spec §4.5/§4.7).
pub struct Scheduler<'a> {
    cfg: &'a TournamentConfig,
    book: OpeningBook,
    stats: StatsAggregator,
    sprt: SprtDecider,
    engines: CachePool<EngineHandle, String>,
    affinity: AffinityAllocator,
    registry: ProcessRegistry,
    output: &'a dyn TournamentOutput,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        cfg: &'a TournamentConfig,
        book: OpeningBook,
        output: &'a dyn TournamentOutput,
    ) -> Self {
        Self {
            cfg,
            book,
            stats: StatsAggregator::new(),
            sprt: SprtDecider::new(cfg.sprt.alpha, cfg.sprt.beta, cfg.sprt.elo0, cfg.sprt.elo1),
            engines: CachePool::new(),
            affinity: AffinityAllocator::detect(),
            registry: ProcessRegistry::new(),
            output,
        }
    }

    pub fn stats(&self) -> &StatsAggregator {
        &self.stats
    }

    fn build_schedule(&self, pairs: &[(usize, usize)]) -> Vec<MatchSpec> {
        let mut schedule = Vec::new();
        for round in 0..self.cfg.rounds {
            for &(i, j) in pairs {
                let (opening_index, opening) = self.book.next();
                schedule.push(MatchSpec {
                    white_idx: i,
                    black_idx: j,
                    round_index: round,
                    opening_index,
                    game_index: 0,
                    opening: opening.clone(),
                });
                schedule.push(MatchSpec {
                    white_idx: j,
                    black_idx: i,
                    round_index: round,
                    opening_index,
                    game_index: 1,
                    opening,
                });
            }
        }
        schedule
    }

    /// Runs every scheduled match to completion, or until `stop` fires —
    /// whichever comes first. Matches already in flight are allowed to
    /// finish; no new ones are started once `stop` is observed.
    #[instrument(skip(self, stop))]
    pub async fn run(&self, stop: &StopFlag) -> Res<()> {
        let pairs = pairs(self.cfg.engines.len());
        if pairs.is_empty() {
            warn!("fewer than two engines configured, nothing to schedule");
            return Ok(());
        }
        if self.cfg.sprt.enabled && self.cfg.engines.len() != 2 {
            warn!("SPRT is only meaningful for a two-engine tournament, ignoring");
        }

        let mut schedule = self.build_schedule(&pairs);
        schedule.reverse();

        let concurrency = self.cfg.concurrency.max(1);
        let mut pending = FuturesUnordered::new();
        for _ in 0..concurrency {
            let Some(spec) = schedule.pop() else { break };
            pending.push(self.play_one(spec, stop));
        }

        while let Some(outcome) = pending.next().await {
            if let Err(err) = outcome {
                warn!(%err, "match task failed");
            }
            if stop.is_set() {
                break;
            }
            let Some(spec) = schedule.pop() else { continue };
            pending.push(self.play_one(spec, stop));
        }

        Ok(())
    }

    async fn play_one(&self, spec: MatchSpec, stop: &StopFlag) -> Res<()> {
        let white_cfg = &self.cfg.engines[spec.white_idx];
        let black_cfg = &self.cfg.engines[spec.black_idx];

        let pairing = Pairing {
            engine_white: white_cfg.name.clone(),
            engine_black: black_cfg.name.clone(),
            round_index: spec.round_index,
            opening_index: spec.opening_index,
            game_index: spec.game_index,
        };
        self.output.on_match_started(&pairing);

        let _white_cpus = CpuLease::acquire(&self.affinity, white_cfg.threads);
        let _black_cpus = CpuLease::acquire(&self.affinity, black_cfg.threads);

        let mut white_lease = self.lease_engine(white_cfg, stop).await?;
        let mut black_lease = self.lease_engine(black_cfg, stop).await?;

        let mut attempt = 0;
        let match_data = loop {
            let data = self
                .play_match_once(&white_lease, &black_lease, white_cfg, black_cfg, &spec, stop)
                .await?;

            if !data.needs_restart || stop.is_set() || attempt >= self.cfg.retry_limit {
                break data;
            }

            if !(white_cfg.restart && black_cfg.restart) {
                warn!(
                    white = %white_cfg.name,
                    black = %black_cfg.name,
                    "transport failure, but restart is disabled for one of the engines, not retrying"
                );
                break data;
            }

            attempt += 1;
            warn!(
                white = %white_cfg.name,
                black = %black_cfg.name,
                attempt,
                "retrying match after a transport failure: killing and re-spawning both engines"
            );
            white_lease = self.respawn(white_lease, white_cfg, stop).await?;
            black_lease = self.respawn(black_lease, black_cfg, stop).await?;
        };

        if let Some(dir) = self.cfg.pgn_dir.clone() {
            self.write_pgn(&dir, &spec, &match_data).await;
        }

        self.stats.record(MatchOutcome {
            engine_a: white_cfg.name.clone(),
            engine_b: black_cfg.name.clone(),
            round_index: spec.round_index,
            opening_index: spec.opening_index,
            result_for_a: to_outcome(match_data.players.0.result),
        });

        self.output.on_match_completed(&pairing, &match_data);
        self.poll_sprt(white_cfg, black_cfg, stop);

        Ok(())
    }

    async fn play_match_once(
        &self,
        white_lease: &crate::cache::Lease<'_, EngineHandle, String>,
        black_lease: &crate::cache::Lease<'_, EngineHandle, String>,
        white_cfg: &EngineConfig,
        black_cfg: &EngineConfig,
        spec: &MatchSpec,
        stop: &StopFlag,
    ) -> Res<MatchData> {
        let mut white_guard = white_lease.value().lock().await;
        let mut black_guard = black_lease.value().lock().await;

        let _ = white_guard.new_game(stop).await;
        let _ = black_guard.new_game(stop).await;

        let white_participant = Participant::new(
            white_cfg.name.clone(),
            white_cfg.tc.clone().into_runtime(),
            Duration::from_millis(self.cfg.tolerance_ms),
        );
        let black_participant = Participant::new(
            black_cfg.name.clone(),
            black_cfg.tc.clone().into_runtime(),
            Duration::from_millis(self.cfg.tolerance_ms),
        );

        let runner = MatchRunner::new(self.cfg);
        runner
            .run(
                (&mut *white_guard, white_participant),
                (&mut *black_guard, black_participant),
                &spec.opening,
                stop,
            )
            .await
    }

    /// Evicts `lease`'s cache entry, shuts down the engine process behind
    /// it, and leases a fresh one in its place (spec §4.7 step 3: a
    /// restart kills and re-spawns both engines before the retry).
    async fn respawn<'p>(
        &'p self,
        lease: crate::cache::Lease<'p, EngineHandle, String>,
        cfg: &EngineConfig,
        stop: &StopFlag,
    ) -> Res<crate::cache::Lease<'p, EngineHandle, String>> {
        let handle = self.engines.evict(lease).await;
        handle.lock().await.shutdown(stop).await;
        self.lease_engine(cfg, stop).await
    }

    async fn lease_engine<'p>(
        &'p self,
        cfg: &EngineConfig,
        stop: &StopFlag,
    ) -> Res<crate::cache::Lease<'p, EngineHandle, String>> {
        let registry = self.registry.clone();
        let handshake_timeout = Duration::from_millis(self.cfg.handshake_timeout_ms);
        let stop = stop.clone();
        let command = cfg.command.clone();
        let args = cfg.args.clone();
        let dir = cfg.dir.clone();
        let name = cfg.name.clone();
        let options = cfg.options.clone();

        self.engines
            .get_entry(cfg.name.clone(), move || async move {
                let mut handle = EngineHandle::launch(
                    &command,
                    &args,
                    dir.as_deref(),
                    &name,
                    handshake_timeout,
                    registry,
                )
                .await
                .map_err(color_eyre::Report::from)?;
                handle
                    .start(&options, &stop)
                    .await
                    .map_err(color_eyre::Report::from)?;
                Ok(handle)
            })
            .await
    }

    /// Polls SPRT for the single engine pair, when the tournament is
    /// configured for exactly two engines (spec §4.5). A decisive result
    /// raises the global stop flag.
    fn poll_sprt(&self, white_cfg: &EngineConfig, black_cfg: &EngineConfig, stop: &StopFlag) {
        if !self.cfg.sprt.enabled || self.cfg.engines.len() != 2 || !self.sprt.is_valid() {
            return;
        }
        let Some(entry) = self.stats.entry(&white_cfg.name, &black_cfg.name) else {
            return;
        };
        match self.sprt.decide(entry.wins_lower, entry.draws, entry.wins_higher) {
            SprtResult::Continue => {}
            decision => {
                tracing::info!(?decision, sprt = %self.sprt, "SPRT reached a decision, stopping");
                stop.set();
            }
        }
    }

    async fn write_pgn(&self, dir: &Path, spec: &MatchSpec, match_data: &MatchData) {
        if tokio::fs::create_dir_all(dir).await.is_err() {
            warn!(dir = %dir.display(), "failed to create pgn output directory");
            return;
        }
        let path = dir.join(format!(
            "round{}_opening{}_game{}.pgn",
            spec.round_index, spec.opening_index, spec.game_index
        ));
        let pgn = crate::pgn::build(match_data, spec.round_index);
        if let Err(err) = tokio::fs::write(&path, pgn).await {
            warn!(%err, path = %path.display(), "failed to write pgn file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_enumerates_every_unordered_combination() {
        assert_eq!(pairs(3), vec![(0, 1), (0, 2), (1, 2)]);
        assert_eq!(pairs(1), Vec::<(usize, usize)>::new());
    }

    #[test]
    fn match_result_maps_onto_stats_outcome() {
        assert_eq!(to_outcome(MatchResult::Win), GameOutcome::Win);
        assert_eq!(to_outcome(MatchResult::Lose), GameOutcome::Loss);
        assert_eq!(to_outcome(MatchResult::Draw), GameOutcome::Draw);
    }
}
