//! Output sink (spec §9 "Polymorphism"), ported from
//! `original_source/src/matchmaking/output/output_factory.hpp`'s
//! `IOutput`/`OutputFactory` choosing between `Fastchess`/`Cutechess`
//! formats. Here the choice is between a human-readable `tracing`-backed
//! console sink and a machine-readable JSON-lines sink, selected at
//! startup and passed by reference into the scheduler.

use serde::Serialize;
use tracing::info;

use crate::match_data::{MatchData, Pairing};
use crate::stats::PairStats;

/// The capability set a tournament driver needs from its output sink
/// (spec §9): match-level progress events plus a final summary.
pub trait TournamentOutput: Send + Sync {
    fn on_match_started(&self, pairing: &Pairing);
    fn on_match_completed(&self, pairing: &Pairing, match_data: &MatchData);
    fn on_tournament_completed(&self, stats: &[PairStats]);
}

/// Terse one-line-per-event console output via `tracing::info!`, matching
/// the crate's standardization on `tracing` rather than raw stdout.
#[derive(Debug, Default)]
pub struct ConsoleOutput;

impl TournamentOutput for ConsoleOutput {
    fn on_match_started(&self, pairing: &Pairing) {
        info!(
            white = %pairing.engine_white,
            black = %pairing.engine_black,
            round = pairing.round_index,
            opening = pairing.opening_index,
            "match started"
        );
    }

    fn on_match_completed(&self, pairing: &Pairing, match_data: &MatchData) {
        let (white, black) = &match_data.players;
        info!(
            white = %pairing.engine_white,
            black = %pairing.engine_black,
            white_result = %white.result,
            black_result = %black.result,
            termination = %match_data.termination,
            reason = %match_data.reason,
            plies = match_data.moves.len(),
            "match completed"
        );
    }

    fn on_tournament_completed(&self, stats: &[PairStats]) {
        for pair in stats {
            info!(
                a = %pair.a,
                b = %pair.b,
                wins_a = pair.entry.wins_lower,
                draws = pair.entry.draws,
                wins_b = pair.entry.wins_higher,
                "final standing"
            );
        }
    }
}

/// One JSON object per event, for machine consumption by an external UI
/// (matching the original's PGN/JSON persisted-state split, spec §6).
/// Each event is emitted as its own JSON-lines record to stdout.
#[derive(Debug, Default)]
pub struct JsonLinesOutput;

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Event<'a> {
    MatchStarted {
        white: &'a str,
        black: &'a str,
        round: u32,
        opening: u32,
    },
    MatchCompleted {
        white: &'a str,
        black: &'a str,
        #[serde(flatten)]
        match_data: &'a MatchData,
    },
    TournamentCompleted {
        stats: &'a [PairStats],
    },
}

impl JsonLinesOutput {
    fn emit(&self, event: &Event) {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(err) => tracing::error!(%err, "failed to serialize output event"),
        }
    }
}

impl TournamentOutput for JsonLinesOutput {
    fn on_match_started(&self, pairing: &Pairing) {
        self.emit(&Event::MatchStarted {
            white: &pairing.engine_white,
            black: &pairing.engine_black,
            round: pairing.round_index,
            opening: pairing.opening_index,
        });
    }

    fn on_match_completed(&self, pairing: &Pairing, match_data: &MatchData) {
        self.emit(&Event::MatchCompleted {
            white: &pairing.engine_white,
            black: &pairing.engine_black,
            match_data,
        });
    }

    fn on_tournament_completed(&self, stats: &[PairStats]) {
        self.emit(&Event::TournamentCompleted { stats });
    }
}
