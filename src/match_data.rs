//! Per-match result types (spec §3: `MoveData`, `MatchData`,
//! `MatchTermination`, `Pairing`, `DrawTracker`/`ResignTracker`).

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shakmaty::Color;

use crate::uci::proto::Score;

/// One ply of a match (spec §3 `MoveData`). Missing engine-reported fields
/// default to zero, matching the original's `MoveData` constructor.
#[derive(Debug, Clone, Serialize)]
pub struct MoveData {
    /// The move in wire (UCI) notation.
    #[serde(rename = "move")]
    pub mv: String,
    pub score: Score,
    pub elapsed_ms: u64,
    pub depth: u32,
    pub seldepth: u32,
    pub nodes: u64,
    pub nps: u64,
}

/// A finished game's result for one side, from its own perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GameResult {
    Win,
    Lose,
    Draw,
}

impl GameResult {
    /// The opposite result, used to keep the two `PlayerInfo`s in a match
    /// symmetric (spec §8 invariant 4).
    pub fn flip(self) -> Self {
        match self {
            GameResult::Win => GameResult::Lose,
            GameResult::Lose => GameResult::Win,
            GameResult::Draw => GameResult::Draw,
        }
    }
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameResult::Win => write!(f, "win"),
            GameResult::Lose => write!(f, "loss"),
            GameResult::Draw => write!(f, "draw"),
        }
    }
}

/// One engine's identity and outcome within a finished match.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerInfo {
    pub name: String,
    #[serde(with = "color_as_str")]
    pub color: Color,
    pub result: GameResult,
}

mod color_as_str {
    use serde::Serializer;
    use shakmaty::Color;

    pub fn serialize<S: Serializer>(color: &Color, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(match color {
            Color::White => "white",
            Color::Black => "black",
        })
    }
}

/// Why a match ended (spec §3 `MatchTermination`). `None` only appears as
/// the initial value before a match has completed; a returned [`MatchData`]
/// always carries one of the other variants (spec §8 invariant 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchTermination {
    Natural,
    Adjudication,
    Timeout,
    Disconnect,
    IllegalMove,
    Interrupt,
    None,
}

impl fmt::Display for MatchTermination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchTermination::Natural => "natural",
            MatchTermination::Adjudication => "adjudication",
            MatchTermination::Timeout => "timeout",
            MatchTermination::Disconnect => "disconnect",
            MatchTermination::IllegalMove => "illegal move",
            MatchTermination::Interrupt => "interrupt",
            MatchTermination::None => "none",
        };
        write!(f, "{s}")
    }
}

/// One pairing dispatched by the scheduler: an unordered engine pair, the
/// round/opening indices that key pentanomial pairing, and which side
/// plays white (spec §3 `Pairing`).
#[derive(Debug, Clone)]
pub struct Pairing {
    pub engine_white: String,
    pub engine_black: String,
    pub round_index: u32,
    pub opening_index: u32,
    /// Index of this game within its game-pair (0 or 1); the second game
    /// of a pair always has colors swapped relative to the first.
    pub game_index: u32,
}

/// Consecutive-ply counters for the draw/resign adjudication heuristics
/// (spec §3 `DrawTracker`/`ResignTracker`). Reset to zero whenever the
/// triggering condition breaks.
#[derive(Debug, Clone, Copy, Default)]
pub struct DrawTracker {
    pub streak: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResignTracker {
    pub streak: u32,
}

/// The full record of one finished (or aborted) match (spec §3
/// `MatchData`).
#[derive(Debug, Clone, Serialize)]
pub struct MatchData {
    pub opening_fen: String,
    pub moves: Vec<MoveData>,
    pub players: (PlayerInfo, PlayerInfo),
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    pub termination: MatchTermination,
    pub reason: String,
    pub needs_restart: bool,
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_flip_is_an_involution() {
        for r in [GameResult::Win, GameResult::Lose, GameResult::Draw] {
            assert_eq!(r.flip().flip(), r);
        }
        assert_eq!(GameResult::Win.flip(), GameResult::Lose);
        assert_eq!(GameResult::Draw.flip(), GameResult::Draw);
    }
}
