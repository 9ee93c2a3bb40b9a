//! Tournament configuration (ambient stack, SPEC_FULL §2): TOML loaded via
//! `serde`, mirroring the teacher's `config.rs` plain-deserializable-struct
//! approach.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::participant::TimeControl as RuntimeTimeControl;

/// One engine's static configuration (spec §3 `EngineConfig`).
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Engine {
    pub name: String,
    pub command: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub options: Vec<(String, String)>,
    #[serde(default = "default_threads")]
    pub threads: usize,
    pub tc: TimeControl,
    /// Whether this engine is respawned on a recoverable match failure.
    #[serde(default = "default_true")]
    pub restart: bool,
}

fn default_threads() -> usize {
    1
}

fn default_true() -> bool {
    true
}

/// The on-disk shape of a time control (spec §3). Converted to
/// [`RuntimeTimeControl`] once the match runner needs per-ply arithmetic.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeControl {
    Movetime { ms: u64 },
    Depth { plies: u32 },
    Nodes { count: u64 },
    Clock {
        base_ms: u64,
        inc_ms: u64,
        #[serde(default)]
        moves_to_go: Option<u32>,
    },
    Infinite,
}

impl TimeControl {
    pub fn into_runtime(self) -> RuntimeTimeControl {
        match self {
            TimeControl::Movetime { ms } => RuntimeTimeControl::MoveTime(Duration::from_millis(ms)),
            TimeControl::Depth { plies } => RuntimeTimeControl::FixedDepth(plies),
            TimeControl::Nodes { count } => RuntimeTimeControl::FixedNodes(count),
            TimeControl::Clock {
                base_ms,
                inc_ms,
                moves_to_go,
            } => RuntimeTimeControl::Clock {
                base: Duration::from_millis(base_ms),
                increment: Duration::from_millis(inc_ms),
                moves_to_go,
            },
            TimeControl::Infinite => RuntimeTimeControl::Infinite,
        }
    }
}

/// Draw adjudication heuristic (spec §4.4 step 12).
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DrawAdjudication {
    #[serde(default)]
    pub enabled: bool,
    /// Ply count after which the heuristic starts observing scores.
    #[serde(default)]
    pub move_number: u32,
    /// `|score_cp|` at or below which a ply counts towards the streak.
    #[serde(default)]
    pub score: i64,
    /// Consecutive qualifying plies required to adjudicate a draw.
    #[serde(default)]
    pub move_count: u32,
}

/// Resign adjudication heuristic (spec §4.4 step 12, §9 resign note: the
/// losing side is the one whose *reported* score is at or below
/// `-score`, not merely `|score| >= score`).
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ResignAdjudication {
    #[serde(default)]
    pub enabled: bool,
    /// `|score_cp|` at or above which a ply counts towards the streak.
    #[serde(default)]
    pub score: i64,
    /// Consecutive qualifying plies required to adjudicate a resignation.
    #[serde(default)]
    pub move_count: u32,
}

/// SPRT configuration (spec §4.5). `enabled = false` (the default) wires
/// up an always-`Continue` decider, same as an all-zero configuration in
/// the original.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Sprt {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub alpha: f64,
    #[serde(default)]
    pub beta: f64,
    #[serde(default)]
    pub elo0: f64,
    #[serde(default)]
    pub elo1: f64,
}

/// Which [`crate::output::TournamentOutput`] implementation to drive the
/// tournament with (spec §9 "Polymorphism").
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Console,
    JsonLines,
}

/// Top-level tournament configuration, loaded from the file named by
/// `--config` (spec §9 ambient "Config file format"; §9 Open Question:
/// the persisted-state path is a config field rather than the original's
/// hardcoded `config.json`).
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Tournament {
    pub engines: Vec<Engine>,
    /// How many times the full round robin repeats; each repetition plays
    /// every opening from `book` twice (colors swapped).
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub book: Option<PathBuf>,
    #[serde(default)]
    pub chess960: bool,
    #[serde(default)]
    pub tolerance_ms: u64,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Deadline for the mid-match `isready` responsiveness probe (spec
    /// §4.4 step 2), independent of the per-move search deadline.
    #[serde(default = "default_responsiveness_timeout_ms")]
    pub responsiveness_timeout_ms: u64,
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    /// Whether an unexpected (non-game-semantic) error mid-match sets
    /// `needs_restart` and returns cleanly, rather than propagating out of
    /// the match runner (spec §4.4 "Recovery").
    #[serde(default = "default_true")]
    pub recover: bool,
    #[serde(default)]
    pub draw: DrawAdjudication,
    #[serde(default)]
    pub resign: ResignAdjudication,
    #[serde(default)]
    pub sprt: Sprt,
    #[serde(default)]
    pub output_format: OutputFormat,
    /// Where the tournament's JSON summary (config + engines + stats) is
    /// written on completion (or best-effort on interrupt). Configurable,
    /// unlike the original's fixed `config.json` (spec §9 Open Question).
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
    /// Directory PGN files are written into, one file per match. `None`
    /// disables PGN output.
    #[serde(default)]
    pub pgn_dir: Option<PathBuf>,
}

fn default_rounds() -> u32 {
    1
}

fn default_concurrency() -> usize {
    1
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_responsiveness_timeout_ms() -> u64 {
    2_000
}

fn default_retry_limit() -> u32 {
    2
}

fn default_output_path() -> PathBuf {
    PathBuf::from("tournament.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_tournament() {
        let toml = r#"
            [[engines]]
            name = "engine-a"
            command = "/usr/bin/true"
            tc = { kind = "movetime", ms = 100 }

            [[engines]]
            name = "engine-b"
            command = "/usr/bin/true"
            tc = { kind = "clock", base_ms = 60000, inc_ms = 500 }
        "#;
        let cfg: Tournament = toml::from_str(toml).unwrap();
        assert_eq!(cfg.engines.len(), 2);
        assert_eq!(cfg.concurrency, 1);
        assert_eq!(cfg.output_path, PathBuf::from("tournament.json"));
        assert!(!cfg.sprt.enabled);
    }

    #[test]
    fn rejects_unknown_time_control_kind() {
        let toml = r#"
            [[engines]]
            name = "engine-a"
            command = "/usr/bin/true"
            tc = { kind = "warp_speed" }
        "#;
        assert!(toml::from_str::<Tournament>(toml).is_err());
    }
}
