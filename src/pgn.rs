//! PGN rendering for a finished match (spec §6 "PGN/epd output
//! formatting"), ported from `original_source/src/pgn/pgn_builder.hpp`'s
//! `PgnBuilder`. A match is always a single linear line of moves, so this
//! is materially simpler than the teacher's `knowledge::Pgn`, which
//! renders a branching analysis tree (`PosPath`/transposition
//! bookkeeping) that a match never needs.

use std::fmt::Write as _;

use chrono::Utc;
use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Position};
use tracing::warn;

use crate::match_data::{GameResult, MatchData, MatchTermination};
use crate::rules::STARTPOS;

/// Renders `match_data` as one PGN game, tagged with `round`.
pub fn build(match_data: &MatchData, round: u32) -> String {
    let mut pgn = String::new();
    write_tags(&mut pgn, match_data, round);
    pgn.push('\n');
    write_moves(&mut pgn, match_data);
    writeln!(pgn, "{}", result_tag(match_data)).ok();
    pgn.push('\n');
    pgn
}

fn write_tags(pgn: &mut String, match_data: &MatchData, round: u32) {
    let (white, black) = &match_data.players;
    writeln!(pgn, "[Event \"Engine tournament\"]").ok();
    writeln!(pgn, "[Site \"?\"]").ok();
    writeln!(pgn, "[Date \"{}\"]", Utc::now().format("%Y.%m.%d")).ok();
    writeln!(pgn, "[Round \"{round}\"]").ok();
    writeln!(pgn, "[White \"{}\"]", white.name).ok();
    writeln!(pgn, "[Black \"{}\"]", black.name).ok();
    writeln!(pgn, "[Result \"{}\"]", result_tag(match_data)).ok();
    writeln!(pgn, "[Termination \"{}\"]", match_data.termination).ok();
    if match_data.opening_fen != STARTPOS {
        writeln!(pgn, "[SetUp \"1\"]").ok();
        writeln!(pgn, "[FEN \"{}\"]", match_data.opening_fen).ok();
    }
}

fn result_tag(match_data: &MatchData) -> &'static str {
    let (white, _) = &match_data.players;
    match white.result {
        GameResult::Win => "1-0",
        GameResult::Lose => "0-1",
        GameResult::Draw => "1/2-1/2",
    }
}

fn write_moves(pgn: &mut String, match_data: &MatchData) {
    let fen: Fen = match match_data.opening_fen.parse() {
        Ok(fen) => fen,
        Err(err) => {
            warn!(%err, fen = %match_data.opening_fen, "unparseable opening FEN, skipping move text");
            return;
        }
    };
    let mut pos: Chess = match fen.into_position(CastlingMode::Standard) {
        Ok(pos) => pos,
        Err(err) => {
            warn!(%err, "opening FEN is not a legal position, skipping move text");
            return;
        }
    };

    for (ply, move_data) in match_data.moves.iter().enumerate() {
        let uci: UciMove = match move_data.mv.parse() {
            Ok(uci) => uci,
            Err(_) => break,
        };
        let mov = match uci.to_move(&pos) {
            Ok(mov) => mov,
            Err(_) => break,
        };

        if ply % 2 == 0 {
            write!(pgn, "{}. ", ply / 2 + 1).ok();
        }
        write!(pgn, "{} ", San::from_move(&pos, &mov)).ok();

        pos = match pos.play(&mov) {
            Ok(next) => next,
            Err(_) => break,
        };
    }

    if !match_data.reason.is_empty() {
        write!(pgn, "{{{}}} ", match_data.reason).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_data::{MoveData, PlayerInfo};
    use crate::uci::proto::Score;
    use chrono::Utc;
    use shakmaty::Color;
    use std::time::Duration;

    fn sample_match() -> MatchData {
        MatchData {
            opening_fen: STARTPOS.to_owned(),
            moves: vec![
                MoveData {
                    mv: "e2e4".into(),
                    score: Score::Cp(20),
                    elapsed_ms: 5,
                    depth: 10,
                    seldepth: 10,
                    nodes: 100,
                    nps: 1000,
                },
                MoveData {
                    mv: "e7e5".into(),
                    score: Score::Cp(-10),
                    elapsed_ms: 5,
                    depth: 10,
                    seldepth: 10,
                    nodes: 100,
                    nps: 1000,
                },
            ],
            players: (
                PlayerInfo {
                    name: "engine-a".into(),
                    color: Color::White,
                    result: GameResult::Win,
                },
                PlayerInfo {
                    name: "engine-b".into(),
                    color: Color::Black,
                    result: GameResult::Lose,
                },
            ),
            start_time: Utc::now(),
            end_time: Utc::now(),
            duration: Duration::from_secs(1),
            termination: MatchTermination::Natural,
            reason: "engine-a wins by checkmate".into(),
            needs_restart: false,
        }
    }

    #[test]
    fn renders_move_text_and_result() {
        let pgn = build(&sample_match(), 1);
        assert!(pgn.contains("[Result \"1-0\"]"));
        assert!(pgn.contains("1. e4 e5"));
        assert!(pgn.contains("engine-a wins by checkmate"));
    }
}
