//! Rules-engine adapter (spec §6). Wraps [`shakmaty`] behind the interface
//! the match runner is written against, so the runner itself never touches
//! `shakmaty` types directly.

use std::fmt::{self, Display, Formatter};

use color_eyre::eyre::{eyre, Context};
use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::zobrist::{Zobrist64, ZobristHash};
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position};

use crate::Res;

pub const STARTPOS: &str = "rnbqkbnr/pppppppp/8/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Why [`Board::is_game_over`] says the game has ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOverReason {
    None,
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    ThreefoldRepetition,
    FiftyMoveRule,
}

impl Display for GameOverReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            GameOverReason::None => "none",
            GameOverReason::Checkmate => "checkmate",
            GameOverReason::Stalemate => "stalemate",
            GameOverReason::InsufficientMaterial => "insufficient material",
            GameOverReason::ThreefoldRepetition => "threefold repetition",
            GameOverReason::FiftyMoveRule => "fifty-move rule",
        };
        write!(f, "{s}")
    }
}

/// Outcome of the position as reported by [`Board::is_game_over`], from the
/// perspective of the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    Ongoing,
    Draw,
    LoseForSideToMove,
}

/// A chess position plus enough history to detect threefold repetition,
/// behind the narrow interface the rest of the crate needs.
#[derive(Debug, Clone)]
pub struct Board {
    pos: Chess,
    castling_mode: CastlingMode,
    history: Vec<u64>,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    pub fn new() -> Self {
        let mut board = Self {
            pos: Chess::default(),
            castling_mode: CastlingMode::Standard,
            history: Vec::new(),
        };
        board.push_history();
        board
    }

    fn push_history(&mut self) {
        let hash: Zobrist64 = self.pos.zobrist_hash(EnPassantMode::Legal);
        self.history.push(hash.0);
    }

    fn repetition_count(&self) -> usize {
        let Some(current) = self.history.last().copied() else {
            return 0;
        };
        self.history.iter().filter(|&&h| h == current).count()
    }

    /// Sets the position from a FEN string (or "startpos").
    pub fn set_fen(&mut self, fen: &str) -> Res<()> {
        let fen_str = if fen.trim() == "startpos" {
            STARTPOS
        } else {
            fen
        };
        let fen: Fen = fen_str.parse().wrap_err("invalid FEN")?;
        self.pos = fen
            .into_position(self.castling_mode)
            .wrap_err("FEN does not describe a legal position")?;
        self.history.clear();
        self.push_history();
        Ok(())
    }

    pub fn get_fen(&self) -> String {
        Fen::from_position(self.pos.clone(), EnPassantMode::Legal).to_string()
    }

    pub fn set_chess960(&mut self, enabled: bool) {
        self.castling_mode = if enabled {
            CastlingMode::Chess960
        } else {
            CastlingMode::Standard
        };
    }

    pub fn side_to_move(&self) -> Color {
        self.pos.turn()
    }

    pub fn legal_moves(&self) -> Vec<Move> {
        self.pos.legal_moves().into_iter().collect()
    }

    pub fn uci_to_move(&self, uci: &str) -> Res<Move> {
        let uci_move: UciMove = uci.parse().wrap_err("unparseable UCI move")?;
        uci_move
            .to_move(&self.pos)
            .map_err(|_| eyre!("'{uci}' is not a legal move in the current position"))
    }

    pub fn move_to_uci(&self, mov: &Move) -> String {
        UciMove::from_standard(mov).to_string()
    }

    pub fn make_move(&mut self, mov: &Move) -> Res<()> {
        self.pos = self
            .pos
            .clone()
            .play(mov)
            .map_err(|_| eyre!("illegal move applied to board"))?;
        self.push_history();
        Ok(())
    }

    /// Classifies whether the game has ended from the perspective of the
    /// side to move (spec §6: `is_game_over`).
    pub fn is_game_over(&self) -> (GameOverReason, GameResult) {
        if self.pos.is_checkmate() {
            return (GameOverReason::Checkmate, GameResult::LoseForSideToMove);
        }
        if self.pos.is_stalemate() {
            return (GameOverReason::Stalemate, GameResult::Draw);
        }
        if self.pos.is_insufficient_material() {
            return (GameOverReason::InsufficientMaterial, GameResult::Draw);
        }
        if self.pos.halfmoves() >= 100 {
            return (GameOverReason::FiftyMoveRule, GameResult::Draw);
        }
        if self.repetition_count() >= 3 {
            return (GameOverReason::ThreefoldRepetition, GameResult::Draw);
        }
        (GameOverReason::None, GameResult::Ongoing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startpos_is_not_game_over() {
        let board = Board::new();
        assert_eq!(
            board.is_game_over(),
            (GameOverReason::None, GameResult::Ongoing)
        );
        assert_eq!(board.legal_moves().len(), 20);
    }

    #[test]
    fn fools_mate_is_checkmate() {
        let mut board = Board::new();
        for uci in ["f2f3", "e7e5", "g2g4", "d8h4"] {
            let mov = board.uci_to_move(uci).unwrap();
            board.make_move(&mov).unwrap();
        }
        assert_eq!(
            board.is_game_over(),
            (GameOverReason::Checkmate, GameResult::LoseForSideToMove)
        );
    }

    #[test]
    fn illegal_move_is_rejected() {
        let board = Board::new();
        assert!(board.uci_to_move("e2e5").is_err());
    }

    #[test]
    fn fen_roundtrip() {
        let mut board = Board::new();
        let mov = board.uci_to_move("e2e4").unwrap();
        board.make_move(&mov).unwrap();
        let fen = board.get_fen();
        let mut other = Board::new();
        other.set_fen(&fen).unwrap();
        assert_eq!(other.get_fen(), fen);
    }
}
