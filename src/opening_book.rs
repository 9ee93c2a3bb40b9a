//! Lazy, thread-safe cursor over starting positions (spec §4.7/§6, not
//! detailed in spec.md beyond "lazy sequence of starting positions").
//! Grounded on `original_source/src/pgn/pgn_reader.hpp`'s `Opening`/
//! `PgnReader`: a book entry is a FEN plus the moves already played from
//! it, extracted from either a FEN-per-line file or a PGN movetext file.

use std::path::Path;

use color_eyre::eyre::Context;
use shakmaty::san::San;
use shakmaty::uci::UciMove;
use shakmaty::{Chess, Position};
use std::sync::Mutex;
use tracing::{instrument, warn};

use crate::rules::STARTPOS;
use crate::Res;

/// One starting position: the FEN to set up plus the moves already played
/// from it (empty for a bare FEN book).
#[derive(Debug, Clone)]
pub struct Opening {
    pub fen: String,
    pub moves: Vec<String>,
}

impl Default for Opening {
    fn default() -> Self {
        Self {
            fen: STARTPOS.to_owned(),
            moves: Vec::new(),
        }
    }
}

/// A cycling, mutex-guarded cursor over a list of openings (spec §4.7: a
/// book with zero openings falls back to the standard starting position
/// repeated indefinitely).
pub struct OpeningBook {
    openings: Vec<Opening>,
    cursor: Mutex<usize>,
}

impl Default for OpeningBook {
    fn default() -> Self {
        Self::empty()
    }
}

impl OpeningBook {
    /// A book with no openings; every draw returns the standard starting
    /// position.
    pub fn empty() -> Self {
        Self {
            openings: Vec::new(),
            cursor: Mutex::new(0),
        }
    }

    /// Loads a book from `path`: `.pgn` files are parsed as movetext, any
    /// other extension is treated as one FEN per non-empty, non-comment
    /// line.
    #[instrument]
    pub fn load(path: &Path) -> Res<Self> {
        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading opening book {}", path.display()))?;

        let openings = if path.extension().and_then(|e| e.to_str()) == Some("pgn") {
            parse_pgn(&contents)
        } else {
            parse_fen_lines(&contents)
        };

        if openings.is_empty() {
            warn!(path = %path.display(), "opening book contained no usable openings");
        }

        Ok(Self {
            openings,
            cursor: Mutex::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.openings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.openings.is_empty()
    }

    /// Draws the next opening, cycling back to the start once exhausted.
    /// Index `i` (mod book length) is returned so callers can form a
    /// stable `opening_index` for pentanomial pairing even as rounds
    /// exceed the book's length.
    pub fn next(&self) -> (u32, Opening) {
        if self.openings.is_empty() {
            return (0, Opening::default());
        }
        let mut cursor = self.cursor.lock().expect("opening book mutex poisoned");
        let idx = *cursor;
        *cursor = (*cursor + 1) % self.openings.len();
        (idx as u32, self.openings[idx].clone())
    }
}

fn parse_fen_lines(contents: &str) -> Vec<Opening> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|fen| Opening {
            fen: fen.to_owned(),
            moves: Vec::new(),
        })
        .collect()
}

/// Parses whitespace-separated PGN movetext, one game per blank-line-
/// separated block, tolerating move numbers (`12.`) and result tokens.
fn parse_pgn(contents: &str) -> Vec<Opening> {
    contents
        .split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .filter_map(|block| parse_pgn_game(block))
        .collect()
}

fn parse_pgn_game(block: &str) -> Option<Opening> {
    let mut pos = Chess::default();
    let mut uci_moves = Vec::new();

    for token in block.split_whitespace() {
        if token.starts_with('[') || token.starts_with('{') {
            continue;
        }
        let token = token.trim_end_matches(['.', '!', '?']);
        if token.is_empty() || token.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            continue;
        }
        if matches!(token, "1-0" | "0-1" | "1/2-1/2" | "*") {
            continue;
        }
        let Ok(san) = San::from_ascii(token.as_bytes()) else {
            continue;
        };
        let Ok(mov) = san.to_move(&pos) else {
            warn!(token, "unrecognized PGN move, stopping opening early");
            break;
        };
        uci_moves.push(UciMove::from_standard(&mov).to_string());
        let Ok(next) = pos.clone().play(&mov) else {
            break;
        };
        pos = next;
    }

    if uci_moves.is_empty() {
        None
    } else {
        Some(Opening {
            fen: STARTPOS.to_owned(),
            moves: uci_moves,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_book_always_yields_the_standard_start() {
        let book = OpeningBook::empty();
        let (idx, opening) = book.next();
        assert_eq!(idx, 0);
        assert_eq!(opening.fen, STARTPOS);
        assert!(opening.moves.is_empty());
    }

    #[test]
    fn fen_lines_cycle_once_exhausted() {
        let book = OpeningBook {
            openings: parse_fen_lines("fen-a\nfen-b\n"),
            cursor: Mutex::new(0),
        };
        assert_eq!(book.next().1.fen, "fen-a");
        assert_eq!(book.next().1.fen, "fen-b");
        let (idx, third) = book.next();
        assert_eq!(idx, 0);
        assert_eq!(third.fen, "fen-a");
    }

    #[test]
    fn parses_a_simple_pgn_opening() {
        let openings = parse_pgn("1. e4 e5 2. Nf3 Nc6");
        assert_eq!(openings.len(), 1);
        assert_eq!(openings[0].moves, vec!["e2e4", "e7e5", "g1f3", "b8c6"]);
    }
}
