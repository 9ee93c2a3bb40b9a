//! UCI wire protocol: outgoing command formatting and incoming line
//! parsing (spec §4.2/§6).

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use serde::Serialize;
use shakmaty::Color;

use crate::participant::TimeControl;

/// A command sent to the engine's stdin.
#[derive(Debug, Clone)]
pub enum Command {
    Uci,
    IsReady,
    NewGame,
    SetOption { name: String, value: String },
    Position { fen: Option<String>, moves: Vec<String> },
    Go(GoParams),
    Quit,
}

/// The `go` parameterization for one side to move (spec §4.2/§4.3).
#[derive(Debug, Clone, Default)]
pub struct GoParams {
    pub wtime: Option<Duration>,
    pub btime: Option<Duration>,
    pub winc: Option<Duration>,
    pub binc: Option<Duration>,
    pub moves_to_go: Option<u32>,
    pub movetime: Option<Duration>,
    pub depth: Option<u32>,
    pub nodes: Option<u64>,
    pub infinite: bool,
}

impl GoParams {
    /// Builds the `go` parameters for `color` to move, given its own time
    /// control and the opponent's remaining clock (spec §4.2).
    pub fn for_participant(
        color: Color,
        tc: &TimeControl,
        our_remaining: Duration,
        opponent_remaining: Duration,
        opponent_tc: &TimeControl,
    ) -> Self {
        match tc {
            TimeControl::Clock {
                increment,
                moves_to_go,
                ..
            } => {
                let opp_inc = match opponent_tc {
                    TimeControl::Clock { increment, .. } => *increment,
                    _ => Duration::ZERO,
                };
                let mut params = GoParams {
                    moves_to_go: *moves_to_go,
                    ..Default::default()
                };
                match color {
                    Color::White => {
                        params.wtime = Some(our_remaining);
                        params.winc = Some(*increment);
                        params.btime = Some(opponent_remaining);
                        params.binc = Some(opp_inc);
                    }
                    Color::Black => {
                        params.btime = Some(our_remaining);
                        params.binc = Some(*increment);
                        params.wtime = Some(opponent_remaining);
                        params.winc = Some(opp_inc);
                    }
                }
                params
            }
            TimeControl::MoveTime(d) => GoParams {
                movetime: Some(*d),
                ..Default::default()
            },
            TimeControl::FixedDepth(depth) => GoParams {
                depth: Some(*depth),
                ..Default::default()
            },
            TimeControl::FixedNodes(nodes) => GoParams {
                nodes: Some(*nodes),
                ..Default::default()
            },
            TimeControl::Infinite => GoParams {
                infinite: true,
                ..Default::default()
            },
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Command::Uci => write!(f, "uci"),
            Command::IsReady => write!(f, "isready"),
            Command::NewGame => write!(f, "ucinewgame"),
            Command::SetOption { name, value } => {
                write!(f, "setoption name {name} value {value}")
            }
            Command::Position { fen, moves } => {
                match fen {
                    Some(fen) => write!(f, "position fen {fen}")?,
                    None => write!(f, "position startpos")?,
                }
                if !moves.is_empty() {
                    write!(f, " moves")?;
                    for mv in moves {
                        write!(f, " {mv}")?;
                    }
                }
                Ok(())
            }
            Command::Go(params) => {
                write!(f, "go")?;
                if let Some(t) = params.wtime {
                    write!(f, " wtime {}", t.as_millis())?;
                }
                if let Some(t) = params.btime {
                    write!(f, " btime {}", t.as_millis())?;
                }
                if let Some(t) = params.winc {
                    write!(f, " winc {}", t.as_millis())?;
                }
                if let Some(t) = params.binc {
                    write!(f, " binc {}", t.as_millis())?;
                }
                if let Some(n) = params.moves_to_go {
                    write!(f, " movestogo {n}")?;
                }
                if let Some(d) = params.depth {
                    write!(f, " depth {d}")?;
                }
                if let Some(n) = params.nodes {
                    write!(f, " nodes {n}")?;
                }
                if let Some(t) = params.movetime {
                    write!(f, " movetime {}", t.as_millis())?;
                }
                if params.infinite {
                    write!(f, " infinite")?;
                }
                Ok(())
            }
            Command::Quit => write!(f, "quit"),
        }
    }
}

/// Engine evaluation of a position, discriminated by type (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Score {
    Cp(i64),
    Mate(i64),
}

impl Default for Score {
    fn default() -> Self {
        Score::Cp(0)
    }
}

impl Display for Score {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Score::Cp(cp) => write!(
                f,
                "{}{}.{:02}",
                if *cp < 0 { "-" } else { "+" },
                cp.abs() / 100,
                cp.abs() % 100
            ),
            Score::Mate(m) => write!(f, "{}M{}", if *m < 0 { "-" } else { "+" }, m.abs()),
        }
    }
}

/// One parsed `info` line (spec §4.2 parsing rule).
#[derive(Debug, Clone, Default)]
pub struct Info {
    pub depth: u32,
    pub seldepth: u32,
    pub nodes: u64,
    pub nps: u64,
    pub score: Option<Score>,
    pub pv: Vec<String>,
}

impl Info {
    /// Tokenizes an `info ...` line. Missing tokens default to zero (spec
    /// §4.2).
    pub fn parse(line: &str) -> Self {
        let mut info = Info::default();
        let mut tokens = line.split_whitespace().peekable();

        while let Some(tok) = tokens.next() {
            match tok {
                "depth" => info.depth = next_parsed(&mut tokens).unwrap_or(0),
                "seldepth" => info.seldepth = next_parsed(&mut tokens).unwrap_or(0),
                "nodes" => info.nodes = next_parsed(&mut tokens).unwrap_or(0),
                "nps" => info.nps = next_parsed(&mut tokens).unwrap_or(0),
                "score" => {
                    if let Some(kind) = tokens.next() {
                        let value: i64 = next_parsed(&mut tokens).unwrap_or(0);
                        info.score = Some(match kind {
                            "mate" => Score::Mate(value),
                            _ => Score::Cp(value),
                        });
                    }
                }
                "pv" => {
                    info.pv = tokens.by_ref().map(str::to_owned).collect();
                    break;
                }
                "string" => break,
                _ => {}
            }
        }

        info
    }
}

fn next_parsed<T: std::str::FromStr>(
    tokens: &mut std::iter::Peekable<std::str::SplitWhitespace<'_>>,
) -> Option<T> {
    tokens.next().and_then(|t| t.parse().ok())
}

/// A line received from the engine's stdout, classified by its leading
/// token (spec §6).
#[derive(Debug, Clone)]
pub enum Msg {
    Id { name: Option<String> },
    UciOk,
    ReadyOk,
    BestMove { mv: String, ponder: Option<String> },
    Info(Info),
    Other,
}

impl Msg {
    pub fn parse(line: &str) -> Self {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("id") => {
                let rest: Vec<&str> = tokens.collect();
                let name = rest
                    .iter()
                    .position(|t| *t == "name")
                    .map(|idx| rest[idx + 1..].join(" "));
                Msg::Id { name }
            }
            Some("uciok") => Msg::UciOk,
            Some("readyok") => Msg::ReadyOk,
            Some("bestmove") => {
                let mv = tokens.next().unwrap_or("0000").to_owned();
                let ponder = match tokens.next() {
                    Some("ponder") => tokens.next().map(str::to_owned),
                    _ => None,
                };
                Msg::BestMove { mv, ponder }
            }
            Some("info") => {
                let rest: &str = line.splitn(2, "info").nth(1).unwrap_or("").trim();
                Msg::Info(Info::parse(rest))
            }
            _ => Msg::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_position_with_moves() {
        let cmd = Command::Position {
            fen: None,
            moves: vec!["e2e4".into(), "e7e5".into()],
        };
        assert_eq!(cmd.to_string(), "position startpos moves e2e4 e7e5");
    }

    #[test]
    fn formats_go_clock() {
        let params = GoParams {
            wtime: Some(Duration::from_millis(60_000)),
            btime: Some(Duration::from_millis(55_000)),
            winc: Some(Duration::from_millis(500)),
            binc: Some(Duration::from_millis(500)),
            ..Default::default()
        };
        let cmd = Command::Go(params).to_string();
        assert!(cmd.contains("wtime 60000"));
        assert!(cmd.contains("btime 55000"));
        assert!(cmd.contains("winc 500"));
    }

    #[test]
    fn parses_info_line_with_missing_tokens() {
        let info = Info::parse("depth 12 score cp -34 nodes 1000 pv e2e4 e7e5");
        assert_eq!(info.depth, 12);
        assert_eq!(info.score, Some(Score::Cp(-34)));
        assert_eq!(info.nodes, 1000);
        assert_eq!(info.nps, 0);
        assert_eq!(info.pv, vec!["e2e4", "e7e5"]);
    }

    #[test]
    fn parses_bestmove_with_ponder() {
        match Msg::parse("bestmove e2e4 ponder e7e5") {
            Msg::BestMove { mv, ponder } => {
                assert_eq!(mv, "e2e4");
                assert_eq!(ponder.as_deref(), Some("e7e5"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
