//! High-level UCI engine handle (spec §4.2): owns a [`ProcessController`]
//! and drives it through the handshake/search protocol, translating wire
//! lines into typed results.

pub mod proto;

use std::path::Path;
use std::time::{Duration, Instant};

use derivative::Derivative;
use thiserror::Error;
use tracing::{instrument, warn};

use crate::process::{IoError, ProcessController, ProcessRegistry, ReadStatus, SpawnError};
use crate::stop::StopFlag;
use proto::{Command, GoParams, Info, Msg};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error("engine did not respond in time")]
    Timeout,
    #[error("global stop signalled mid-search")]
    Interrupted,
}

/// The result of one `go` search: the chosen move, how long it took, and
/// every `info` line observed along the way (spec §3 `MoveData`).
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub best_move: String,
    pub ponder: Option<String>,
    pub elapsed: Duration,
    pub info: Vec<Info>,
}

/// A running UCI engine process plus the protocol state machine layered
/// over it.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct EngineHandle {
    #[derivative(Debug = "ignore")]
    proc: ProcessController,
    name: String,
    handshake_timeout: Duration,
}

impl EngineHandle {
    /// Spawns the engine but does not perform the `uci`/`uciok` handshake
    /// yet; call [`EngineHandle::start`] next.
    #[instrument(skip(registry))]
    pub async fn launch(
        command: &Path,
        args: &[String],
        working_dir: Option<&Path>,
        name: &str,
        handshake_timeout: Duration,
        registry: ProcessRegistry,
    ) -> Result<Self, EngineError> {
        let proc = ProcessController::spawn(command, args, working_dir, name, registry).await?;
        Ok(Self {
            proc,
            name: name.to_owned(),
            handshake_timeout,
        })
    }

    /// Runs the `uci` handshake and applies `options` via `setoption`
    /// (spec §4.2).
    #[instrument(skip(self, options, stop), fields(name = %self.name))]
    pub async fn start(
        &mut self,
        options: &[(String, String)],
        stop: &StopFlag,
    ) -> Result<(), EngineError> {
        self.proc.write_line(&Command::Uci.to_string()).await?;
        let mut lines = Vec::new();
        match self
            .proc
            .read_until("uciok", self.handshake_timeout, &mut lines, stop)
            .await
        {
            ReadStatus::Ok => {}
            ReadStatus::Timeout => return Err(EngineError::Timeout),
            ReadStatus::Interrupted => return Err(EngineError::Interrupted),
            ReadStatus::Err(err) => return Err(err.into()),
        }

        for (name, value) in options {
            let cmd = Command::SetOption {
                name: name.clone(),
                value: value.clone(),
            };
            self.proc.write_line(&cmd.to_string()).await?;
        }

        self.ping(stop).await
    }

    /// Sends `isready` and waits for `readyok` (spec §4.2).
    #[instrument(skip(self, stop), fields(name = %self.name))]
    async fn ping(&mut self, stop: &StopFlag) -> Result<(), EngineError> {
        self.proc.write_line(&Command::IsReady.to_string()).await?;
        let mut lines = Vec::new();
        match self
            .proc
            .read_until("readyok", self.handshake_timeout, &mut lines, stop)
            .await
        {
            ReadStatus::Ok => Ok(()),
            ReadStatus::Timeout => Err(EngineError::Timeout),
            ReadStatus::Interrupted => Err(EngineError::Interrupted),
            ReadStatus::Err(err) => Err(err.into()),
        }
    }

    /// Checks that the engine still answers `isready` within `timeout`,
    /// without treating a failure as fatal to the caller (spec §4.2
    /// `is_responsive`).
    pub async fn is_responsive(&mut self, timeout: Duration, stop: &StopFlag) -> bool {
        self.proc.write_line(&Command::IsReady.to_string()).await.is_ok()
            && {
                let mut lines = Vec::new();
                matches!(
                    self.proc.read_until("readyok", timeout, &mut lines, stop).await,
                    ReadStatus::Ok
                )
            }
    }

    /// Sends `ucinewgame` followed by a synchronizing `isready` (spec
    /// §4.2: engines may need time to reset internal state).
    pub async fn new_game(&mut self, stop: &StopFlag) -> Result<(), EngineError> {
        self.proc.write_line(&Command::NewGame.to_string()).await?;
        self.ping(stop).await
    }

    /// Sends the `position` command describing the game so far.
    pub async fn set_position(&mut self, fen: Option<String>, moves: Vec<String>) -> Result<(), EngineError> {
        let cmd = Command::Position { fen, moves };
        self.proc.write_line(&cmd.to_string()).await?;
        Ok(())
    }

    /// Sends `go` with `params` and waits for `bestmove`, bounded by
    /// `deadline` (if any) on top of the protocol-level handshake
    /// timeout. `Duration::ZERO` (the [`ProcessController::read_until`]
    /// sentinel for "no bound") is never passed here on purpose — a
    /// caller with no deadline should use [`TimeControl::Infinite`] and
    /// supply a generous deadline of its own (spec §4.3: the match
    /// runner always knows how long it is willing to wait).
    #[instrument(skip(self, stop), fields(name = %self.name))]
    pub async fn go(
        &mut self,
        params: GoParams,
        deadline: Duration,
        stop: &StopFlag,
    ) -> Result<SearchOutcome, EngineError> {
        let cmd = Command::Go(params);
        let start = Instant::now();
        self.proc.write_line(&cmd.to_string()).await?;

        let mut lines = Vec::new();
        let status = self
            .proc
            .read_until("bestmove", deadline, &mut lines, stop)
            .await;
        let elapsed = start.elapsed();

        match status {
            ReadStatus::Ok => {}
            ReadStatus::Timeout => return Err(EngineError::Timeout),
            ReadStatus::Interrupted => return Err(EngineError::Interrupted),
            ReadStatus::Err(err) => return Err(err.into()),
        }

        let mut info = Vec::new();
        let mut best_move = None;
        let mut ponder = None;
        for line in &lines {
            match Msg::parse(line) {
                Msg::Info(i) => info.push(i),
                Msg::BestMove { mv, ponder: p } => {
                    best_move = Some(mv);
                    ponder = p;
                }
                _ => {}
            }
        }

        let best_move = best_move.unwrap_or_else(|| {
            warn!(name = %self.name, "bestmove line missing move token");
            "0000".to_owned()
        });

        Ok(SearchOutcome {
            best_move,
            ponder,
            elapsed,
            info,
        })
    }

    /// Sends `quit` and kills the process if it does not exit promptly.
    #[instrument(skip(self, stop), fields(name = %self.name))]
    pub async fn shutdown(&mut self, stop: &StopFlag) {
        let _ = self.proc.write_line(&Command::Quit.to_string()).await;
        let mut lines = Vec::new();
        let _ = self
            .proc
            .read_until("\u{0}", Duration::from_millis(200), &mut lines, stop)
            .await;
        self.proc.kill().await;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_alive(&self) -> bool {
        self.proc.is_alive()
    }
}
