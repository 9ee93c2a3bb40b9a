//! Time control bookkeeping for one side of a match (spec §4.3).

use std::time::Duration;

/// How an engine's thinking time for a single `go` is bounded.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeControl {
    /// Fixed time per move, independent of a running clock.
    MoveTime(Duration),
    /// Search to a fixed depth, clock bookkeeping not applicable.
    FixedDepth(u32),
    /// Search a fixed node budget, clock bookkeeping not applicable.
    FixedNodes(u64),
    /// A classical chess clock: `base` time plus `increment` per move,
    /// optionally resetting every `moves_to_go` moves.
    Clock {
        base: Duration,
        increment: Duration,
        moves_to_go: Option<u32>,
    },
    /// No bound; the match runner enforces its own wall-clock ceiling.
    Infinite,
}

impl TimeControl {
    /// Whether this time control tracks a depleting clock at all. Fixed
    /// depth/node/infinite searches never time-forfeit.
    pub fn is_clock(&self) -> bool {
        matches!(self, TimeControl::Clock { .. } | TimeControl::MoveTime(_))
    }
}

/// One side of a match: its remaining clock and the tolerance applied
/// before a late `bestmove` is ruled a time forfeit (spec §4.3).
#[derive(Debug, Clone)]
pub struct Participant {
    pub name: String,
    pub time_control: TimeControl,
    pub remaining: Duration,
    pub tolerance: Duration,
    pub moves_until_reset: Option<u32>,
}

impl Participant {
    pub fn new(name: impl Into<String>, time_control: TimeControl, tolerance: Duration) -> Self {
        let remaining = match &time_control {
            TimeControl::Clock { base, .. } => *base,
            TimeControl::MoveTime(d) => *d,
            _ => Duration::ZERO,
        };
        let moves_until_reset = match &time_control {
            TimeControl::Clock { moves_to_go, .. } => *moves_to_go,
            _ => None,
        };
        Self {
            name: name.into(),
            time_control,
            remaining,
            tolerance,
            moves_until_reset,
        }
    }

    /// The wall-clock deadline allowed for the engine's next move: its
    /// remaining time plus the configured tolerance, or `None` when the
    /// time control does not bound the search (spec §4.3).
    pub fn timeout_threshold(&self) -> Option<Duration> {
        match &self.time_control {
            TimeControl::Clock { .. } => Some(self.remaining + self.tolerance),
            TimeControl::MoveTime(d) => Some(*d + self.tolerance),
            TimeControl::FixedDepth(_) | TimeControl::FixedNodes(_) | TimeControl::Infinite => {
                None
            }
        }
    }

    /// Deducts the elapsed search time from the clock and applies the
    /// increment (and moves-to-go reset), per spec §4.3. Returns `false`
    /// if the elapsed time exceeded the allotted budget (a time forfeit),
    /// in which case `remaining` is left at zero rather than going
    /// negative.
    pub fn update_time(&mut self, elapsed: Duration) -> bool {
        let TimeControl::Clock {
            increment,
            moves_to_go,
            base,
        } = &self.time_control
        else {
            return match self.timeout_threshold() {
                Some(limit) => elapsed <= limit,
                None => true,
            };
        };

        let forfeited = elapsed > self.remaining + self.tolerance;
        self.remaining = self.remaining.saturating_sub(elapsed);
        self.remaining += *increment;

        if let Some(total) = moves_to_go {
            match &mut self.moves_until_reset {
                Some(n) if *n > 1 => *n -= 1,
                _ => {
                    self.moves_until_reset = Some(*total);
                    self.remaining = *base + *increment;
                }
            }
        }

        !forfeited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_deducts_elapsed_and_adds_increment() {
        let mut p = Participant::new(
            "engine-a",
            TimeControl::Clock {
                base: Duration::from_secs(60),
                increment: Duration::from_millis(500),
                moves_to_go: None,
            },
            Duration::ZERO,
        );
        assert!(p.update_time(Duration::from_secs(10)));
        assert_eq!(p.remaining, Duration::from_millis(50_500));
    }

    #[test]
    fn overrunning_the_clock_is_a_forfeit() {
        let mut p = Participant::new(
            "engine-a",
            TimeControl::Clock {
                base: Duration::from_secs(1),
                increment: Duration::ZERO,
                moves_to_go: None,
            },
            Duration::ZERO,
        );
        assert!(!p.update_time(Duration::from_secs(5)));
        assert_eq!(p.remaining, Duration::ZERO);
    }

    #[test]
    fn tolerance_absorbs_small_overruns() {
        let mut p = Participant::new(
            "engine-a",
            TimeControl::Clock {
                base: Duration::from_millis(100),
                increment: Duration::ZERO,
                moves_to_go: None,
            },
            Duration::from_millis(50),
        );
        assert!(p.update_time(Duration::from_millis(130)));
    }

    #[test]
    fn fixed_depth_never_forfeits() {
        let mut p = Participant::new("engine-a", TimeControl::FixedDepth(20), Duration::ZERO);
        assert!(p.update_time(Duration::from_secs(600)));
        assert_eq!(p.timeout_threshold(), None);
    }

    #[test]
    fn moves_to_go_resets_remaining() {
        let mut p = Participant::new(
            "engine-a",
            TimeControl::Clock {
                base: Duration::from_secs(40),
                increment: Duration::ZERO,
                moves_to_go: Some(1),
            },
            Duration::ZERO,
        );
        p.update_time(Duration::from_secs(10));
        assert_eq!(p.remaining, Duration::from_secs(40));
        assert_eq!(p.moves_until_reset, Some(1));
    }
}
