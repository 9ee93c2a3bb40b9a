//! Sequential Probability Ratio Test over (win, draw, loss) counts (spec
//! §4.5), ported from the log-likelihood-ratio test in the original
//! scheduler's SPRT controller.

use std::fmt;

/// The outcome of comparing the current LLR against the SPRT bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SprtResult {
    /// LLR crossed the upper bound: the null hypothesis (elo ≥ elo1) is
    /// accepted.
    AcceptH0,
    /// LLR crossed the lower bound: the alternative hypothesis (elo ≤
    /// elo0) is accepted.
    AcceptH1,
    /// Neither bound crossed yet; keep playing games.
    Continue,
}

/// A configured SPRT over two elo hypotheses. Constructing with
/// `alpha == 0.0`, `beta == 0.0`, or `elo0 >= elo1` yields an invalid
/// decider whose [`SprtDecider::llr`] is always 0 and whose
/// [`SprtDecider::decide`] always returns [`SprtResult::Continue`] — the
/// same "disabled" behavior the original exposed when no SPRT was
/// configured.
#[derive(Debug, Clone, Copy)]
pub struct SprtDecider {
    lower: f64,
    upper: f64,
    s0: f64,
    s1: f64,
    elo0: f64,
    elo1: f64,
    valid: bool,
}

impl SprtDecider {
    pub fn new(alpha: f64, beta: f64, elo0: f64, elo1: f64) -> Self {
        let valid = alpha != 0.0 && beta != 0.0 && elo0 < elo1;
        if !valid {
            return Self {
                lower: 0.0,
                upper: 0.0,
                s0: 0.0,
                s1: 0.0,
                elo0,
                elo1,
                valid: false,
            };
        }
        Self {
            lower: (beta / (1.0 - alpha)).ln(),
            upper: ((1.0 - beta) / alpha).ln(),
            s0: Self::expected_score(elo0),
            s1: Self::expected_score(elo1),
            elo0,
            elo1,
            valid: true,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The logistic win expectation for an elo difference (spec §4.5
    /// `s(e)`).
    fn expected_score(elo: f64) -> f64 {
        1.0 / (1.0 + 10f64.powf(-elo / 400.0))
    }

    /// The current log-likelihood ratio for `(win, draw, loss)` counts.
    /// Zero if the decider is invalid or any bucket is still empty (spec
    /// §4.5).
    pub fn llr(&self, win: u64, draw: u64, loss: u64) -> f64 {
        if !self.valid || win == 0 || draw == 0 || loss == 0 {
            return 0.0;
        }
        let games = (win + draw + loss) as f64;
        let w = win as f64 / games;
        let d = draw as f64 / games;
        let a = w + d / 2.0;
        let b = w + d / 4.0;
        let var = b - a * a;
        let var_s = var / games;
        (self.s1 - self.s0) * (2.0 * a - self.s0 - self.s1) / var_s / 2.0
    }

    /// Classifies an already-computed LLR against the bounds.
    pub fn result_for_llr(&self, llr: f64) -> SprtResult {
        if !self.valid {
            return SprtResult::Continue;
        }
        if llr > self.upper {
            SprtResult::AcceptH0
        } else if llr < self.lower {
            SprtResult::AcceptH1
        } else {
            SprtResult::Continue
        }
    }

    /// Computes the LLR for `(win, draw, loss)` and classifies it in one
    /// step.
    pub fn decide(&self, win: u64, draw: u64, loss: u64) -> SprtResult {
        self.result_for_llr(self.llr(win, draw, loss))
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.lower, self.upper)
    }
}

impl fmt::Display for SprtDecider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "elo [{:.2}, {:.2}] bounds ({:.2}, {:.2})",
            self.elo0, self.elo1, self.lower, self.upper
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_configuration_never_decides() {
        let d = SprtDecider::new(0.0, 0.05, 0.0, 5.0);
        assert!(!d.is_valid());
        assert_eq!(d.llr(200, 400, 100), 0.0);
        assert_eq!(d.decide(200, 400, 100), SprtResult::Continue);
    }

    #[test]
    fn zero_bucket_yields_zero_llr() {
        let d = SprtDecider::new(0.05, 0.05, 0.0, 5.0);
        assert_eq!(d.llr(0, 10, 10), 0.0);
        assert_eq!(d.llr(10, 0, 10), 0.0);
        assert_eq!(d.llr(10, 10, 0), 0.0);
    }

    #[test]
    fn lopsided_record_accepts_h0() {
        let d = SprtDecider::new(0.05, 0.05, 0.0, 5.0);
        assert_eq!(d.decide(200, 400, 100), SprtResult::AcceptH0);
    }

    #[test]
    fn reversed_record_accepts_h1() {
        let d = SprtDecider::new(0.05, 0.05, 0.0, 5.0);
        assert_eq!(d.decide(100, 400, 200), SprtResult::AcceptH1);
    }

    #[test]
    fn llr_is_monotone_non_decreasing_in_wins() {
        let d = SprtDecider::new(0.05, 0.05, 0.0, 5.0);
        let low = d.llr(50, 100, 50);
        let high = d.llr(80, 100, 50);
        assert!(high >= low);
    }

    #[test]
    fn llr_is_monotone_non_increasing_in_losses() {
        let d = SprtDecider::new(0.05, 0.05, 0.0, 5.0);
        let low_losses = d.llr(80, 100, 20);
        let high_losses = d.llr(80, 100, 60);
        assert!(low_losses >= high_losses);
    }
}
