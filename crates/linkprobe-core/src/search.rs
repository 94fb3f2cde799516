//! Boundary search
//!
//! Sweeps a window `[min, max)` in steps of `max / min`. When a candidate
//! fails the window's floor moves up to the last value that passed and the
//! sweep restarts, so the step shrinks as the floor approaches the boundary.
//!
//! The search ends when a sweep gets through without a failure, when the
//! window collapses (`max / min < 1`, or no value has passed yet to move the
//! floor to), when [`MAX_ITERATIONS`] sweeps have run, or when a probe
//! returns an error other than a failed round.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::link::ProbeError;
use crate::round::RoundOutcome;

/// Cap on the number of sweeps
pub const MAX_ITERATIONS: usize = 20;

/// Window and results of a search between sweeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchState {
    /// Floor of the window; the first candidate of the next sweep
    pub min: u32,
    /// Ceiling of the window, exclusive
    pub max: u32,
    /// Largest value that passed, 0 if none has
    pub last_good: u32,
    /// Last value handed to the probe
    pub last_attempted: Option<u32>,
}

impl SearchState {
    /// Fresh search over `[min, max)`
    pub fn new(min: u32, max: u32) -> Self {
        Self {
            min,
            max,
            last_good: 0,
            last_attempted: None,
        }
    }

    /// Whether there is nothing left to sweep
    pub fn is_collapsed(&self) -> bool {
        self.min == 0 || self.max < self.min
    }

    /// Distance between candidates, `max / min` truncated
    pub fn step(&self) -> u32 {
        if self.min == 0 {
            return 1;
        }
        (self.max / self.min).max(1)
    }

    /// Candidates of the next sweep
    pub fn candidates(&self) -> impl Iterator<Item = u32> {
        let range = if self.is_collapsed() {
            0..0
        } else {
            self.min..self.max
        };
        range.step_by(self.step() as usize)
    }

    fn attempting(self, candidate: u32) -> Self {
        Self {
            last_attempted: Some(candidate),
            ..self
        }
    }

    fn passed(self, candidate: u32) -> Self {
        Self {
            last_good: candidate,
            ..self
        }
    }

    /// Window for the sweep after a failure
    fn narrowed(self) -> Self {
        Self {
            min: self.last_good,
            ..self
        }
    }
}

/// Why a search stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum Termination {
    /// A full sweep passed
    SweepCompleted,
    /// `max / min < 1`, or nothing passed before the first failure
    WindowCollapsed,
    /// [`MAX_ITERATIONS`] sweeps ran
    IterationCap,
    /// A probe failed for a reason other than an unreliable link
    Aborted(String),
}

/// Outcome of a search
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchReport {
    /// Largest value that passed, 0 if none did
    pub last_good: u32,
    /// Last value probed, `None` if the window was empty from the start
    pub last_attempted: Option<u32>,
    /// Sweeps started
    pub iterations: usize,
    /// Why the search stopped
    pub termination: Termination,
}

enum Sweep {
    Completed(SearchState),
    Failed(SearchState),
    Aborted(SearchState, String),
}

fn sweep<F>(mut state: SearchState, probe: &mut F) -> Sweep
where
    F: FnMut(u32) -> Result<RoundOutcome, ProbeError>,
{
    for candidate in state.candidates() {
        state = state.attempting(candidate);
        match probe(candidate) {
            Ok(RoundOutcome::Passed(_)) => {
                debug!(candidate, "passed");
                state = state.passed(candidate);
            }
            Ok(RoundOutcome::Failed { failure, .. }) => {
                debug!(candidate, kind = failure.kind(), "failed: {failure}");
                return Sweep::Failed(state);
            }
            Err(e) => return Sweep::Aborted(state, e.to_string()),
        }
    }
    Sweep::Completed(state)
}

/// Find the largest value in `[min, max)` for which `probe` passes
///
/// `probe` is called with each candidate. A failed round narrows the window;
/// an `Err` ends the search with whatever has passed so far.
pub fn search<F>(min: u32, max: u32, mut probe: F) -> SearchReport
where
    F: FnMut(u32) -> Result<RoundOutcome, ProbeError>,
{
    let mut state = SearchState::new(min, max);
    let mut iterations = 0;

    let termination = loop {
        if iterations == MAX_ITERATIONS {
            break Termination::IterationCap;
        }
        if state.is_collapsed() {
            break Termination::WindowCollapsed;
        }
        iterations += 1;
        debug!(
            iteration = iterations,
            min = state.min,
            max = state.max,
            step = state.step(),
            "sweeping"
        );

        match sweep(state, &mut probe) {
            Sweep::Completed(next) => {
                state = next;
                break Termination::SweepCompleted;
            }
            Sweep::Failed(next) => state = next.narrowed(),
            Sweep::Aborted(next, reason) => {
                warn!(candidate = ?next.last_attempted, "search aborted: {reason}");
                state = next;
                break Termination::Aborted(reason);
            }
        }
    };

    info!(
        last_good = state.last_good,
        last_attempted = ?state.last_attempted,
        iterations,
        ?termination,
        "search finished"
    );

    SearchReport {
        last_good: state.last_good,
        last_attempted: state.last_attempted,
        iterations,
        termination,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::RoundFailure;
    use pretty_assertions::assert_eq;

    fn verdict(pass: bool) -> Result<RoundOutcome, ProbeError> {
        if pass {
            Ok(RoundOutcome::Passed(Vec::new()))
        } else {
            Ok(RoundOutcome::Failed {
                receipts: Vec::new(),
                failure: RoundFailure::Verification {
                    sender: "A".into(),
                    receiver: "B".into(),
                    expected: "0x1".into(),
                    received: "0x2".into(),
                    payload_code: "0x2".into(),
                },
            })
        }
    }

    #[test]
    fn test_step_is_truncated_ratio() {
        assert_eq!(SearchState::new(100, 1000).step(), 10);
        assert_eq!(SearchState::new(300, 1000).step(), 3);
        assert_eq!(SearchState::new(600, 1000).step(), 1);
    }

    #[test]
    fn test_candidates_exclude_max() {
        let c: Vec<u32> = SearchState::new(100, 400).candidates().collect();
        assert_eq!(&c[..3], &[100, 104, 108]);
        assert_eq!(c.last(), Some(&396));
        assert_eq!(c.len(), 75);
    }

    #[test]
    fn test_collapsed_window() {
        assert!(SearchState::new(0, 1000).is_collapsed());
        assert!(SearchState::new(1000, 999).is_collapsed());
        assert!(!SearchState::new(1000, 1000).is_collapsed());
        assert_eq!(SearchState::new(1000, 999).candidates().count(), 0);
    }

    #[test]
    fn test_converges_below_threshold() {
        for threshold in [100, 105, 537, 999] {
            let report = search(100, 1000, |c| verdict(c <= threshold));
            assert!(report.last_good <= threshold);
            assert!(threshold - report.last_good < 10, "threshold {threshold}: {report:?}");
            assert!(report.iterations <= MAX_ITERATIONS);
        }
    }

    #[test]
    fn test_fine_step_finds_exact_threshold() {
        let report = search(100, 1000, |c| verdict(c <= 537));
        assert_eq!(report.last_good, 537);
        assert_eq!(report.last_attempted, Some(538));
        assert_eq!(report.termination, Termination::IterationCap);
    }

    #[test]
    fn test_all_pass_completes_single_sweep() {
        let mut probes = 0;
        let report = search(100, 1000, |_| {
            probes += 1;
            verdict(true)
        });
        assert_eq!(report.last_good, 990);
        assert_eq!(report.iterations, 1);
        assert_eq!(report.termination, Termination::SweepCompleted);
        assert_eq!(probes, 90);
    }

    #[test]
    fn test_first_candidate_fails() {
        let report = search(100, 1000, |_| verdict(false));
        assert_eq!(
            report,
            SearchReport {
                last_good: 0,
                last_attempted: Some(100),
                iterations: 1,
                termination: Termination::WindowCollapsed,
            }
        );
    }

    #[test]
    fn test_empty_window_never_probes() {
        let report = search(1000, 10, |_| -> Result<RoundOutcome, ProbeError> {
            panic!("must not probe")
        });
        assert_eq!(report.last_attempted, None);
        assert_eq!(report.iterations, 0);
        assert_eq!(report.termination, Termination::WindowCollapsed);
    }

    #[test]
    fn test_error_aborts_with_best_so_far() {
        let report = search(100, 1000, |c| {
            if c < 150 {
                verdict(true)
            } else {
                Err(ProbeError::connection("B", "unplugged"))
            }
        });
        assert_eq!(report.last_good, 140);
        assert_eq!(report.last_attempted, Some(150));
        assert!(matches!(report.termination, Termination::Aborted(_)));
    }

    #[test]
    fn test_narrowing_restarts_from_last_good() {
        let mut seen = Vec::new();
        search(100, 1000, |c| {
            seen.push(c);
            verdict(c <= 120)
        });
        // 100, 110, 120 pass; 130 fails; the next sweep restarts at 120
        assert_eq!(&seen[..5], &[100, 110, 120, 130, 120]);
    }
}
