//! Gradient pass loop with KL early stopping
use std::fmt;

/// State of the gradient pass loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdatePhase {
    /// More passes remain.
    Running,
    /// Every pass ran without exceeding the KL target.
    Converged,
    /// The KL divergence from the pre-update policy exceeded the target.
    KlExceeded,
}

impl fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Converged => write!(f, "converged"),
            Self::KlExceeded => write!(f, "KL exceeded"),
        }
    }
}

/// Loop phase after `passes` completed passes, the last of which ended with divergence `kl`.
pub fn next_phase(passes: usize, max_passes: usize, kl: f64, target_kl: f64) -> UpdatePhase {
    if kl > target_kl {
        UpdatePhase::KlExceeded
    } else if passes >= max_passes {
        UpdatePhase::Converged
    } else {
        UpdatePhase::Running
    }
}

/// Result of [`run_passes`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassOutcome {
    /// Terminal phase; never [`UpdatePhase::Running`].
    pub phase: UpdatePhase,
    /// Number of completed passes.
    pub passes: usize,
    /// KL divergence measured after the last pass. Zero if no pass ran.
    pub final_kl: f64,
}

/// Run up to `max_passes` passes, stopping early once a pass reports a KL divergence above
/// `target_kl`.
///
/// `pass` is called with the zero-based pass index and returns the KL divergence measured
/// after that pass.
pub fn run_passes<F, E>(max_passes: usize, target_kl: f64, mut pass: F) -> Result<PassOutcome, E>
where
    F: FnMut(usize) -> Result<f64, E>,
{
    let mut outcome = PassOutcome {
        phase: if max_passes == 0 {
            UpdatePhase::Converged
        } else {
            UpdatePhase::Running
        },
        passes: 0,
        final_kl: 0.0,
    };
    while outcome.phase == UpdatePhase::Running {
        let kl = pass(outcome.passes)?;
        outcome.passes += 1;
        outcome.final_kl = kl;
        outcome.phase = next_phase(outcome.passes, max_passes, kl, target_kl);
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::convert::Infallible;

    #[rstest]
    #[case(1, 40, 0.01, UpdatePhase::Running)]
    #[case(1, 40, 0.03, UpdatePhase::KlExceeded)]
    #[case(40, 40, 0.01, UpdatePhase::Converged)]
    #[case(40, 40, 0.03, UpdatePhase::KlExceeded)]
    #[case(3, 40, 0.02, UpdatePhase::Running)]
    fn phase_transitions(
        #[case] passes: usize,
        #[case] max_passes: usize,
        #[case] kl: f64,
        #[case] expected: UpdatePhase,
    ) {
        assert_eq!(next_phase(passes, max_passes, kl, 0.02), expected);
    }

    #[rstest]
    #[case(1)]
    #[case(4)]
    #[case(10)]
    fn stops_at_pass_exceeding_kl(#[case] k: usize) {
        let mut calls = 0;
        let outcome = run_passes(10, 0.02, |i| {
            calls += 1;
            Ok::<_, Infallible>(if i + 1 == k { 0.05 } else { 0.001 })
        })
        .unwrap();
        assert_eq!(outcome.phase, UpdatePhase::KlExceeded);
        assert_eq!(outcome.passes, k);
        assert_eq!(calls, k);
        assert_eq!(outcome.final_kl, 0.05);
    }

    #[test]
    fn runs_all_passes_below_target() {
        let outcome = run_passes(5, 0.02, |i| Ok::<_, Infallible>(i as f64 * 0.001)).unwrap();
        assert_eq!(outcome.phase, UpdatePhase::Converged);
        assert_eq!(outcome.passes, 5);
        assert!((outcome.final_kl - 0.004).abs() < 1e-12);
    }

    #[test]
    fn zero_passes() {
        let outcome = run_passes(0, 0.02, |_| -> Result<f64, Infallible> {
            panic!("no pass should run")
        })
        .unwrap();
        assert_eq!(outcome.phase, UpdatePhase::Converged);
        assert_eq!(outcome.passes, 0);
    }

    #[test]
    fn propagates_pass_error() {
        let result = run_passes(5, 0.02, |i| if i == 2 { Err("boom") } else { Ok(0.0) });
        assert_eq!(result, Err("boom"));
    }
}
