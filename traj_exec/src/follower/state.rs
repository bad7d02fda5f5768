//! Implementations for the Follower state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use chrono::{DateTime, Utc};
use log::trace;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// Internal
use super::{select_sample, NeutralCause, Params, Phase, Selection};
use comms_if::traj::{Command, Trajectory};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Trajectory follower state.
///
/// The follower is shared between the thread delivering trajectories and the thread computing
/// commands, usually behind an `Arc`. Trajectories are swapped in whole, so a computation always
/// sees either the previous or the new trajectory, never a mixture.
#[derive(Debug, Default)]
pub struct Follower {
    params: Params,

    current_traj: Mutex<Option<Arc<Trajectory>>>,
}

/// Status report for a single command computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusReport {
    /// The sample (or neutral command) that was selected.
    pub selection: Selection,

    /// Number of samples in the held trajectory.
    pub num_samples: usize,

    /// Time since the held trajectory's start time, or `None` if there is no trajectory.
    ///
    /// Units: seconds
    pub elapsed_s: Option<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Follower {
    /// Create a new follower which holds no trajectory.
    pub fn new(params: Params) -> Self {
        Self {
            params,
            current_traj: Mutex::new(None),
        }
    }

    /// Get the follower's parameters.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Replace the held trajectory with `traj`.
    ///
    /// No validation happens here, degenerate trajectories are handled when computing commands.
    pub fn receive_trajectory(&self, traj: Trajectory) {
        let traj = Arc::new(traj);

        *self.lock() = Some(traj);
    }

    /// Get a snapshot of the held trajectory.
    pub fn current_trajectory(&self) -> Option<Arc<Trajectory>> {
        self.lock().clone()
    }

    /// True once any trajectory has been received.
    pub fn has_trajectory(&self) -> bool {
        self.lock().is_some()
    }

    /// Compute the command which should be executed at `now`.
    pub fn compute_command(&self, now: DateTime<Utc>) -> Command {
        self.compute(now).0
    }

    /// Compute the command which should be executed at `now`, along with a report on how it was
    /// selected.
    pub fn compute(&self, now: DateTime<Utc>) -> (Command, StatusReport) {
        // Take the snapshot and release the lock before doing any work
        let traj = match self.current_trajectory() {
            Some(t) => t,
            None => {
                return (
                    Command::neutral(),
                    StatusReport {
                        selection: Selection::Neutral(NeutralCause::NoTrajectory),
                        num_samples: 0,
                        elapsed_s: None,
                    },
                )
            }
        };

        let elapsed = now.signed_duration_since(traj.start_time);

        let selection = select_sample(
            elapsed,
            traj.sample_interval_s,
            traj.samples.len(),
            self.params.exhaustion_policy,
        );

        let cmd = match selection {
            Selection::Sample { index, .. } => match traj.samples.get(index) {
                Some(s) => Command::from(*s),
                None => Command::neutral(),
            },
            Selection::Neutral(_) => Command::neutral(),
        };

        trace!(
            "Follower selected {:?} at {:.3} s: {:?}",
            selection,
            util::time::duration_to_seconds(elapsed).unwrap_or(std::f64::NAN),
            cmd
        );

        (
            cmd,
            StatusReport {
                selection,
                num_samples: traj.samples.len(),
                elapsed_s: util::time::duration_to_seconds(elapsed),
            },
        )
    }

    /// Lock the held trajectory.
    ///
    /// A panic while holding the lock cannot leave the `Option<Arc<_>>` half written, so a
    /// poisoned lock is recovered rather than propagated.
    fn lock(&self) -> MutexGuard<'_, Option<Arc<Trajectory>>> {
        self.current_traj
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatusReport {
    /// Get the phase of the follower when the report was made.
    pub fn phase(&self) -> Phase {
        self.selection.phase()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::follower::ExhaustionPolicy;
    use chrono::{Duration, TimeZone};
    use comms_if::traj::TrajectorySample;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 3, 4, 12, 0, 0).unwrap()
    }

    fn traj(samples: &[(f64, f64)]) -> Trajectory {
        Trajectory {
            start_time: t0(),
            sample_interval_s: 0.1,
            samples: samples
                .iter()
                .map(|&(speed, steering_angle)| TrajectorySample {
                    speed,
                    steering_angle,
                })
                .collect(),
        }
    }

    fn cmd(speed: f64, steering_angle: f64) -> Command {
        Command {
            speed,
            steering_angle,
        }
    }

    #[test]
    fn test_no_trajectory() {
        let follower = Follower::default();

        assert!(!follower.has_trajectory());

        for offset_s in &[-1000, 0, 1, 1_000_000] {
            let (c, rpt) = follower.compute(t0() + Duration::seconds(*offset_s));
            assert_eq!(c, Command::neutral());
            assert_eq!(rpt.selection, Selection::Neutral(NeutralCause::NoTrajectory));
            assert_eq!(rpt.phase(), Phase::Idle);
            assert_eq!(rpt.elapsed_s, None);
        }
    }

    #[test]
    fn test_scenario() {
        let follower = Follower::new(Params::default());
        follower.receive_trajectory(traj(&[(1.0, 0.0), (1.0, 5.0), (0.0, 0.0)]));

        assert!(follower.has_trajectory());

        let at = |ms: i64| follower.compute_command(t0() + Duration::milliseconds(ms));

        assert_eq!(at(50), cmd(1.0, 0.0));
        assert_eq!(at(150), cmd(1.0, 5.0));
        assert_eq!(at(10_000), cmd(0.0, 0.0));
        assert_eq!(at(-1_000), cmd(1.0, 0.0));

        let (_, rpt) = follower.compute(t0() + Duration::milliseconds(150));
        assert_eq!(rpt.selection, Selection::Sample { index: 1, phase: Phase::Active });
        assert_eq!(rpt.num_samples, 3);
        assert_eq!(rpt.elapsed_s, Some(0.15));
    }

    #[test]
    fn test_hold_and_stop() {
        let hold = Follower::new(Params {
            exhaustion_policy: ExhaustionPolicy::Hold,
        });
        let stop = Follower::new(Params {
            exhaustion_policy: ExhaustionPolicy::Stop,
        });

        let t = traj(&[(0.5, 0.1), (0.7, -0.2)]);
        hold.receive_trajectory(t.clone());
        stop.receive_trajectory(t);

        for ms in &[200, 201, 5_000, 3_600_000] {
            let now = t0() + Duration::milliseconds(*ms);
            assert_eq!(hold.compute_command(now), cmd(0.7, -0.2));
            assert_eq!(stop.compute_command(now), Command::neutral());
        }

        // Both behave identically before the end
        let now = t0() + Duration::milliseconds(199);
        assert_eq!(hold.compute_command(now), cmd(0.7, -0.2));
        assert_eq!(stop.compute_command(now), cmd(0.7, -0.2));
    }

    #[test]
    fn test_degenerate_trajectories() {
        let follower = Follower::default();

        follower.receive_trajectory(traj(&[]));
        let (c, rpt) = follower.compute(t0() + Duration::milliseconds(50));
        assert_eq!(c, Command::neutral());
        assert_eq!(rpt.selection, Selection::Neutral(NeutralCause::EmptyTrajectory));

        let mut bad_interval = traj(&[(1.0, 1.0)]);
        bad_interval.sample_interval_s = 0.0;
        follower.receive_trajectory(bad_interval);
        let (c, rpt) = follower.compute(t0() + Duration::milliseconds(50));
        assert_eq!(c, Command::neutral());
        assert_eq!(rpt.selection, Selection::Neutral(NeutralCause::InvalidInterval));

        // A valid trajectory recovers normal operation
        follower.receive_trajectory(traj(&[(1.0, 1.0)]));
        assert_eq!(
            follower.compute_command(t0() + Duration::milliseconds(50)),
            cmd(1.0, 1.0)
        );
    }

    #[test]
    fn test_overwrite() {
        let follower = Follower::default();

        follower.receive_trajectory(traj(&[(1.0, 0.0), (2.0, 0.0), (3.0, 0.0)]));
        assert_eq!(
            follower.compute_command(t0() + Duration::milliseconds(250)),
            cmd(3.0, 0.0)
        );

        let mut t2 = traj(&[(-1.0, 0.3)]);
        t2.start_time = t0() + Duration::seconds(10);
        follower.receive_trajectory(t2.clone());

        // Before t2 starts its first sample is used, nothing of the first trajectory remains
        assert_eq!(
            follower.compute_command(t0() + Duration::milliseconds(250)),
            cmd(-1.0, 0.3)
        );
        assert_eq!(*follower.current_trajectory().unwrap(), t2);
    }

    #[test]
    fn test_poisoned_lock() {
        let follower = Arc::new(Follower::default());
        follower.receive_trajectory(traj(&[(1.0, 2.0)]));

        let f = follower.clone();
        let result = std::thread::spawn(move || {
            let _guard = f.current_traj.lock().unwrap();
            panic!("poison the lock");
        })
        .join();
        assert!(result.is_err());

        assert_eq!(follower.compute_command(t0()), cmd(1.0, 2.0));
    }
}
