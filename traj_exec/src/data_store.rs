//! # Data Store

use comms_if::traj::Command;

use crate::follower::{Phase, StatusReport};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Global data store for the executable.
#[derive(Default)]
pub struct DataStore {
    // Cycle management
    /// Number of cycles already executed
    pub num_cycles: u128,

    /// True if this cycle falls on a 1Hz boundary
    pub is_1_hz_cycle: bool,

    // Follower
    /// Command computed on this cycle
    pub cmd: Command,

    /// Follower status on this cycle, `None` until the follower has run
    pub status_rpt: Option<StatusReport>,

    /// Follower phase on the previous cycle
    prev_phase: Option<Phase>,

    // Monitoring Counters
    /// Number of consecutive cycle overruns
    pub num_consec_cycle_overruns: u64,

    /// Number of consecutive failures to send the command
    pub num_consec_cmd_send_errors: u64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl DataStore {
    /// Perform actions required at the start of a cycle.
    ///
    /// Clears those items that need clearing at the start of a cycle, and sets the 1Hz cycle flag.
    pub fn cycle_start(&mut self, cycle_frequency_hz: f64) {
        let cycles_per_second = (cycle_frequency_hz.round() as u128).max(1);

        self.is_1_hz_cycle = self.num_cycles % cycles_per_second == 0;

        if let Some(rpt) = self.status_rpt.take() {
            self.prev_phase = Some(rpt.phase());
        }
        self.cmd = Command::neutral();
    }

    /// Perform actions required at the end of a cycle.
    pub fn cycle_end(&mut self) {
        self.num_cycles += 1;
    }

    /// True if the follower's phase on this cycle differs from the previous cycle.
    ///
    /// Always true on the first cycle the follower runs.
    pub fn phase_changed(&self) -> bool {
        match self.status_rpt {
            Some(rpt) => self.prev_phase != Some(rpt.phase()),
            None => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::follower::{NeutralCause, Selection};

    fn report(selection: Selection) -> StatusReport {
        StatusReport {
            selection,
            num_samples: 3,
            elapsed_s: Some(0.0),
        }
    }

    #[test]
    fn test_1_hz_cycle() {
        let mut ds = DataStore::default();
        let mut flags = vec![];

        for _ in 0..21 {
            ds.cycle_start(10.0);
            flags.push(ds.is_1_hz_cycle);
            ds.cycle_end();
        }

        let one_hz: Vec<usize> = flags
            .iter()
            .enumerate()
            .filter(|(_, f)| **f)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(one_hz, vec![0, 10, 20]);

        // Slow loops are on a 1Hz boundary every cycle
        ds.cycle_start(0.5);
        assert!(ds.is_1_hz_cycle);
    }

    #[test]
    fn test_phase_changed() {
        let mut ds = DataStore::default();

        ds.cycle_start(10.0);
        assert!(!ds.phase_changed());
        ds.status_rpt = Some(report(Selection::Neutral(NeutralCause::NoTrajectory)));
        assert!(ds.phase_changed());
        ds.cycle_end();

        ds.cycle_start(10.0);
        ds.status_rpt = Some(report(Selection::Neutral(NeutralCause::EmptyTrajectory)));
        assert!(!ds.phase_changed());
        ds.cycle_end();

        ds.cycle_start(10.0);
        ds.status_rpt = Some(report(Selection::Sample { index: 0, phase: Phase::Active }));
        assert!(ds.phase_changed());
        ds.cycle_end();

        // Moving to the next sample is not a phase change
        ds.cycle_start(10.0);
        ds.status_rpt = Some(report(Selection::Sample { index: 1, phase: Phase::Active }));
        assert!(!ds.phase_changed());
    }
}
