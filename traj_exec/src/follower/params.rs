//! Parameters structure for the follower

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the trajectory follower.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct Params {
    /// What to output once the held trajectory has run out of samples.
    #[serde(default)]
    pub exhaustion_policy: ExhaustionPolicy,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Behaviour once the current time is past the end of the trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Keep outputting the last sample until a new trajectory arrives.
    Hold,

    /// Output the neutral command (zero speed, zero steering).
    Stop,
}

impl Default for ExhaustionPolicy {
    fn default() -> Self {
        ExhaustionPolicy::Hold
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_load_params() {
        let p: Params = util::params::load_str("exhaustion_policy = \"stop\"").unwrap();
        assert_eq!(p.exhaustion_policy, ExhaustionPolicy::Stop);

        let p: Params = util::params::load_str("").unwrap();
        assert_eq!(p.exhaustion_policy, ExhaustionPolicy::Hold);

        assert!(util::params::load_str::<Params>("exhaustion_policy = \"coast\"").is_err());
    }
}
