//! # Trajectory follower library.
//!
//! This library allows other crates in the workspace to access items defined inside the
//! trajectory follower executable crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Command server - publishes the follower's output commands
pub mod cmd_server;

/// Data store - bookkeeping for a single execution of the main loop
pub mod data_store;

/// Follower module - selects the command to execute from the current trajectory
pub mod follower;

/// Executable parameters
pub mod params;

/// Trajectory client - recieves trajectories from the planner
pub mod traj_client;
