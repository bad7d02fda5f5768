//! Host platform (linux for example) utility functions

use std::env;
use std::path::PathBuf;

/// Name of the environment variable pointing at the root of the software tree.
///
/// Parameter files are looked up in `$TRAJ_FOLLOWER_SW_ROOT/params` and sessions are created
/// under this directory.
pub const SW_ROOT_ENV_VAR: &str = "TRAJ_FOLLOWER_SW_ROOT";

/// Retrieve uname information.
pub fn get_uname() -> std::io::Result<uname::Info> {
    uname::uname()
}

/// Get the root directory of the software from the environment.
pub fn get_sw_root() -> Result<PathBuf, env::VarError> {
    env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}
