//! Main trajectory follower executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the follower, trajectory source and command server
//!     - Main loop:
//!         - Trajectory acquisition (script only, remote trajectories arrive on the
//!           `TrajClient`'s own thread)
//!         - Command computation
//!         - Command output
//!         - Cycle management
//!
//! With no arguments trajectories are received from the planner over the network and the loop
//! runs until the process is killed. With one argument the path is a trajectory script, and the
//! loop ends once the script and its last trajectory are both finished.

// ---------------------------------------------------------------------------
// USE MODULES FROM LIBRARY
// ---------------------------------------------------------------------------

use comms_if::{net::NetParams, traj::Command};
use traj_lib::{
    cmd_server::CmdServer,
    data_store::DataStore,
    follower::{self, Follower, Phase},
    params::TrajExecParams,
    traj_client::TrajClient,
};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use chrono::Utc;
use color_eyre::{eyre::{eyre, WrapErr}, Report};
use log::{debug, error, info, trace, warn};
use std::env;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use util::{
    host,
    logger::{logger_init, LevelFilter},
    script_interpreter::{PendingTrajs, ScriptInterpreter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of consecutive command send errors after which an error is raised in the log.
const MAX_CMD_SEND_ERROR_LIMIT: u64 = 10;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {

    // ---- EARLY INITIALISATION ----

    color_eyre::install()?;

    // Initialise session
    let session = Session::new(
        "traj_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Trajectory Follower Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let net_params: NetParams = util::params::load(
        "net.toml"
    ).wrap_err("Could not load net params")?;

    let exec_params: TrajExecParams = util::params::load(
        "traj_exec.toml"
    ).wrap_err("Could not load exec params")?;
    exec_params.validate()
        .wrap_err("Invalid exec params")?;

    let follower_params: follower::Params = util::params::load(
        "follower.toml"
    ).wrap_err("Could not load follower params")?;

    info!("Parameters loaded");
    debug!("Exec parameters: {:?}", exec_params);
    info!("Exhaustion policy: {:?}", follower_params.exhaustion_policy);

    // ---- INITIALISE FOLLOWER ----

    let follower = Arc::new(Follower::new(follower_params));

    // ---- INITIALISE NETWORK ----

    info!("Initialising network");

    let zmq_ctx = comms_if::net::zmq::Context::new();

    let mut cmd_server = {
        let s = CmdServer::new(&zmq_ctx, &net_params)
            .wrap_err("Failed to initialise CmdServer")?;
        info!("CmdServer initialised");
        s
    };

    // ---- INITIALISE TRAJECTORY SOURCE ----

    // Collect all arguments
    let args: Vec<String> = env::args().collect();

    debug!("CLI arguments: {:?}", args);

    // If we have a single argument use it as the script path, if none use the TrajClient
    let mut traj_source = match args.len() {
        2 => {
            info!("Loading script from \"{}\"", &args[1]);

            let si = ScriptInterpreter::new(&args[1])
                .wrap_err("Failed to load script")?;

            info!(
                "Loaded script lasts {:.02} s and contains {} trajectories\n",
                si.get_duration(),
                si.get_num_trajs()
            );

            TrajSource::Script(si)
        },
        1 => {
            info!("No script provided, trajectories will be recieved from the planner\n");

            let c = TrajClient::new(
                &zmq_ctx,
                &net_params,
                follower.clone(),
                exec_params.archive_trajectories
            ).wrap_err("Failed to initialise the TrajClient")?;
            info!("TrajClient initialised");

            TrajSource::Remote(c)
        },
        _ => return Err(eyre!(
            "Expected either zero or one argument, found {}", args.len() - 1
        ))
    };

    info!("Network initialisation complete");

    // ---- MAIN LOOP ----

    let mut ds = DataStore::default();
    let cycle_period = Duration::from_secs_f64(exec_params.cycle_period_s);
    let mut end_of_script = false;

    info!("Begining main loop\n");

    loop {

        // Get cycle start time
        let cycle_start_instant = Instant::now();

        // Clear items that need wiping at the start of the cycle
        ds.cycle_start(exec_params.cycle_frequency_hz());

        // ---- TRAJECTORY ACQUISITION ----

        match traj_source {
            TrajSource::Remote(ref client) => {
                if ds.is_1_hz_cycle && !client.is_connected() {
                    debug!("TrajClient not connected to the planner");
                }
            },
            TrajSource::Script(ref mut si) => match si.get_pending() {
                PendingTrajs::None => (),
                PendingTrajs::Some(trajs) => {
                    for traj in trajs {
                        info!(
                            "Issuing scripted trajectory of {} samples starting at {}",
                            traj.samples.len(),
                            traj.start_time
                        );
                        follower.receive_trajectory(traj);
                    }
                },
                PendingTrajs::EndOfScript => {
                    if !end_of_script {
                        info!("End of trajectory script reached");
                        end_of_script = true;
                    }
                }
            }
        }

        // ---- COMMAND COMPUTATION ----

        let (cmd, rpt) = follower.compute(Utc::now());
        ds.cmd = cmd;
        ds.status_rpt = Some(rpt);

        if ds.phase_changed() {
            info!(
                "Follower now {:?} ({:?}, {} samples)",
                rpt.phase(),
                rpt.selection,
                rpt.num_samples
            );
        }
        trace!("Cycle {}: {:?}", ds.num_cycles, ds.cmd);

        // Stop once the script has nothing more to do
        if end_of_script && matches!(rpt.phase(), Phase::Exhausted | Phase::Idle) {
            info!("Final trajectory complete, stopping");
            break
        }

        // ---- COMMAND OUTPUT ----

        match cmd_server.send(&ds.cmd) {
            Ok(()) => ds.num_consec_cmd_send_errors = 0,
            Err(e) => {
                ds.num_consec_cmd_send_errors += 1;

                if ds.num_consec_cmd_send_errors == MAX_CMD_SEND_ERROR_LIMIT {
                    error!(
                        "Maximum number of consecutive command send errors ({}) reached",
                        MAX_CMD_SEND_ERROR_LIMIT
                    );
                }
                warn!("CmdServer error: {}", e)
            }
        }

        // ---- STATUS ----

        if ds.is_1_hz_cycle {
            if let TrajSource::Remote(ref client) = traj_source {
                trace!(
                    "{} trajectories recieved, planner connected: {}",
                    client.num_received(),
                    client.is_connected()
                );
            }
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        // Get sleep duration
        match cycle_period.checked_sub(cycle_dur) {
            Some(d) => {
                ds.num_consec_cycle_overruns = 0;
                thread::sleep(d);
            },
            None => {
                warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - cycle_period.as_secs_f64()
                );
                ds.num_consec_cycle_overruns += 1;
            }
        }

        ds.cycle_end();
    }

    // ---- SHUTDOWN ----

    // Leave the actuators at rest
    if let Err(e) = cmd_server.send(&Command::neutral()) {
        warn!("Could not send the final neutral command: {}", e);
    }

    info!("End of execution");

    drop(traj_source);
    session.exit();

    Ok(())
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Various sources for the trajectories incoming to the exec.
enum TrajSource {
    Remote(TrajClient),
    Script(ScriptInterpreter)
}
