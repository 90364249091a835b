//! Drive replay executable entry point.
//!
//! # Architecture
//!
//! The executable replays a recording of simulation measurements through the
//! autonomy system:
//!
//!     - Initialise the session and logging
//!     - Load the parameters, the route and the recording
//!     - Main loop, once per recorded measurement:
//!         - Traffic light observation from the recorded report
//!         - Behaviour and local planning (every K ticks)
//!         - Trajectory control
//!     - Stop at the end of the recording or when the mission completes
//!
//! # Usage
//!
//! ```text
//! drive_exec <route.csv> <measurements.json>
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, info, warn};
use std::env;
use std::fs::File;
use std::io::BufReader;

// Internal
use drive_lib::auto::{
    per::ReportedTrafficLight, route::Route, traj_ctrl::TrajCtrlParams, DriveMgr, DriveMgrParams,
};
use sim_if::meas::Measurement;
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("drive_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    info!("Drive Replay Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- ARGUMENTS ----

    let args: Vec<String> = env::args().collect();
    debug!("CLI arguments: {:?}", args);

    if args.len() != 3 {
        return Err(eyre!(
            "Expected 2 arguments (route CSV and measurements JSON), found {}",
            args.len() - 1
        ));
    }

    // ---- LOAD PARAMETERS ----

    let drive_mgr_params: DriveMgrParams =
        util::params::load("drive_mgr.toml").wrap_err("Could not load DriveMgr params")?;
    let traj_ctrl_params: TrajCtrlParams =
        util::params::load("traj_ctrl.toml").wrap_err("Could not load TrajCtrl params")?;

    info!("Exec parameters loaded");

    // ---- LOAD INPUTS ----

    let route = Route::from_csv(&args[1])
        .wrap_err_with(|| format!("Could not load the route from \"{}\"", &args[1]))?;
    info!("Loaded route with {} waypoints", route.len());

    let reader = BufReader::new(
        File::open(&args[2])
            .wrap_err_with(|| format!("Could not open the recording \"{}\"", &args[2]))?,
    );
    let recording: Vec<Measurement> =
        serde_json::from_reader(reader).wrap_err("Could not parse the recording")?;
    info!("Loaded recording with {} measurements", recording.len());

    // ---- INITIALISE MODULES ----

    let mut drive_mgr = DriveMgr::new(drive_mgr_params, traj_ctrl_params, route, ReportedTrafficLight)
        .wrap_err("Failed to initialise DriveMgr")?;

    info!("Module initialisation complete\n");

    // ---- MAIN LOOP ----

    for meas in recording.iter() {
        let output = drive_mgr
            .step(meas, &meas.traffic_light)
            .wrap_err_with(|| format!("DriveMgr failed at frame {}", meas.frame))?;

        debug!(
            "Frame {}: {:?} {:?} -> {:?}",
            meas.frame, output.state, output.flags, output.control
        );

        if output.flags.handbrake {
            warn!("Handbrake engaged at frame {}", meas.frame);
        }

        if output.mission_complete {
            info!("Mission complete, stopping the replay");
            break;
        }
    }

    info!("End of execution");

    Ok(())
}
