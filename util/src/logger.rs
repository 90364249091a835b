//! Logging setup for the drive executables.
//!
//! Log records go to two sinks. The session log file receives everything
//! down to the requested level, while the terminal only shows `INFO` and
//! above unless a lower terminal level is asked for, since the planner logs
//! every tick.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use colored::{ColoredString, Colorize};
use log::{self, info};
use thiserror::Error;

// Internal imports
use crate::session;

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Expected a log level of at least `INFO`, found `{0}`")]
    InvalidMinLogLevel(log::LevelFilter),

    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Initialise the logger, writing `min_level` and above to the session log
/// file and `INFO` and above to the terminal.
///
/// Must only be called once per execution.
pub fn logger_init(
    min_level: LevelFilter,
    session: &session::Session,
) -> Result<(), LoggerInitError> {
    logger_init_with_terminal(min_level, LevelFilter::Info, session)
}

/// Initialise the logger with separate file and terminal levels.
///
/// Both levels must be `INFO` or more verbose, the terminal level is capped
/// at the file level.
pub fn logger_init_with_terminal(
    file_level: LevelFilter,
    terminal_level: LevelFilter,
    session: &session::Session,
) -> Result<(), LoggerInitError> {
    for level in [file_level, terminal_level].iter() {
        if *level < log::Level::Info {
            return Err(LoggerInitError::InvalidMinLogLevel(*level));
        }
    }

    let log_file = fern::log_file(session.log_file_path.clone())
        .map_err(LoggerInitError::LogFileInitError)?;

    fern::Dispatch::new()
        .format(|out, message, record| {
            let elapsed_s = session::get_elapsed_seconds();
            let level = level_to_str(record.level());

            // Debug and trace records are per tick, so name where they came
            // from
            if record.level() > log::Level::Info {
                out.finish(format_args!(
                    "[{:10.6} {}] {}: {}",
                    elapsed_s,
                    level,
                    record.target(),
                    message
                ))
            } else {
                out.finish(format_args!("[{:10.6} {}] {}", elapsed_s, level, message))
            }
        })
        .level(file_level)
        .chain(
            fern::Dispatch::new()
                .level(terminal_level.min(file_level))
                .chain(std::io::stdout()),
        )
        .chain(fern::Dispatch::new().chain(log_file))
        .apply()
        .map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised");
    if let Some(epoch) = session::get_epoch() {
        info!("    Session epoch: {}", epoch);
    }
    info!("    File log level: {:?}", file_level);
    info!("    Terminal log level: {:?}", terminal_level.min(file_level));
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Short coloured tag for a level
fn level_to_str(level: log::Level) -> ColoredString {
    match level {
        log::Level::Trace => "TRC".dimmed().italic(),
        log::Level::Debug => "DBG".dimmed(),
        log::Level::Info => "INF".normal(),
        log::Level::Warn => "WRN".yellow(),
        log::Level::Error => "ERR".red().bold(),
    }
}
