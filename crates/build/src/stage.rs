//! The stage trait and its driver
//!
//! `check` observes the disk to decide whether a stage is already
//! reached; `execute` performs the work. [`BuildState::reach`] combines
//! them: prerequisite first, then check, execute only when needed, and
//! re-verify afterwards. Progress lines are emitted at most once per
//! stage key per process.

use dop_errors::{BuildError, Error};
use std::collections::HashSet;
use std::sync::{LazyLock, Mutex};
use tracing::{error, info};

static LOGGED: LazyLock<Mutex<HashSet<String>>> = LazyLock::new(|| Mutex::new(HashSet::new()));

fn log_reached(key: &str, name: &str) {
    let fresh = LOGGED
        .lock()
        .map(|mut seen| seen.insert(key.to_string()))
        .unwrap_or(false);
    if fresh {
        info!("{name}: OK");
    }
}

/// One node of the packaging prerequisite graph
pub trait BuildState {
    /// Human-readable stage name, used in progress lines
    fn name(&self) -> String;

    /// Unique key identifying this stage instance for once-per-process
    /// logging (stage kind plus target directory)
    fn key(&self) -> String;

    /// Observe the disk: is this stage already reached?
    ///
    /// # Errors
    ///
    /// Returns an error when the observation itself fails (unreadable
    /// flag or profile file).
    fn check(&mut self) -> Result<bool, Error>;

    /// Perform the work to reach this stage
    ///
    /// # Errors
    ///
    /// Returns an error when the work fails; the stage is then considered
    /// not reached and no flag file may have been written.
    fn execute(&mut self) -> Result<(), Error>;

    /// The stage that must be reached before this one
    fn prerequisite(&mut self) -> Option<&mut dyn BuildState> {
        None
    }

    /// Bring this stage (and its prerequisites) to the reached state
    ///
    /// Idempotent: once reached, further calls observe `check() == true`
    /// and do nothing.
    ///
    /// # Errors
    ///
    /// Propagates prerequisite, execution and verification failures; a
    /// stage whose work completed without reaching its state reports
    /// `BuildError::StateNotReached`.
    fn reach(&mut self) -> Result<(), Error> {
        if let Some(prereq) = self.prerequisite() {
            prereq.reach()?;
        }
        if self.check()? {
            log_reached(&self.key(), &self.name());
            return Ok(());
        }
        if let Err(e) = self.execute() {
            error!("{}: NOK - {e}", self.name());
            return Err(e);
        }
        if !self.check()? {
            let err = BuildError::StateNotReached {
                message: format!("{} did not reach its state", self.name()),
            };
            error!("{}: NOK - {err}", self.name());
            return Err(err.into());
        }
        log_reached(&self.key(), &self.name());
        Ok(())
    }
}

/// A stage that refuses to do its own work
///
/// Wraps another stage for commands that demand the wrapped state to
/// have been reached out-of-band: `check` delegates, `execute` reports
/// `StateNotReached`, and prerequisites are not driven either.
pub struct Enforced<S>(pub S);

impl<S: BuildState> BuildState for Enforced<S> {
    fn name(&self) -> String {
        self.0.name()
    }

    fn key(&self) -> String {
        self.0.key()
    }

    fn check(&mut self) -> Result<bool, Error> {
        self.0.check()
    }

    fn execute(&mut self) -> Result<(), Error> {
        Err(BuildError::StateNotReached {
            message: format!("{} has not been reached", self.0.name()),
        }
        .into())
    }
}
