//! Worker lifecycle state machine.
//!
//! `pending → installing → installed (waiting) → activating → activated`.
//! A failed activation returns to `installed` so it can be retried.

use goldcache_core::Error;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Pending,
    Installing,
    Installed,
    Activating,
    Activated,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Pending => "pending",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
        }
    }
}

#[derive(Debug)]
pub struct Lifecycle {
    state: WorkerState,
    skip_waiting: bool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self { state: WorkerState::Pending, skip_waiting: false }
    }
}

impl Lifecycle {
    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting
    }

    /// Only an activated instance intercepts requests.
    pub fn is_controlling(&self) -> bool {
        self.state == WorkerState::Activated
    }

    pub fn begin_install(&mut self) -> Result<(), Error> {
        self.transition(WorkerState::Pending, WorkerState::Installing)
    }

    pub fn finish_install(&mut self) -> Result<(), Error> {
        self.transition(WorkerState::Installing, WorkerState::Installed)
    }

    pub fn begin_activate(&mut self) -> Result<(), Error> {
        self.transition(WorkerState::Installed, WorkerState::Activating)
    }

    pub fn finish_activate(&mut self) -> Result<(), Error> {
        self.transition(WorkerState::Activating, WorkerState::Activated)
    }

    pub fn abort_activate(&mut self) -> Result<(), Error> {
        self.transition(WorkerState::Activating, WorkerState::Installed)
    }

    /// Request activation without waiting for an older instance to retire.
    /// Has no effect on the state itself; it is consulted by
    /// [`Lifecycle::ready_to_activate`].
    pub fn request_skip_waiting(&mut self) {
        self.skip_waiting = true;
    }

    /// An installed instance activates right away when nothing older is
    /// active, or early when skip-waiting was requested.
    pub fn ready_to_activate(&self, has_active_predecessor: bool) -> bool {
        self.state == WorkerState::Installed && (!has_active_predecessor || self.skip_waiting)
    }

    fn transition(&mut self, from: WorkerState, to: WorkerState) -> Result<(), Error> {
        if self.state != from {
            return Err(Error::InvalidState(format!(
                "cannot move to {} from {} (expected {})",
                to.as_str(),
                self.state.as_str(),
                from.as_str()
            )));
        }
        self.state = to;
        Ok(())
    }
}
