//! Worker lifecycle states.
//!
//! ```text
//! uninstalled -> installing -> installed -> activating -> active
//!                    |    ^        |             |
//!                    v    +--------+             v
//!                redundant <--------------------+
//! ```
//!
//! `installed -> installing` re-runs install over a populated store and
//! `redundant -> installing` retries a failed deployment.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Uninstalled,
    Installing,
    Installed,
    Activating,
    Active,
    /// Install or activation failed; this version never serves.
    Redundant,
}

impl WorkerState {
    pub fn can_transition_to(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Uninstalled, Installing)
                | (Installed, Installing)
                | (Redundant, Installing)
                | (Installing, Installed)
                | (Installing, Redundant)
                | (Installed, Activating)
                | (Activating, Active)
                | (Activating, Redundant)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerState::Uninstalled => "uninstalled",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Active => "active",
            WorkerState::Redundant => "redundant",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
