//! Channel deployment state.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a deployed channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum DeployedState {
    /// Disabled or not yet deployed.
    Undeployed = 0,
    Deploying = 1,
    Undeploying = 2,
    Starting = 3,
    /// Running and admitting messages.
    Started = 4,
    Pausing = 5,
    Paused = 6,
    Stopping = 7,
    Stopped = 8,
    /// Reconciling with an external source of truth.
    Syncing = 9,
    /// True state could not be determined.
    Unknown = 10,
}

impl DeployedState {
    pub const ALL: [DeployedState; 11] = [
        Self::Undeployed,
        Self::Deploying,
        Self::Undeploying,
        Self::Starting,
        Self::Started,
        Self::Pausing,
        Self::Paused,
        Self::Stopping,
        Self::Stopped,
        Self::Syncing,
        Self::Unknown,
    ];

    /// Check if this state allows transitioning to `target`.
    pub fn can_transition_to(&self, target: DeployedState) -> bool {
        use DeployedState::*;

        if *self == target {
            return false;
        }
        matches!(
            (self, target),
            // Deploy
            (Undeployed, Deploying) | (Deploying, Starting) | (Starting, Started) |
            // Pause / resume
            (Started, Pausing) | (Pausing, Paused) | (Paused, Starting) |
            // Stop
            (Started, Stopping) | (Paused, Stopping) | (Stopping, Stopped) |
            // Restart / undeploy
            (Stopped, Starting) | (Stopped, Undeploying) | (Undeploying, Undeployed) |
            // Reconciliation: anything may sync, sync resolves to anything
            (_, Syncing) | (Syncing, _) |
            // Diagnostics
            (_, Unknown)
        )
    }

    /// States in which in-flight work should wind down.
    pub fn is_draining(&self) -> bool {
        matches!(self, Self::Pausing | Self::Stopping | Self::Undeploying)
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        Self::ALL
            .get(usize::from(value))
            .copied()
            .unwrap_or(Self::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undeployed => "UNDEPLOYED",
            Self::Deploying => "DEPLOYING",
            Self::Undeploying => "UNDEPLOYING",
            Self::Starting => "STARTING",
            Self::Started => "STARTED",
            Self::Pausing => "PAUSING",
            Self::Paused => "PAUSED",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Syncing => "SYNCING",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for DeployedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DeployedState::*;

    const LEGAL: &[(DeployedState, DeployedState)] = &[
        (Undeployed, Deploying),
        (Deploying, Starting),
        (Starting, Started),
        (Started, Pausing),
        (Pausing, Paused),
        (Paused, Starting),
        (Started, Stopping),
        (Paused, Stopping),
        (Stopping, Stopped),
        (Stopped, Starting),
        (Stopped, Undeploying),
        (Undeploying, Undeployed),
    ];

    fn expected(from: DeployedState, to: DeployedState) -> bool {
        from != to
            && (LEGAL.contains(&(from, to)) || to == Syncing || from == Syncing || to == Unknown)
    }

    #[test]
    fn transition_table_is_closed() {
        for from in DeployedState::ALL {
            for to in DeployedState::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    expected(from, to),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn lifecycle_edges() {
        assert!(Undeployed.can_transition_to(Deploying));
        assert!(Paused.can_transition_to(Starting));
        assert!(!Undeployed.can_transition_to(Started));
        assert!(!Started.can_transition_to(Stopped));
        assert!(!Paused.can_transition_to(Started));
        assert!(!Stopped.can_transition_to(Undeployed));
    }

    #[test]
    fn unknown_only_leaves_through_sync() {
        for to in DeployedState::ALL {
            assert_eq!(Unknown.can_transition_to(to), to == Syncing, "UNKNOWN -> {to}");
        }
    }

    #[test]
    fn u8_roundtrip() {
        for state in DeployedState::ALL {
            assert_eq!(DeployedState::from_u8(state as u8), state);
        }
        assert_eq!(DeployedState::from_u8(200), Unknown);
    }

    #[test]
    fn draining_states() {
        assert!(Stopping.is_draining());
        assert!(Pausing.is_draining());
        assert!(!Started.is_draining());
    }
}
