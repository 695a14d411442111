//! Saga lifecycle states.

use serde::{Deserialize, Serialize};

/// The state of an image retrieval saga.
///
/// State transitions:
/// ```text
/// Initial ──► Pending ──┬──► Available
///                       └──► Faulted
/// ```
///
/// `Initial` stands for "no saga exists yet" and is never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// No saga has been created for the resource.
    #[default]
    Initial,

    /// Retrieval has been requested and is in flight.
    Pending,

    /// The resource was retrieved and cached.
    Available,

    /// Retrieval failed (terminal state).
    Faulted,
}

impl SagaState {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Faulted)
    }

    /// Returns true if a saga in this state can be stored.
    pub fn is_persistable(&self) -> bool {
        !matches!(self, SagaState::Initial)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Initial => "Initial",
            SagaState::Pending => "Pending",
            SagaState::Available => "Available",
            SagaState::Faulted => "Faulted",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SagaState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Initial" => Ok(SagaState::Initial),
            "Pending" => Ok(SagaState::Pending),
            "Available" => Ok(SagaState::Available),
            "Faulted" => Ok(SagaState::Faulted),
            other => Err(format!("unknown saga state '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_initial() {
        assert_eq!(SagaState::default(), SagaState::Initial);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SagaState::Initial.is_terminal());
        assert!(!SagaState::Pending.is_terminal());
        assert!(!SagaState::Available.is_terminal());
        assert!(SagaState::Faulted.is_terminal());
    }

    #[test]
    fn test_initial_is_never_persisted() {
        assert!(!SagaState::Initial.is_persistable());
        assert!(SagaState::Pending.is_persistable());
        assert!(SagaState::Available.is_persistable());
        assert!(SagaState::Faulted.is_persistable());
    }

    #[test]
    fn test_display_parses_back() {
        for state in [
            SagaState::Initial,
            SagaState::Pending,
            SagaState::Available,
            SagaState::Faulted,
        ] {
            assert_eq!(state.to_string().parse::<SagaState>(), Ok(state));
        }
        assert!("Running".parse::<SagaState>().is_err());
    }
}
