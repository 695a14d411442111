//! The image saga's transition table.
//!
//! ```text
//! State      Event                 Action            Next
//! Initial    RequestImage          Create            Pending
//! Pending    RequestImage          Announce          Pending
//! Pending    ImageRetrieved        RecordRetrieval   Available
//! Pending    ImageRetrievalFailed  RecordFault       Faulted
//! Available  RequestImage          RespondFromCache  Available
//! ```
//!
//! Every pair not listed is unhandled. `Faulted` has no rows and
//! `ImageNotFound` appears nowhere.

use std::collections::HashMap;

use contracts::InboundKind;
use saga_store::SagaState;
use serde::{Deserialize, Serialize};

/// What a transition does besides changing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Create the saga, run the creation activity and announce the request.
    Create,
    /// Announce a repeated request; the saga is left untouched.
    Announce,
    /// Store the retrieved content's location and metadata.
    RecordRetrieval,
    /// Store the failure reason and publish a fault.
    RecordFault,
    /// Announce the request and answer it from the stored content.
    RespondFromCache,
}

/// One row of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: SagaState,
    pub on: InboundKind,
    pub action: Action,
    pub to: SagaState,
}

impl TransitionRule {
    pub const fn new(from: SagaState, on: InboundKind, action: Action, to: SagaState) -> Self {
        Self {
            from,
            on,
            action,
            to,
        }
    }
}

/// The standard image retrieval saga.
pub const IMAGE_SAGA_RULES: &[TransitionRule] = &[
    TransitionRule::new(
        SagaState::Initial,
        InboundKind::RequestImage,
        Action::Create,
        SagaState::Pending,
    ),
    TransitionRule::new(
        SagaState::Pending,
        InboundKind::RequestImage,
        Action::Announce,
        SagaState::Pending,
    ),
    TransitionRule::new(
        SagaState::Pending,
        InboundKind::ImageRetrieved,
        Action::RecordRetrieval,
        SagaState::Available,
    ),
    TransitionRule::new(
        SagaState::Pending,
        InboundKind::ImageRetrievalFailed,
        Action::RecordFault,
        SagaState::Faulted,
    ),
    TransitionRule::new(
        SagaState::Available,
        InboundKind::RequestImage,
        Action::RespondFromCache,
        SagaState::Available,
    ),
];

/// Lookup from `(state, event kind)` to the rule that handles it.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    rules: HashMap<(SagaState, InboundKind), TransitionRule>,
}

impl TransitionTable {
    /// Builds a table from rules. A later rule for the same pair replaces an
    /// earlier one.
    pub fn from_rules(rules: &[TransitionRule]) -> Self {
        Self {
            rules: rules.iter().map(|r| ((r.from, r.on), *r)).collect(),
        }
    }

    pub fn get(&self, state: SagaState, on: InboundKind) -> Option<&TransitionRule> {
        self.rules.get(&(state, on))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::from_rules(IMAGE_SAGA_RULES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_KINDS: [InboundKind; 4] = [
        InboundKind::RequestImage,
        InboundKind::ImageRetrieved,
        InboundKind::ImageRetrievalFailed,
        InboundKind::ImageNotFound,
    ];

    #[test]
    fn test_default_table_has_every_rule() {
        let table = TransitionTable::default();
        assert_eq!(table.len(), IMAGE_SAGA_RULES.len());

        let create = table
            .get(SagaState::Initial, InboundKind::RequestImage)
            .unwrap();
        assert_eq!(create.action, Action::Create);
        assert_eq!(create.to, SagaState::Pending);
    }

    #[test]
    fn test_faulted_is_terminal() {
        let table = TransitionTable::default();
        for kind in ALL_KINDS {
            assert!(table.get(SagaState::Faulted, kind).is_none());
        }
    }

    #[test]
    fn test_image_not_found_is_never_handled() {
        let table = TransitionTable::default();
        for state in [
            SagaState::Initial,
            SagaState::Pending,
            SagaState::Available,
            SagaState::Faulted,
        ] {
            assert!(table.get(state, InboundKind::ImageNotFound).is_none());
        }
    }

    #[test]
    fn test_only_request_image_leaves_initial() {
        let table = TransitionTable::default();
        for kind in ALL_KINDS {
            let handled = table.get(SagaState::Initial, kind).is_some();
            assert_eq!(handled, kind == InboundKind::RequestImage);
        }
    }

    #[test]
    fn test_available_ignores_late_results() {
        let table = TransitionTable::default();
        assert!(
            table
                .get(SagaState::Available, InboundKind::ImageRetrieved)
                .is_none()
        );
        assert!(
            table
                .get(SagaState::Available, InboundKind::ImageRetrievalFailed)
                .is_none()
        );
    }
}
