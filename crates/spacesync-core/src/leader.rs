//! Leader state per scope
//!
//! The table only ever changes in response to server broadcasts. A client
//! never marks itself leader on its own.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Who leads a scope, as last announced by the server
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LeaderState {
    pub current_leader_user_id: Option<String>,
    pub current_leader_client_id: Option<u64>,
}

impl LeaderState {
    pub fn has_leader(&self) -> bool {
        self.current_leader_client_id.is_some()
    }
}

/// Leadership transition announced by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaderEvent {
    Elected {
        scope: String,
        client_id: u64,
        user_id: String,
    },
    Vacated {
        scope: String,
    },
}

impl LeaderEvent {
    pub fn scope(&self) -> &str {
        match self {
            LeaderEvent::Elected { scope, .. } | LeaderEvent::Vacated { scope } => scope,
        }
    }
}

#[derive(Debug, Default)]
pub struct LeaderTable {
    scopes: HashMap<String, LeaderState>,
}

impl LeaderTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a server announcement into the table.
    ///
    /// Returns false when the event does not change anything.
    pub fn apply(&mut self, event: &LeaderEvent) -> bool {
        match event {
            LeaderEvent::Elected { scope, client_id, user_id } => {
                let next = LeaderState {
                    current_leader_user_id: Some(user_id.clone()),
                    current_leader_client_id: Some(*client_id),
                };
                let state = self.scopes.entry(scope.clone()).or_default();
                if *state == next {
                    return false;
                }
                *state = next;
                true
            }
            LeaderEvent::Vacated { scope } => match self.scopes.get_mut(scope) {
                Some(state) if state.has_leader() => {
                    *state = LeaderState::default();
                    true
                }
                _ => false,
            },
        }
    }

    pub fn get(&self, scope: &str) -> LeaderState {
        self.scopes.get(scope).cloned().unwrap_or_default()
    }

    pub fn is_leader(&self, scope: &str, client_id: u64) -> bool {
        self.scopes
            .get(scope)
            .and_then(|s| s.current_leader_client_id)
            == Some(client_id)
    }

    /// Scopes this client currently leads
    pub fn led_by(&self, client_id: u64) -> Vec<String> {
        let mut scopes: Vec<String> = self
            .scopes
            .iter()
            .filter(|(_, s)| s.current_leader_client_id == Some(client_id))
            .map(|(scope, _)| scope.clone())
            .collect();
        scopes.sort();
        scopes
    }

    pub fn forget(&mut self, scope: &str) {
        self.scopes.remove(scope);
    }

    pub fn clear(&mut self) {
        self.scopes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elected(scope: &str, client_id: u64) -> LeaderEvent {
        LeaderEvent::Elected {
            scope: scope.into(),
            client_id,
            user_id: format!("user-{}", client_id),
        }
    }

    #[test]
    fn test_no_leader_by_default() {
        let table = LeaderTable::new();
        assert!(!table.get("scope").has_leader());
        assert!(!table.is_leader("scope", 1));
    }

    #[test]
    fn test_election_cycle() {
        let mut table = LeaderTable::new();
        assert!(table.apply(&elected("scope", 1)));
        assert!(!table.apply(&elected("scope", 1)));
        assert!(table.is_leader("scope", 1));
        assert_eq!(table.get("scope").current_leader_user_id.as_deref(), Some("user-1"));

        assert!(table.apply(&LeaderEvent::Vacated { scope: "scope".into() }));
        assert!(!table.get("scope").has_leader());
        assert!(!table.apply(&LeaderEvent::Vacated { scope: "scope".into() }));

        assert!(table.apply(&elected("scope", 2)));
        assert!(!table.is_leader("scope", 1));
        assert!(table.is_leader("scope", 2));
    }

    #[test]
    fn test_led_by() {
        let mut table = LeaderTable::new();
        table.apply(&elected("b", 1));
        table.apply(&elected("a", 1));
        table.apply(&elected("c", 2));
        assert_eq!(table.led_by(1), vec!["a".to_string(), "b".to_string()]);
    }
}
