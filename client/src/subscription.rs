//! Server-side subscription bookkeeping for one object.
//!
//! Exactly one server subscription exists per event kind no matter how many
//! local listeners are registered for it. The table only tracks state and
//! tells the caller which control message to send; it performs no I/O.
//!
//! Per kind: `UNSUBSCRIBED -> SUBSCRIBING -> SUBSCRIBED -> UNSUBSCRIBING -> UNSUBSCRIBED`.
//! Listener changes that happen while a request is in flight are applied
//! once that request settles.

use rom_types::SubscriptionToken;
use std::collections::HashMap;

/// Subscription state of one event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriptionState {
    #[default]
    Unsubscribed,
    /// A subscribe request is in flight
    Subscribing,
    Subscribed,
    /// An unsubscribe request is in flight
    Unsubscribing,
}

impl std::fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsubscribed => write!(f, "UNSUBSCRIBED"),
            Self::Subscribing => write!(f, "SUBSCRIBING"),
            Self::Subscribed => write!(f, "SUBSCRIBED"),
            Self::Unsubscribing => write!(f, "UNSUBSCRIBING"),
        }
    }
}

/// Control message the owner must send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Subscribe {
        kind: String,
    },
    Unsubscribe {
        kind: String,
        token: SubscriptionToken,
    },
}

#[derive(Debug, Clone)]
enum Entry {
    Subscribing,
    Subscribed(SubscriptionToken),
    Unsubscribing(SubscriptionToken),
}

#[derive(Debug, Default)]
pub struct SubscriptionTable {
    entries: HashMap<String, Entry>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, kind: &str) -> SubscriptionState {
        match self.entries.get(kind) {
            None => SubscriptionState::Unsubscribed,
            Some(Entry::Subscribing) => SubscriptionState::Subscribing,
            Some(Entry::Subscribed(_)) => SubscriptionState::Subscribed,
            Some(Entry::Unsubscribing(_)) => SubscriptionState::Unsubscribing,
        }
    }

    /// Token of the active subscription for `kind`.
    pub fn token(&self, kind: &str) -> Option<&SubscriptionToken> {
        match self.entries.get(kind) {
            Some(Entry::Subscribed(token)) | Some(Entry::Unsubscribing(token)) => Some(token),
            _ => None,
        }
    }

    /// The first local listener for `kind` was added.
    pub fn listeners_started(&mut self, kind: &str) -> Option<Action> {
        if self.entries.contains_key(kind) {
            // In flight or already active; settlement re-checks the count.
            return None;
        }
        self.entries.insert(kind.to_string(), Entry::Subscribing);
        Some(Action::Subscribe {
            kind: kind.to_string(),
        })
    }

    /// The last local listener for `kind` was removed.
    pub fn listeners_stopped(&mut self, kind: &str) -> Option<Action> {
        match self.entries.get(kind) {
            Some(Entry::Subscribed(token)) => {
                let token = token.clone();
                self.entries
                    .insert(kind.to_string(), Entry::Unsubscribing(token.clone()));
                Some(Action::Unsubscribe {
                    kind: kind.to_string(),
                    token,
                })
            }
            _ => None,
        }
    }

    /// A subscribe request for `kind` settled. `Err` rolls the record back.
    pub fn subscribe_settled(
        &mut self,
        kind: &str,
        result: Result<SubscriptionToken, ()>,
        has_listeners: bool,
    ) -> Option<Action> {
        if !matches!(self.entries.get(kind), Some(Entry::Subscribing)) {
            return None;
        }
        match result {
            Ok(token) if has_listeners => {
                self.entries.insert(kind.to_string(), Entry::Subscribed(token));
                None
            }
            Ok(token) => {
                self.entries
                    .insert(kind.to_string(), Entry::Unsubscribing(token.clone()));
                Some(Action::Unsubscribe {
                    kind: kind.to_string(),
                    token,
                })
            }
            Err(()) => {
                self.entries.remove(kind);
                None
            }
        }
    }

    /// An unsubscribe request for `kind` settled. On failure the
    /// subscription is presumed still active server-side.
    pub fn unsubscribe_settled(
        &mut self,
        kind: &str,
        succeeded: bool,
        has_listeners: bool,
    ) -> Option<Action> {
        let token = match self.entries.get(kind) {
            Some(Entry::Unsubscribing(token)) => token.clone(),
            _ => return None,
        };

        if !succeeded {
            self.entries.insert(kind.to_string(), Entry::Subscribed(token));
            return None;
        }

        if has_listeners {
            self.entries.insert(kind.to_string(), Entry::Subscribing);
            Some(Action::Subscribe {
                kind: kind.to_string(),
            })
        } else {
            self.entries.remove(kind);
            None
        }
    }

    /// Forget every record without contacting the server. Returns how many
    /// were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(t: &str) -> SubscriptionToken {
        SubscriptionToken::new(t)
    }

    #[test]
    fn test_full_cycle() {
        let mut table = SubscriptionTable::new();
        assert_eq!(
            table.listeners_started("StateChanged"),
            Some(Action::Subscribe {
                kind: "StateChanged".into()
            })
        );
        assert_eq!(table.state("StateChanged"), SubscriptionState::Subscribing);

        assert_eq!(table.subscribe_settled("StateChanged", Ok(token("t1")), true), None);
        assert_eq!(table.state("StateChanged"), SubscriptionState::Subscribed);
        assert_eq!(table.token("StateChanged"), Some(&token("t1")));

        assert_eq!(
            table.listeners_stopped("StateChanged"),
            Some(Action::Unsubscribe {
                kind: "StateChanged".into(),
                token: token("t1")
            })
        );
        assert_eq!(table.state("StateChanged"), SubscriptionState::Unsubscribing);

        assert_eq!(table.unsubscribe_settled("StateChanged", true, false), None);
        assert_eq!(table.state("StateChanged"), SubscriptionState::Unsubscribed);
        assert!(table.is_empty());
    }

    #[test]
    fn test_no_second_subscribe_while_subscribing() {
        let mut table = SubscriptionTable::new();
        assert!(table.listeners_started("E").is_some());
        assert!(table.listeners_started("E").is_none());
    }

    #[test]
    fn test_stop_while_subscribing_unsubscribes_after_settle() {
        let mut table = SubscriptionTable::new();
        table.listeners_started("E");
        assert_eq!(table.listeners_stopped("E"), None);

        assert_eq!(
            table.subscribe_settled("E", Ok(token("t9")), false),
            Some(Action::Unsubscribe {
                kind: "E".into(),
                token: token("t9")
            })
        );
        assert_eq!(table.state("E"), SubscriptionState::Unsubscribing);
    }

    #[test]
    fn test_start_while_unsubscribing_resubscribes_after_settle() {
        let mut table = SubscriptionTable::new();
        table.listeners_started("E");
        table.subscribe_settled("E", Ok(token("t1")), true);
        table.listeners_stopped("E");

        assert_eq!(table.listeners_started("E"), None);
        assert_eq!(
            table.unsubscribe_settled("E", true, true),
            Some(Action::Subscribe { kind: "E".into() })
        );
        assert_eq!(table.state("E"), SubscriptionState::Subscribing);
    }

    #[test]
    fn test_failures_roll_back() {
        let mut table = SubscriptionTable::new();
        table.listeners_started("E");
        assert_eq!(table.subscribe_settled("E", Err(()), true), None);
        assert_eq!(table.state("E"), SubscriptionState::Unsubscribed);

        table.listeners_started("E");
        table.subscribe_settled("E", Ok(token("t2")), true);
        table.listeners_stopped("E");
        assert_eq!(table.unsubscribe_settled("E", false, false), None);
        assert_eq!(table.state("E"), SubscriptionState::Subscribed);
        assert_eq!(table.token("E"), Some(&token("t2")));
    }

    #[test]
    fn test_stale_settlement_ignored_after_clear() {
        let mut table = SubscriptionTable::new();
        table.listeners_started("E");
        assert_eq!(table.clear(), 1);
        assert_eq!(table.subscribe_settled("E", Ok(token("t")), true), None);
        assert_eq!(table.state("E"), SubscriptionState::Unsubscribed);
    }
}
