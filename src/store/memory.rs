use std::sync::Mutex;

use crate::bet::{self, Bet};
use crate::error::ServerError;
use crate::store::BetStore;

/// A `Vec`-backed store guarded by a mutex. Zero setup, lost on process exit.
#[derive(Default)]
pub struct InMemoryStore {
    bets: Mutex<Vec<Bet>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BetStore for InMemoryStore {
    fn store_bets(&self, bets: &[Bet]) -> Result<(), ServerError> {
        let mut guard = self.bets.lock().unwrap();
        guard.extend(bets.iter().cloned());
        Ok(())
    }

    fn load_bets(&self) -> Result<Vec<Bet>, ServerError> {
        Ok(self.bets.lock().unwrap().clone())
    }

    fn has_won(&self, bet: &Bet) -> bool {
        bet::lottery_predicate(bet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_preserves_order_across_calls() {
        let store = InMemoryStore::new();
        let bet = |doc: &str| Bet {
            agency_id: "1".into(),
            first_name: "A".into(),
            last_name: "B".into(),
            document: doc.into(),
            birthdate: "1990-01-01".into(),
            number: "0".into(),
        };

        store.store_bets(&[bet("1"), bet("2")]).unwrap();
        store.store_bets(&[bet("3")]).unwrap();

        let loaded = store.load_bets().unwrap();
        let docs: Vec<_> = loaded.iter().map(|b| b.document.as_str()).collect();
        assert_eq!(docs, vec!["1", "2", "3"]);
    }
}
