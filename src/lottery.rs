use std::collections::{HashMap, HashSet};
use std::net::TcpStream;
use std::sync::Mutex;

use tracing::warn;

use crate::store::BetStore;

/// A parked client: the socket handed over by the session on FINISH, plus its
/// address for logging.
pub struct Waiter {
    pub conn: TcpStream,
    pub addr: String,
}

struct Inner {
    agencies_ready: HashSet<String>,
    waiting_clients: HashMap<String, Waiter>,
    lottery_done: bool,
    winners_by_agency: HashMap<String, Vec<String>>,
    required_agencies: usize,
}

/// The finish-barrier plus the one-shot draw it guards. Every field lives
/// behind one mutex: the threshold check and the draw are a single critical
/// section, so the draw fires exactly once no matter how many FINISH
/// messages arrive concurrently.
pub struct LotteryState {
    inner: Mutex<Inner>,
}

impl LotteryState {
    pub fn new(required_agencies: usize) -> Self {
        LotteryState {
            inner: Mutex::new(Inner {
                agencies_ready: HashSet::new(),
                waiting_clients: HashMap::new(),
                lottery_done: false,
                winners_by_agency: HashMap::new(),
                required_agencies,
            }),
        }
    }

    /// Registers `agency_id` as finished and parks its connection. Returns
    /// `true` to exactly one caller: the one whose registration pushed
    /// `agencies_ready` to `required_agencies` for the first time. A late
    /// FINISH after the draw still parks the connection so it gets notified,
    /// but never returns `true` again.
    pub fn register_and_try_to_start(
        &self,
        agency_id: &str,
        conn: TcpStream,
        addr: String,
        store: &dyn BetStore,
    ) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner
            .waiting_clients
            .insert(agency_id.to_string(), Waiter { conn, addr });
        inner.agencies_ready.insert(agency_id.to_string());

        if !inner.lottery_done && inner.agencies_ready.len() >= inner.required_agencies {
            Self::perform_draw(&mut inner, store);
            inner.lottery_done = true;
            true
        } else {
            false
        }
    }

    fn perform_draw(inner: &mut Inner, store: &dyn BetStore) {
        let bets = match store.load_bets() {
            Ok(bets) => bets,
            Err(err) => {
                warn!(error = %err, action = "perform_draw", result = "fail");
                return;
            }
        };
        for bet in &bets {
            if store.has_won(bet) {
                inner
                    .winners_by_agency
                    .entry(bet.agency_id.clone())
                    .or_default()
                    .push(bet.document.clone());
            }
        }
    }

    /// Returns the winners for `agency_id` once the draw has run, or `None`
    /// if it hasn't.
    pub fn get_winners_for_agency(&self, agency_id: &str) -> Option<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        if !inner.lottery_done {
            return None;
        }
        Some(
            inner
                .winners_by_agency
                .get(agency_id)
                .cloned()
                .unwrap_or_default(),
        )
    }

    /// Snapshot-and-drain: returns every currently parked connection and
    /// empties the registry, so a concurrent late FINISH is never lost or
    /// double-notified.
    pub fn take_waiting_clients(&self) -> HashMap<String, Waiter> {
        let mut inner = self.inner.lock().unwrap();
        std::mem::take(&mut inner.waiting_clients)
    }

    pub fn is_waiting(&self, agency_id: &str) -> bool {
        self.inner.lock().unwrap().waiting_clients.contains_key(agency_id)
    }

    pub fn is_done(&self) -> bool {
        self.inner.lock().unwrap().lottery_done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bet::Bet;
    use crate::store::InMemoryStore;
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::thread;

    fn dummy_conn() -> TcpStream {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let _ = listener.accept().unwrap();
        client
    }

    fn bet(agency: &str, doc: &str, number: &str) -> Bet {
        Bet {
            agency_id: agency.into(),
            first_name: "A".into(),
            last_name: "B".into(),
            document: doc.into(),
            birthdate: "1990-01-01".into(),
            number: number.into(),
        }
    }

    #[test]
    fn barrier_fires_exactly_once_and_computes_winners() {
        let store = InMemoryStore::new();
        store
            .store_bets(&[bet("1", "12345601", "1"), bet("3", "99999903", "3")])
            .unwrap();

        let lottery = LotteryState::new(3);
        let fired_1 = lottery.register_and_try_to_start("1", dummy_conn(), "a1".into(), &store);
        let fired_2 = lottery.register_and_try_to_start("2", dummy_conn(), "a2".into(), &store);
        let fired_3 = lottery.register_and_try_to_start("3", dummy_conn(), "a3".into(), &store);

        assert!(!fired_1);
        assert!(!fired_2);
        assert!(fired_3);

        assert_eq!(
            lottery.get_winners_for_agency("1"),
            Some(vec!["12345601".to_string()])
        );
        assert_eq!(lottery.get_winners_for_agency("2"), Some(vec![]));
        assert_eq!(
            lottery.get_winners_for_agency("3"),
            Some(vec!["99999903".to_string()])
        );
    }

    #[test]
    fn exactly_one_concurrent_caller_fires_the_draw() {
        let store = Arc::new(InMemoryStore::new());
        let lottery = Arc::new(LotteryState::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let lottery = lottery.clone();
                let store = store.clone();
                thread::spawn(move || {
                    lottery.register_and_try_to_start(
                        &i.to_string(),
                        dummy_conn(),
                        i.to_string(),
                        store.as_ref(),
                    )
                })
            })
            .collect();

        let fired_count = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|fired| *fired)
            .count();

        assert_eq!(fired_count, 1);
        assert!(lottery.is_done());
    }

    #[test]
    fn late_finish_after_draw_does_not_refire_but_still_parks() {
        let store = InMemoryStore::new();
        let lottery = LotteryState::new(1);

        assert!(lottery.register_and_try_to_start("1", dummy_conn(), "a1".into(), &store));
        assert!(!lottery.register_and_try_to_start("2", dummy_conn(), "a2".into(), &store));
        assert!(lottery.is_waiting("2"));

        let waiters = lottery.take_waiting_clients();
        assert_eq!(waiters.len(), 2);
    }
}
