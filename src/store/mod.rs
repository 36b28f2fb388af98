//! The bet store seam: `store_bets`/`load_bets`/`has_won`, with an in-memory
//! implementation (the default) and an optional SQLite-backed one.

mod memory;
#[cfg(feature = "database")]
mod sqlite;

pub use memory::InMemoryStore;
#[cfg(feature = "database")]
pub use sqlite::SqliteStore;

use crate::bet::Bet;
use crate::error::ServerError;

/// Persistence and fairness-evaluation seam for bets. Implementations must
/// preserve the order bets were stored in across `store_bets` calls, since
/// that order is part of the draw's observable winner ordering.
pub trait BetStore {
    fn store_bets(&self, bets: &[Bet]) -> Result<(), ServerError>;
    fn load_bets(&self) -> Result<Vec<Bet>, ServerError>;
    fn has_won(&self, bet: &Bet) -> bool;
}
