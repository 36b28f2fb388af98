use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tokio::runtime::Runtime;
use tracing::info;

use crate::bet::{self, Bet};
use crate::error::ServerError;
use crate::store::BetStore;

/// A SQLite-backed store, kept for an audit trail across restarts. The
/// server's own session/worker threads are synchronous, so this wraps a
/// single-threaded Tokio runtime purely to drive the async `sqlx` pool; callers
/// never see anything async.
pub struct SqliteStore {
    pool: SqlitePool,
    runtime: Runtime,
}

impl SqliteStore {
    pub fn new(database_url: &str) -> Result<Self, ServerError> {
        let runtime = Runtime::new().map_err(|e| ServerError::store(e.to_string()))?;
        let pool = runtime.block_on(Self::connect_and_migrate(database_url))?;
        info!(database_url, "bet store initialized");
        Ok(SqliteStore { pool, runtime })
    }

    async fn connect_and_migrate(database_url: &str) -> Result<SqlitePool, ServerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                agency_id TEXT NOT NULL,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                document TEXT NOT NULL,
                birthdate TEXT NOT NULL,
                number TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(pool)
    }

    async fn store_bets_async(&self, bets: &[Bet]) -> Result<(), ServerError> {
        let mut tx = self.pool.begin().await?;
        for bet in bets {
            sqlx::query(
                "INSERT INTO bets (agency_id, first_name, last_name, document, birthdate, number) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&bet.agency_id)
            .bind(&bet.first_name)
            .bind(&bet.last_name)
            .bind(&bet.document)
            .bind(&bet.birthdate)
            .bind(&bet.number)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load_bets_async(&self) -> Result<Vec<Bet>, ServerError> {
        let rows = sqlx::query(
            "SELECT agency_id, first_name, last_name, document, birthdate, number \
             FROM bets ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Bet {
                agency_id: row.get("agency_id"),
                first_name: row.get("first_name"),
                last_name: row.get("last_name"),
                document: row.get("document"),
                birthdate: row.get("birthdate"),
                number: row.get("number"),
            })
            .collect())
    }
}

impl BetStore for SqliteStore {
    fn store_bets(&self, bets: &[Bet]) -> Result<(), ServerError> {
        self.runtime.block_on(self.store_bets_async(bets))
    }

    fn load_bets(&self) -> Result<Vec<Bet>, ServerError> {
        self.runtime.block_on(self.load_bets_async())
    }

    fn has_won(&self, bet: &Bet) -> bool {
        bet::lottery_predicate(bet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bet(doc: &str) -> Bet {
        Bet {
            agency_id: "1".into(),
            first_name: "Ana".into(),
            last_name: "Perez".into(),
            document: doc.into(),
            birthdate: "1990-01-01".into(),
            number: "0".into(),
        }
    }

    #[test]
    fn store_and_load_preserve_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bets.db");
        let url = format!("sqlite://{}?mode=rwc", path.display());

        let store = SqliteStore::new(&url).unwrap();
        store.store_bets(&[bet("1"), bet("2")]).unwrap();
        store.store_bets(&[bet("3")]).unwrap();

        let loaded = store.load_bets().unwrap();
        let docs: Vec<_> = loaded.iter().map(|b| b.document.as_str()).collect();
        assert_eq!(docs, vec!["1", "2", "3"]);
    }
}
