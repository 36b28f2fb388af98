use crate::error::ServerError;
use clap::Parser;

/// Server configuration: listen port, accept backlog, number of agencies, and an
/// optional database URL selecting the persisted bet store over the in-memory one.
///
/// Every field can be set on the command line or via the matching environment
/// variable; the command line always wins.
#[derive(Parser, Debug, Clone)]
#[command(name = "lottery-server", about = "Lottery-betting protocol server")]
pub struct ServerConfig {
    /// TCP port to listen on.
    #[arg(long, env = "PORT", default_value_t = 12345)]
    pub port: u16,

    /// Backlog passed to the TCP listener.
    #[arg(long = "listen-backlog", env = "LISTEN_BACKLOG", default_value_t = 5)]
    pub listen_backlog: u32,

    /// Number of agencies that must FINISH before the draw runs. Fixed for the
    /// process lifetime; there is no dynamic membership.
    #[arg(long, env = "CLIENTS")]
    pub clients: usize,

    /// SQLite connection string (e.g. `sqlite://bets.db`). When unset, bets are
    /// kept only in memory for the lifetime of the process.
    #[arg(long = "database-url", env = "DATABASE_URL")]
    pub database_url: Option<String>,
}

impl ServerConfig {
    pub fn from_env_and_args() -> Result<Self, ServerError> {
        let config = Self::try_parse().map_err(|e| ServerError::config(e.to_string()))?;
        config.validate()
    }

    fn validate(self) -> Result<Self, ServerError> {
        if self.clients == 0 {
            return Err(ServerError::config("clients must be at least 1"));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_env() {
        std::env::set_var("PORT", "8000");
        let config = ServerConfig::try_parse_from(["lottery-server", "--port", "9000", "--clients", "3"])
            .unwrap();
        assert_eq!(config.port, 9000);
        std::env::remove_var("PORT");
    }

    #[test]
    fn env_used_when_flag_absent() {
        std::env::set_var("PORT", "8000");
        let config =
            ServerConfig::try_parse_from(["lottery-server", "--clients", "3"]).unwrap();
        assert_eq!(config.port, 8000);
        std::env::remove_var("PORT");
    }

    #[test]
    fn rejects_zero_clients() {
        let config = ServerConfig::try_parse_from(["lottery-server", "--clients", "0"]).unwrap();
        assert!(config.validate().is_err());
    }
}
