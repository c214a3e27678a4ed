use anyhow::Context;

/// Server configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind, e.g. "0.0.0.0:8080".
    pub bind_addr: String,
    /// SQLite connection string.
    pub database_url: String,
    /// Capacity of each connection's outbound queue. A peer that falls this
    /// far behind is treated as dead and pruned.
    pub outbound_queue: usize,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            bind_addr: dotenv::var("HUDDLE_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_owned()),
            database_url: dotenv::var("DATABASE_URL").context("DATABASE_URL is not set")?,
            outbound_queue: dotenv::var("HUDDLE_OUTBOUND_QUEUE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(64),
        })
    }
}
