use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` puts the service in database-unavailable mode.
    pub database_url: Option<String>,
    pub storage_backend: StorageBackend,
    pub host: String,
    pub port: u16,
    pub frontend_url: String,

    pub past_due_check_interval_secs: i64,
    pub past_due_sweep_tick_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: database_url_from(
                env::var("DATABASE_URL").ok(),
                env::var("PUBLIC_DATABASE_URL").ok(),
            ),
            storage_backend: match env::var("STORAGE_BACKEND")
                .unwrap_or_else(|_| "postgres".into())
                .to_lowercase()
                .as_str()
            {
                "memory" => StorageBackend::Memory,
                _ => StorageBackend::Postgres,
            },
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()
                .unwrap_or(8080),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),

            past_due_check_interval_secs: env::var("PAST_DUE_CHECK_INTERVAL_SECS")
                .unwrap_or_else(|_| "3600".into())
                .parse()
                .unwrap_or(3600),
            past_due_sweep_tick_secs: env::var("PAST_DUE_SWEEP_TICK_SECS")
                .unwrap_or_else(|_| "300".into()) // 5 min
                .parse()
                .unwrap_or(300),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(storage_backend: StorageBackend) -> Self {
        Self {
            database_url: None,
            storage_backend,
            host: "127.0.0.1".into(),
            port: 0,
            frontend_url: "http://localhost:3000".into(),
            past_due_check_interval_secs: 3600,
            past_due_sweep_tick_secs: 300,
        }
    }
}

/// The server-scoped name wins; blank values count as unset.
fn database_url_from(server: Option<String>, public: Option<String>) -> Option<String> {
    server
        .filter(|s| !s.trim().is_empty())
        .or_else(|| public.filter(|s| !s.trim().is_empty()))
}
