use anyhow::Context;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub agent: AgentConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
}

/// External AI webhook settings. The timeout bounds the only blocking
/// external call in the request path.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub webhook_url: String,
    pub timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://gbuser:@localhost:5432/deskserver".to_string()),
        };
        let agent = AgentConfig {
            webhook_url: std::env::var("AGENT_WEBHOOK_URL")
                .context("AGENT_WEBHOOK_URL must be set")?,
            timeout_secs: std::env::var("AGENT_WEBHOOK_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        };
        Ok(AppConfig {
            server: ServerConfig {
                host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: std::env::var("SERVER_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
            },
            database,
            agent,
        })
    }
}
