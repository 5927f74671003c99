use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,
    /// Separate pool for scheduler/controller work. Longer statement timeout,
    /// never shares a pool with request-handling paths.
    pub background_database_url: String,
    pub background_pool_size: u32,
    pub background_statement_timeout: Duration,

    // AI provider
    pub llm_api_key: String,
    pub llm_model: String,

    // Transcription
    pub transcription_api_key: String,

    // Source adapters
    pub listen_notes_api_key: String,
    pub podscan_api_key: String,
    pub adapter_page_size: u32,
    pub adapter_inter_request_delay_ms: u64,

    // Business rules
    pub vetting_threshold: i32,
    pub free_plan_weekly_match_allowance: u32,
    pub free_plan_weekly_discovery_allowance: u32,
    pub paid_plan_weekly_match_allowance: u32,

    // WebSocket
    pub websocket_origin: String,
}

impl Config {
    /// Load configuration for the full application (pipeline + scheduler + notifier).
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            background_database_url: env::var("BACKGROUND_DATABASE_URL")
                .unwrap_or_else(|_| required_env("DATABASE_URL")),
            background_pool_size: parse_env_or("BACKGROUND_POOL_SIZE", 10),
            background_statement_timeout: Duration::from_secs(parse_env_or(
                "BACKGROUND_STATEMENT_TIMEOUT_SECS",
                30 * 60,
            )),
            llm_api_key: required_env("LLM_API_KEY"),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "default-model".to_string()),
            transcription_api_key: env::var("TRANSCRIPTION_API_KEY").unwrap_or_default(),
            listen_notes_api_key: env::var("LISTEN_NOTES_API_KEY").unwrap_or_default(),
            podscan_api_key: env::var("PODSCAN_API_KEY").unwrap_or_default(),
            adapter_page_size: parse_env_or("ADAPTER_PAGE_SIZE", 20),
            adapter_inter_request_delay_ms: parse_env_or("ADAPTER_INTER_REQUEST_DELAY_MS", 1200),
            vetting_threshold: parse_env_or("VETTING_THRESHOLD", 50),
            free_plan_weekly_match_allowance: parse_env_or("FREE_PLAN_WEEKLY_MATCH_ALLOWANCE", 50),
            free_plan_weekly_discovery_allowance: parse_env_or(
                "FREE_PLAN_WEEKLY_DISCOVERY_ALLOWANCE",
                100,
            ),
            paid_plan_weekly_match_allowance: parse_env_or(
                "PAID_PLAN_WEEKLY_MATCH_ALLOWANCE",
                200,
            ),
            websocket_origin: env::var("WEBSOCKET_ORIGIN")
                .unwrap_or_else(|_| "*".to_string()),
        }
    }

    /// Log a redacted view of sensitive config (lengths only, never values).
    pub fn log_redacted(&self) {
        let vars = [
            ("DATABASE_URL", &self.database_url),
            ("BACKGROUND_DATABASE_URL", &self.background_database_url),
            ("LLM_API_KEY", &self.llm_api_key),
            ("TRANSCRIPTION_API_KEY", &self.transcription_api_key),
            ("LISTEN_NOTES_API_KEY", &self.listen_notes_api_key),
            ("PODSCAN_API_KEY", &self.podscan_api_key),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
