use dotenvy::dotenv;
use once_cell::sync::Lazy;
use std::env;

pub static CONFIG: Lazy<Config> = Lazy::new(|| {
    dotenv().ok(); // Load .env file if present
    Config {
        mongo_uri: get_env("MONGO_URI"),
        mongo_db_name: get_env_or_default("MONGO_DB_NAME", "distill"),
        bind_addr: get_env_or_default("BIND_ADDR", "0.0.0.0:3000"),
        search_api_url: get_env_or_default("SEARCH_API_URL", "https://google.serper.dev/search"),
        search_api_key: get_env_opt("SEARCH_API_KEY"),
        openai_api_key: get_env_opt("OPENAI_API_KEY"),
        openai_model: get_env_or_default("OPENAI_MODEL", "gpt-4o-mini"),
    }
});

pub struct Config {
    pub mongo_uri: String,
    pub mongo_db_name: String,
    pub bind_addr: String,
    pub search_api_url: String,
    /// Missing key switches the result source to its built-in sample data.
    pub search_api_key: Option<String>,
    /// Missing key switches the summarizer straight to the heuristic fallback.
    pub openai_api_key: Option<String>,
    pub openai_model: String,
}

fn get_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("Missing required environment variable: {key}"))
}

fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
