use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::ranking::ComfortBand;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub log_level: String,
    pub redis_url: Option<String>,
    pub llm_endpoint: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub llm_timeout_secs: u64,
    pub llm_requests_per_minute: u32,
    pub serpapi_api_key: Option<String>,
    pub openweather_api_key: Option<String>,
    pub serper_api_key: Option<String>,
    pub tool_timeout_secs: u64,
    pub telemetry_endpoint: Option<String>,
    pub telemetry_api_key: Option<String>,
    pub telemetry_project: String,
    pub telemetry_log_dir: String,
    pub comfort_min_c: f64,
    pub comfort_max_c: f64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let config = Config {
            port: parse(&get, "PORT", 8080)?,
            log_level: or("LOG_LEVEL", "info"),
            redis_url: get("REDIS_URL"),
            llm_endpoint: or(
                "LLM_ENDPOINT",
                "https://generativelanguage.googleapis.com/v1beta/openai",
            ),
            llm_model: or("LLM_MODEL", "gemini-2.0-flash"),
            llm_api_key: get("LLM_API_KEY").or_else(|| get("GEMINI_API_KEY")),
            llm_timeout_secs: parse(&get, "LLM_TIMEOUT_SECS", 60)?,
            llm_requests_per_minute: parse(&get, "LLM_REQUESTS_PER_MINUTE", 15)?,
            serpapi_api_key: get("SERPAPI_API_KEY"),
            openweather_api_key: get("OPENWEATHER_API_KEY"),
            serper_api_key: get("SERPER_API_KEY"),
            tool_timeout_secs: parse(&get, "TOOL_TIMEOUT_SECS", 15)?,
            telemetry_endpoint: get("TELEMETRY_ENDPOINT"),
            telemetry_api_key: get("TELEMETRY_API_KEY"),
            telemetry_project: or("TELEMETRY_PROJECT", "trip-planner"),
            telemetry_log_dir: or("TELEMETRY_LOG_DIR", "logs"),
            comfort_min_c: parse(&get, "COMFORT_MIN_C", 18.0)?,
            comfort_max_c: parse(&get, "COMFORT_MAX_C", 28.0)?,
        };

        if config.comfort_min_c > config.comfort_max_c {
            bail!(
                "COMFORT_MIN_C ({}) must not exceed COMFORT_MAX_C ({})",
                config.comfort_min_c,
                config.comfort_max_c
            );
        }
        if config.llm_requests_per_minute == 0 {
            bail!("LLM_REQUESTS_PER_MINUTE must be at least 1");
        }

        Ok(config)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn comfort_band(&self) -> ComfortBand {
        ComfortBand {
            min_c: self.comfort_min_c,
            max_c: self.comfort_max_c,
        }
    }
}

fn parse<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}
