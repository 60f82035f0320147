//! Process configuration, read directly from the environment (spec §6).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub extractor_path: String,
    pub transcoder_path: String,
    pub allowed_origins: Vec<String>,
    pub mode: Mode,
    pub rate_limit_max: u32,
    pub analyze_rate_limit_max: u32,
    pub download_rate_limit_max: u32,
    pub convert_rate_limit_max: u32,
    pub queue_status_rate_limit_max: u32,
    pub download_timeout: Duration,
    pub convert_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Development,
    Production,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env_u16("PORT", 8080),
            extractor_path: env_string("EXTRACTOR_PATH", "yt-dlp"),
            transcoder_path: env_string("TRANSCODER_PATH", "ffmpeg"),
            allowed_origins: env_origins("ALLOWED_ORIGINS"),
            mode: env_mode("MODE"),
            rate_limit_max: env_u32("RATE_LIMIT_MAX", 100),
            analyze_rate_limit_max: env_u32("ANALYZE_RATE_LIMIT_MAX", 30),
            download_rate_limit_max: env_u32("DOWNLOAD_RATE_LIMIT_MAX", 10),
            convert_rate_limit_max: env_u32("CONVERT_RATE_LIMIT_MAX", 5),
            queue_status_rate_limit_max: env_u32("QUEUE_STATUS_RATE_LIMIT_MAX", 300),
            download_timeout: Duration::from_millis(env_u64("DOWNLOAD_TIMEOUT_MS", 10 * 60 * 1000)),
            convert_timeout: Duration::from_millis(env_u64("CONVERSION_TIMEOUT_MS", 15 * 60 * 1000)),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_mode(key: &str) -> Mode {
    match std::env::var(key).ok().as_deref() {
        Some("production") => Mode::Production,
        _ => Mode::Development,
    }
}

fn env_origins(key: &str) -> Vec<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}
