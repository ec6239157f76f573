use std::env;
use tracing::warn;

const DEFAULT_ICE_SERVER: &str = "stun:stun.l.google.com:19302";
const DEFAULT_TIMER_TICK_MS: u64 = 1000;
const DEFAULT_SIGNALING_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub ice_server_urls: Vec<String>,
    pub call_timer_tick_ms: u64,
    pub signaling_timeout_secs: u64,
    pub capture_audio: bool,
    pub capture_video: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ice_server_urls: vec![DEFAULT_ICE_SERVER.to_string()],
            call_timer_tick_ms: DEFAULT_TIMER_TICK_MS,
            signaling_timeout_secs: DEFAULT_SIGNALING_TIMEOUT_SECS,
            capture_audio: true,
            capture_video: true,
        }
    }
}

impl AppConfig {
    /// Loads a `.env` file when present, then reads the environment.
    pub fn load() -> Self {
        dotenv::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Self {
        let config = Self {
            ice_server_urls: env::var("ICE_SERVER_URLS")
                .map(|raw| parse_url_list(&raw))
                .unwrap_or_else(|_| {
                    warn!("ICE_SERVER_URLS not set, using default STUN server");
                    vec![DEFAULT_ICE_SERVER.to_string()]
                }),
            call_timer_tick_ms: parse_u64("CALL_TIMER_TICK_MS", DEFAULT_TIMER_TICK_MS),
            signaling_timeout_secs: parse_u64("SIGNALING_TIMEOUT_SECS", DEFAULT_SIGNALING_TIMEOUT_SECS),
            capture_audio: parse_bool("CALL_CAPTURE_AUDIO", true),
            capture_video: parse_bool("CALL_CAPTURE_VIDEO", true),
        };

        if !config.is_configured() {
            warn!("Call configuration incomplete - no ICE servers or no capture kinds enabled");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.ice_server_urls.is_empty() && (self.capture_audio || self.capture_video)
    }
}

fn parse_url_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_u64(key: &str, default: u64) -> u64 {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} is not a valid number ('{}'), using {}", key, raw, default);
            default
        }),
        Err(_) => {
            warn!("{} not set, using default {}", key, default);
            default
        }
    }
}

fn parse_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                warn!("{} is not a valid flag ('{}'), using {}", key, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}
